//! Copy-on-write overlay of a base tree.
//!
//! Directories are materialized into an index arena only when a path walks
//! through them. Everything else stays a plain reference into the base tree,
//! so a transaction over a large repository costs what it touches.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use tracing::trace;

use crate::storage::{EntryRef, ObjectStore, StorageResult, TreeEntries, TreeId};
use crate::worktree::error::{TreeError, TreeResult};
use crate::worktree::path::RepoPath;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
enum Slot {
    /// untouched entry, still owned by the base tree
    Base(EntryRef),
    /// directory materialized into the arena
    Dir(NodeId),
    /// file content written in this transaction
    Pending(Vec<u8>),
}

impl Slot {
    fn is_dir(&self) -> bool {
        matches!(self, Slot::Dir(_) | Slot::Base(EntryRef::Tree(_)))
    }
}

#[derive(Debug)]
struct DirNode {
    /// tree this node was loaded from, `None` for directories created here
    origin: Option<TreeId>,
    entries: BTreeMap<String, Slot>,
    modified: bool,
}

impl DirNode {
    fn created() -> Self {
        Self {
            origin: None,
            entries: BTreeMap::new(),
            modified: true,
        }
    }
}

enum Child {
    Dir(NodeId),
    File,
}

/// One transaction's private, mutable view of a tree.
#[derive(Debug)]
pub struct WorkingTree {
    nodes: Vec<DirNode>,
    base: Option<TreeId>,
    changes: BTreeSet<RepoPath>,
}

impl WorkingTree {
    /// Start an overlay on `base` (`None` for an empty tree).
    pub fn new(store: &dyn ObjectStore, base: Option<TreeId>) -> TreeResult<Self> {
        let root = load(store, base)?;
        Ok(Self {
            nodes: vec![root],
            base,
            changes: BTreeSet::new(),
        })
    }

    /// the tree this overlay started from
    pub fn base(&self) -> Option<TreeId> {
        self.base
    }

    /// true once any mutating call succeeded
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// every path a mutating call touched, in path order
    ///
    /// Decides whether there is anything to commit. The merge does not read
    /// it; it finds the same paths by comparing object ids against the base.
    pub fn changed_paths(&self) -> impl Iterator<Item = &RepoPath> {
        self.changes.iter()
    }

    // ==================== Queries ====================

    /// Read a file's content.
    pub fn read(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<Vec<u8>> {
        let (parent, name) = path
            .split_last()
            .ok_or_else(|| TreeError::IsADirectory(path.to_string()))?;
        let node = self.dir_at(store, &parent, path)?;

        match self.nodes[node].entries.get(name) {
            None => Err(TreeError::NotFound(path.to_string())),
            Some(slot) if slot.is_dir() => Err(TreeError::IsADirectory(path.to_string())),
            Some(Slot::Pending(data)) => Ok(data.clone()),
            Some(Slot::Base(EntryRef::Blob(id))) => Ok(store.get_blob(*id)?),
            Some(_) => Err(TreeError::IsADirectory(path.to_string())),
        }
    }

    /// Names in a directory, byte-wise ordered.
    pub fn list(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<Vec<String>> {
        match self.lookup(store, path)? {
            None => Err(TreeError::NotFound(path.to_string())),
            Some(Child::File) => Err(TreeError::NotADirectory(path.to_string())),
            Some(Child::Dir(node)) => Ok(self.nodes[node].entries.keys().cloned().collect()),
        }
    }

    pub fn exists(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<bool> {
        match self.lookup(store, path) {
            Ok(found) => Ok(found.is_some()),
            Err(e) if e.is_missing_path() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// false for files and for paths that don't exist
    pub fn is_dir(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<bool> {
        match self.lookup(store, path) {
            Ok(found) => Ok(matches!(found, Some(Child::Dir(_)))),
            Err(e) if e.is_missing_path() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_empty(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<bool> {
        match self.lookup(store, path)? {
            None => Err(TreeError::NotFound(path.to_string())),
            Some(Child::File) => Err(TreeError::NotADirectory(path.to_string())),
            Some(Child::Dir(node)) => Ok(self.nodes[node].entries.is_empty()),
        }
    }

    /// Object id `path` would have if the transaction committed now.
    ///
    /// Directories with changes below them are written to the store to get
    /// their id; untouched entries are answered from the base tree.
    pub fn hash(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<EntryRef> {
        let Some((parent, name)) = path.split_last() else {
            return Ok(EntryRef::Tree(self.write_node(store, ROOT)?));
        };
        let node = self.dir_at(store, &parent, path)?;

        match self.nodes[node].entries.get(name) {
            None => Err(TreeError::NotFound(path.to_string())),
            Some(Slot::Base(entry)) => Ok(*entry),
            Some(Slot::Pending(data)) => Ok(EntryRef::Blob(store.hash_blob(data)?)),
            Some(Slot::Dir(child)) => {
                let child = *child;
                Ok(EntryRef::Tree(self.write_node(store, child)?))
            }
        }
    }

    // ==================== Mutations ====================

    /// Create or replace a file.
    pub fn write(
        &mut self,
        store: &dyn ObjectStore,
        path: &RepoPath,
        data: Vec<u8>,
    ) -> TreeResult<()> {
        let (parent, name) = path
            .split_last()
            .ok_or_else(|| TreeError::IsADirectory(path.to_string()))?;
        let node = self.dir_at(store, &parent, path)?;

        if self.nodes[node].entries.get(name).is_some_and(Slot::is_dir) {
            return Err(TreeError::IsADirectory(path.to_string()));
        }
        self.nodes[node]
            .entries
            .insert(name.to_string(), Slot::Pending(data));
        self.touch(node, path);
        Ok(())
    }

    /// Create a single directory; the parent must exist.
    pub fn mkdir(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<()> {
        let (parent, name) = path
            .split_last()
            .ok_or_else(|| TreeError::AlreadyExists(path.to_string()))?;
        let node = self.dir_at(store, &parent, path)?;

        if self.nodes[node].entries.contains_key(name) {
            return Err(TreeError::AlreadyExists(path.to_string()));
        }
        let created = self.push(DirNode::created());
        self.nodes[node]
            .entries
            .insert(name.to_string(), Slot::Dir(created));
        self.touch(node, path);
        Ok(())
    }

    /// Create a directory and any missing ancestors. Existing directories are fine.
    pub fn mkdirs(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<()> {
        let mut node = ROOT;
        let mut current = RepoPath::root();

        for name in path.components() {
            current = current.join(name);
            node = match self.child(store, node, name)? {
                Some(Child::Dir(child)) => child,
                Some(Child::File) => return Err(TreeError::NotADirectory(current.to_string())),
                None => {
                    let created = self.push(DirNode::created());
                    self.nodes[node]
                        .entries
                        .insert(name.clone(), Slot::Dir(created));
                    self.touch(node, &current);
                    created
                }
            };
        }
        Ok(())
    }

    /// Remove a file.
    pub fn remove(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<()> {
        let (parent, name) = path
            .split_last()
            .ok_or_else(|| TreeError::IsADirectory(path.to_string()))?;
        let node = self.dir_at(store, &parent, path)?;

        match self.nodes[node].entries.get(name) {
            None => return Err(TreeError::NotFound(path.to_string())),
            Some(slot) if slot.is_dir() => return Err(TreeError::IsADirectory(path.to_string())),
            Some(_) => {}
        }
        self.nodes[node].entries.remove(name);
        self.touch(node, path);
        Ok(())
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<()> {
        let (parent, name) = path.split_last().ok_or_else(|| {
            TreeError::InvalidArgument("cannot remove the root directory".to_string())
        })?;
        let node = self.dir_at(store, &parent, path)?;

        match self.child(store, node, name)? {
            None => return Err(TreeError::NotFound(path.to_string())),
            Some(Child::File) => return Err(TreeError::NotADirectory(path.to_string())),
            Some(Child::Dir(child)) => {
                if !self.nodes[child].entries.is_empty() {
                    return Err(TreeError::DirectoryNotEmpty(path.to_string()));
                }
            }
        }
        self.nodes[node].entries.remove(name);
        self.touch(node, path);
        Ok(())
    }

    /// Remove a directory and everything below it.
    pub fn remove_tree(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<()> {
        let (parent, name) = path.split_last().ok_or_else(|| {
            TreeError::InvalidArgument("cannot remove the root directory".to_string())
        })?;
        let node = self.dir_at(store, &parent, path)?;

        match self.nodes[node].entries.get(name) {
            None => return Err(TreeError::NotFound(path.to_string())),
            Some(slot) if !slot.is_dir() => {
                return Err(TreeError::NotADirectory(path.to_string()))
            }
            Some(_) => {}
        }
        self.nodes[node].entries.remove(name);
        self.touch(node, path);
        Ok(())
    }

    /// Move a file or directory. `dst` must not exist; its parent must.
    ///
    /// Moving a path onto itself is a no-op.
    pub fn rename(
        &mut self,
        store: &dyn ObjectStore,
        src: &RepoPath,
        dst: &RepoPath,
    ) -> TreeResult<()> {
        let (src_parent, src_name) = src.split_last().ok_or_else(|| {
            TreeError::InvalidArgument("cannot move the root directory".to_string())
        })?;

        if src == dst {
            return match self.lookup(store, src)? {
                Some(_) => Ok(()),
                None => Err(TreeError::NotFound(src.to_string())),
            };
        }
        if dst.starts_with(src) {
            return Err(TreeError::InvalidArgument(format!(
                "cannot move {} into its own subdirectory {}",
                src, dst
            )));
        }
        let (dst_parent, dst_name) = dst
            .split_last()
            .ok_or_else(|| TreeError::AlreadyExists(dst.to_string()))?;

        let src_node = self.dir_at(store, &src_parent, src)?;
        if !self.nodes[src_node].entries.contains_key(src_name) {
            return Err(TreeError::NotFound(src.to_string()));
        }
        let dst_node = self.dir_at(store, &dst_parent, dst)?;
        if self.nodes[dst_node].entries.contains_key(dst_name) {
            return Err(TreeError::AlreadyExists(dst.to_string()));
        }

        let Some(slot) = self.nodes[src_node].entries.remove(src_name) else {
            return Err(TreeError::NotFound(src.to_string()));
        };
        self.nodes[dst_node].entries.insert(dst_name.to_string(), slot);
        self.touch(src_node, src);
        self.touch(dst_node, dst);
        Ok(())
    }

    // ==================== Serialization ====================

    /// Write pending content and every changed directory to the store.
    ///
    /// Untouched subtrees are reused by id, so only the directories on the
    /// way from a change up to the root are rewritten.
    pub fn serialize(&mut self, store: &dyn ObjectStore) -> TreeResult<TreeId> {
        let id = self.write_node(store, ROOT)?;
        trace!(tree = %id, changes = self.changes.len(), "serialized working tree");
        Ok(id)
    }

    fn write_node(&mut self, store: &dyn ObjectStore, node: NodeId) -> StorageResult<TreeId> {
        let mut entries = mem::take(&mut self.nodes[node].entries);
        let written = self.write_entries(store, &mut entries);
        self.nodes[node].entries = entries;
        let (tree, children_changed) = written?;

        let current = &self.nodes[node];
        if let (Some(origin), false, false) = (current.origin, current.modified, children_changed) {
            return Ok(origin);
        }
        store.put_tree(&tree)
    }

    fn write_entries(
        &mut self,
        store: &dyn ObjectStore,
        entries: &mut BTreeMap<String, Slot>,
    ) -> StorageResult<(TreeEntries, bool)> {
        let mut tree = TreeEntries::new();
        let mut changed = false;

        for (name, slot) in entries.iter_mut() {
            let entry = match slot {
                Slot::Base(entry) => *entry,
                Slot::Dir(child) => {
                    let child = *child;
                    let id = self.write_node(store, child)?;
                    if self.nodes[child].origin != Some(id) {
                        changed = true;
                    }
                    EntryRef::Tree(id)
                }
                Slot::Pending(data) => {
                    let id = store.put_blob(data)?;
                    *slot = Slot::Base(EntryRef::Blob(id));
                    EntryRef::Blob(id)
                }
            };
            tree.insert(name.clone(), entry);
        }

        Ok((tree, changed))
    }

    // ==================== Navigation ====================

    fn push(&mut self, node: DirNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn touch(&mut self, node: NodeId, path: &RepoPath) {
        self.nodes[node].modified = true;
        self.changes.insert(path.clone());
    }

    /// Look up `name` in a directory node, materializing it if it is a directory.
    fn child(
        &mut self,
        store: &dyn ObjectStore,
        node: NodeId,
        name: &str,
    ) -> TreeResult<Option<Child>> {
        let tree = match self.nodes[node].entries.get(name) {
            None => return Ok(None),
            Some(Slot::Dir(child)) => return Ok(Some(Child::Dir(*child))),
            Some(Slot::Base(EntryRef::Tree(id))) => *id,
            Some(_) => return Ok(Some(Child::File)),
        };

        let loaded = load(store, Some(tree))?;
        let child = self.push(loaded);
        self.nodes[node]
            .entries
            .insert(name.to_string(), Slot::Dir(child));
        Ok(Some(Child::Dir(child)))
    }

    /// Walk to the directory at `dir`, reporting errors against `shown`.
    fn dir_at(
        &mut self,
        store: &dyn ObjectStore,
        dir: &RepoPath,
        shown: &RepoPath,
    ) -> TreeResult<NodeId> {
        let mut node = ROOT;
        for name in dir.components() {
            node = match self.child(store, node, name)? {
                Some(Child::Dir(child)) => child,
                Some(Child::File) => return Err(TreeError::NotADirectory(shown.to_string())),
                None => return Err(TreeError::NotFound(shown.to_string())),
            };
        }
        Ok(node)
    }

    fn lookup(&mut self, store: &dyn ObjectStore, path: &RepoPath) -> TreeResult<Option<Child>> {
        match path.split_last() {
            None => Ok(Some(Child::Dir(ROOT))),
            Some((parent, name)) => {
                let node = self.dir_at(store, &parent, path)?;
                self.child(store, node, name)
            }
        }
    }
}

fn load(store: &dyn ObjectStore, origin: Option<TreeId>) -> StorageResult<DirNode> {
    let entries = match origin {
        Some(id) => store
            .get_tree(id)?
            .into_iter()
            .map(|(name, entry)| (name, Slot::Base(entry)))
            .collect(),
        None => BTreeMap::new(),
    };
    Ok(DirNode {
        origin,
        entries,
        modified: false,
    })
}
