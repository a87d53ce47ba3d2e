//! Three-way tree reconciliation.
//!
//! Resolution order for a path changed on both sides:
//!
//! 1. identical result on both sides (including both deleted) => take it
//! 2. directory on both sides => recurse
//! 3. deleted on one side => delete/modify conflict
//! 4. file on both sides with no base file => add/add conflict
//! 5. file on both sides with a base file => text merge, or content conflict
//! 6. file against directory, on either side or in the base => type conflict
//!
//! Change detection is by object id, so an untouched subtree is never read.

use std::collections::BTreeSet;

use tracing::debug;

use crate::merge::conflict::{ConflictKind, ConflictReport};
use crate::storage::{is_binary, BlobId, EntryRef, ObjectStore, StorageResult, TreeEntries, TreeId};
use crate::worktree::RepoPath;

/// Outcome of [`MergeEngine::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Merged(TreeId),
    Conflicted(ConflictReport),
}

/// Reconciles a transaction's tree with commits that landed after its base.
pub struct MergeEngine<'a> {
    store: &'a dyn ObjectStore,
    report: ConflictReport,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            report: ConflictReport::new(),
        }
    }

    /// Merge `ours` and `theirs`, both descended from `base`.
    ///
    /// `base == None` stands for the empty tree. All conflicts are collected
    /// before giving up; no merged tree is returned if there is any.
    pub fn reconcile(
        mut self,
        base: Option<TreeId>,
        ours: TreeId,
        theirs: TreeId,
    ) -> StorageResult<Reconciled> {
        let merged = self.merge_dirs(&RepoPath::root(), base, ours, theirs)?;

        if self.report.is_empty() {
            debug!(tree = %merged, "merged concurrent changes");
            Ok(Reconciled::Merged(merged))
        } else {
            debug!(conflicts = self.report.len(), "merge produced conflicts");
            Ok(Reconciled::Conflicted(self.report))
        }
    }

    fn merge_dirs(
        &mut self,
        dir: &RepoPath,
        base: Option<TreeId>,
        ours: TreeId,
        theirs: TreeId,
    ) -> StorageResult<TreeId> {
        if ours == theirs || base == Some(theirs) {
            return Ok(ours);
        }
        if base == Some(ours) {
            return Ok(theirs);
        }

        let base_entries = match base {
            Some(id) => self.store.get_tree(id)?,
            None => TreeEntries::new(),
        };
        let our_entries = self.store.get_tree(ours)?;
        let their_entries = self.store.get_tree(theirs)?;

        let names: BTreeSet<&String> = base_entries
            .keys()
            .chain(our_entries.keys())
            .chain(their_entries.keys())
            .collect();

        let mut merged = TreeEntries::new();
        for name in names {
            let resolved = self.merge_entry(
                &dir.join(name),
                base_entries.get(name).copied(),
                our_entries.get(name).copied(),
                their_entries.get(name).copied(),
            )?;
            if let Some(entry) = resolved {
                merged.insert(name.clone(), entry);
            }
        }

        // placeholder once a conflict is recorded; the result is discarded
        if !self.report.is_empty() {
            return Ok(ours);
        }
        self.store.put_tree(&merged)
    }

    fn merge_entry(
        &mut self,
        path: &RepoPath,
        base: Option<EntryRef>,
        ours: Option<EntryRef>,
        theirs: Option<EntryRef>,
    ) -> StorageResult<Option<EntryRef>> {
        if ours == theirs || theirs == base {
            return Ok(ours);
        }
        if ours == base {
            return Ok(theirs);
        }

        match (base, ours, theirs) {
            (_, Some(EntryRef::Tree(o)), Some(EntryRef::Tree(t))) => {
                let base_tree = match base {
                    Some(EntryRef::Tree(b)) => Some(b),
                    _ => None,
                };
                let merged = self.merge_dirs(path, base_tree, o, t)?;
                Ok(Some(EntryRef::Tree(merged)))
            }
            (_, None, Some(_)) | (_, Some(_), None) => {
                self.conflict(path, ConflictKind::DeleteModify);
                Ok(None)
            }
            (Some(EntryRef::Blob(b)), Some(EntryRef::Blob(o)), Some(EntryRef::Blob(t))) => {
                self.merge_text(path, b, o, t)
            }
            // a directory turned into a file on both sides
            (Some(EntryRef::Tree(_)), Some(EntryRef::Blob(_)), Some(EntryRef::Blob(_))) => {
                self.conflict(path, ConflictKind::Type);
                Ok(None)
            }
            (_, Some(EntryRef::Blob(_)), Some(EntryRef::Blob(_))) => {
                self.conflict(path, ConflictKind::AddAdd);
                Ok(None)
            }
            (_, Some(_), Some(_)) => {
                self.conflict(path, ConflictKind::Type);
                Ok(None)
            }
            (_, None, None) => Ok(None),
        }
    }

    fn merge_text(
        &mut self,
        path: &RepoPath,
        base: BlobId,
        ours: BlobId,
        theirs: BlobId,
    ) -> StorageResult<Option<EntryRef>> {
        for id in [base, ours, theirs] {
            if is_binary(&self.store.get_blob(id)?) {
                self.conflict(path, ConflictKind::Content);
                return Ok(None);
            }
        }

        match self.store.three_way_text_merge(base, ours, theirs)? {
            Some(merged) => Ok(Some(EntryRef::Blob(self.store.put_blob(&merged)?))),
            None => {
                self.conflict(path, ConflictKind::Content);
                Ok(None)
            }
        }
    }

    fn conflict(&mut self, path: &RepoPath, kind: ConflictKind) {
        debug!(path = %path, kind = %kind, "merge conflict");
        self.report.push(path.to_string(), kind);
    }
}
