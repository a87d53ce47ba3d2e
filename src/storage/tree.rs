//! tree operations.
//!
//! in Git, a tree is a directory. Trees are read one level at a time into a
//! [`TreeEntries`] map and written back the same way, so callers only ever pay
//! for the directories they actually touch.

use git2::{FileMode, ObjectType, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, EntryRef, TreeEntries, TreeId};

/// read the direct entries of a tree
pub fn read_tree(repo: &Repository, tree_id: TreeId) -> StorageResult<TreeEntries> {
    let tree = repo
        .find_tree(tree_id.raw())
        .map_err(|_| StorageError::ObjectNotFound(tree_id.to_string()))?;

    let mut entries = TreeEntries::new();
    for entry in tree.iter() {
        let name = entry.name().ok_or_else(|| {
            StorageError::Internal(format!("tree {} has a non utf-8 entry name", tree_id))
        })?;

        let value = match entry.kind() {
            Some(ObjectType::Blob) => EntryRef::Blob(BlobId::new(entry.id())),
            Some(ObjectType::Tree) => EntryRef::Tree(TreeId::new(entry.id())),
            other => {
                return Err(StorageError::UnexpectedEntryType {
                    path: name.into(),
                    expected: "blob or tree".to_string(),
                    found: format!("{:?}", other),
                })
            }
        };
        entries.insert(name.to_string(), value);
    }

    Ok(entries)
}

/// write a tree from its entries
///
/// identical entries always produce the same tree id.
pub fn write_tree(repo: &Repository, entries: &TreeEntries) -> StorageResult<TreeId> {
    let mut builder = repo.treebuilder(None)?;
    for (name, entry) in entries {
        let mode = match entry {
            EntryRef::Blob(_) => FileMode::Blob,
            EntryRef::Tree(_) => FileMode::Tree,
        };
        builder.insert(name.as_str(), entry.raw(), mode.into())?;
    }
    let oid = builder.write()?;
    Ok(TreeId::new(oid))
}

/// the empty tree, written to the object database
pub fn empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    write_tree(repo, &TreeEntries::new())
}
