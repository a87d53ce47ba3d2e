//! The narrow object-store boundary the transactional core talks through.
//!
//! Everything above the storage layer (working tree, merge engine) is written
//! against [`ObjectStore`] rather than `git2`, so the core never depends on the
//! on-disk format.

use crate::storage::error::StorageResult;
use crate::storage::types::{BlobId, CommitId, CommitMetadata, RefName, TreeEntries, TreeId};

/// Content-addressable object store operations used by the transactional core.
pub trait ObjectStore {
    /// read the entries of a tree
    fn get_tree(&self, id: TreeId) -> StorageResult<TreeEntries>;

    /// read the content of a blob
    fn get_blob(&self, id: BlobId) -> StorageResult<Vec<u8>>;

    /// store bytes as a blob
    fn put_blob(&self, data: &[u8]) -> StorageResult<BlobId>;

    /// compute the id `data` would have as a blob, without storing it
    fn hash_blob(&self, data: &[u8]) -> StorageResult<BlobId>;

    /// store a tree built from `entries`
    fn put_tree(&self, entries: &TreeEntries) -> StorageResult<TreeId>;

    /// store a commit object; does not move any ref
    fn put_commit(
        &self,
        tree: TreeId,
        parents: &[CommitId],
        metadata: &CommitMetadata,
    ) -> StorageResult<CommitId>;

    /// root tree of a commit
    fn commit_tree(&self, id: CommitId) -> StorageResult<TreeId>;

    /// parents of a commit, in order
    fn commit_parents(&self, id: CommitId) -> StorageResult<Vec<CommitId>>;

    /// current commit of a ref, `None` while the branch is unborn
    fn resolve_ref(&self, name: &RefName) -> StorageResult<Option<CommitId>>;

    /// move `name` from `expected` to `new` atomically.
    ///
    /// Returns `false` without touching the ref when its current value is not
    /// `expected` (`None` meaning the ref must not exist yet).
    fn update_ref(
        &self,
        name: &RefName,
        expected: Option<CommitId>,
        new: CommitId,
    ) -> StorageResult<bool>;

    /// three-way merge of text blobs; `None` when hunks overlap
    fn three_way_text_merge(
        &self,
        base: BlobId,
        ours: BlobId,
        theirs: BlobId,
    ) -> StorageResult<Option<Vec<u8>>>;
}
