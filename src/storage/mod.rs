//! storage layer for acidtree
//!
//! this module is the only place that touches git2. The transactional core
//! (working tree, merge engine) talks to it through the [`ObjectStore`] trait;
//! the transaction layer additionally uses [`GitRepository`] for repository
//! level concerns such as the lock location and working-copy sync.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ObjectStore  (trait, core boundary)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │   (dirs)    │       │   (files,   │       │  (CAS on    │
//!  │             │       │  text merge)│       │  branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (history)  │
//!                        └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use acidtree::storage::{GitRepository, InitOptions, ObjectStore, CommitMetadata};
//!
//! let repo = GitRepository::open_or_init("./data", &InitOptions::default())?;
//! let branch = repo.head_branch()?;
//!
//! let blob = repo.put_blob(b"hello")?;
//! let tree = repo.put_tree(&[("hello.txt".to_string(), EntryRef::Blob(blob))].into())?;
//! let commit = repo.put_commit(tree, &[], &CommitMetadata::new())?;
//! repo.update_ref(&branch, None, commit)?;
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod store;
mod tree;
mod types;

// Re-export public API
pub use blob::is_binary;
pub use commit::CommitInfo;
pub use error::{StorageError, StorageResult};
pub use repository::{GitRepository, InitOptions};
pub use store::ObjectStore;
pub use types::{
    BlobId, CommitId, CommitMetadata, EntryRef, GitSignature, RefName, TreeEntries, TreeId,
};
