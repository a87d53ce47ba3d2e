//! Storage layer error types
//!
//! Everything that can go wrong between the transactional core and the git
//! object database surfaces as a [`StorageError`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    /// HEAD does not point at a branch
    #[error("HEAD is detached; name a branch explicitly")]
    DetachedHead,

    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// a revision expression did not resolve to a commit
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// tree or blob missing from the object database
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// a tree entry that is neither a blob nor a tree, e.g. a submodule commit
    #[error("unexpected entry type at {path}: expected {expected}, found {found}")]
    UnexpectedEntryType {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// nothing that git recognizes as a repository at this path
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// the object database handed back something it should not have
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
                | StorageError::RevisionNotFound(_)
                | StorageError::ObjectNotFound(_)
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
