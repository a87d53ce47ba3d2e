//! Working tree error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for working tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Filesystem-shaped errors raised by working tree operations.
///
/// Paths are carried in their absolute `/`-separated form.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage layer error while materializing or serializing.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TreeError {
    /// check if this error indicates the path doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound(_))
    }

    /// true for the errors a lookup hits when the path simply isn't there,
    /// either missing or passing through a file
    pub(crate) fn is_missing_path(&self) -> bool {
        matches!(self, TreeError::NotFound(_) | TreeError::NotADirectory(_))
    }
}
