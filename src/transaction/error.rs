//! Transaction error types.

use thiserror::Error;

use crate::merge::ConflictReport;
use crate::storage::StorageError;
use crate::transaction::lock::LockError;
use crate::worktree::TreeError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Filesystem-shaped error from the working tree.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Concurrent commits could not be merged with this transaction's changes.
    #[error("merge conflict: {0}")]
    Conflict(ConflictReport),

    /// The locking primitive itself failed (contention blocks instead).
    #[error("commit lock failed: {0}")]
    LockAcquisition(#[from] LockError),

    /// The ref moved while the commit lock was held.
    #[error("branch {branch} changed under the commit lock (expected {expected})")]
    RefRace { branch: String, expected: String },

    /// Transaction was already committed, aborted or left conflicted.
    #[error("transaction {tx_id} is no longer active (state: {state})")]
    NotActive { tx_id: String, state: String },

    /// Invalid operation for current transaction state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A coordinator participant voted to abort.
    #[error("participant {participant} voted to abort: {source}")]
    Vetoed {
        participant: String,
        source: Box<TransactionError>,
    },
}

impl TransactionError {
    /// Check if this error is retryable by starting a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Conflict(_) => true,
            TransactionError::Vetoed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.conflict_report().is_some()
    }

    /// the conflict report, looking through coordinator vetoes
    pub fn conflict_report(&self) -> Option<&ConflictReport> {
        match self {
            TransactionError::Conflict(report) => Some(report),
            TransactionError::Vetoed { source, .. } => source.conflict_report(),
            _ => None,
        }
    }

    /// the working tree error, if this is one
    pub fn tree_error(&self) -> Option<&TreeError> {
        match self {
            TransactionError::Tree(e) => Some(e),
            _ => None,
        }
    }

    /// check if this error indicates the path doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.tree_error().is_some_and(TreeError::is_not_found)
    }
}
