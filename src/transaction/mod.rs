//! Transactions over the repository tree.
//!
//! Each [`Transaction`] snapshots its branch at begin, accumulates edits in a
//! private working tree, and commits through a two-phase protocol: prepare
//! serializes the tree, takes the repository's commit lock, and merges with
//! whatever landed on the branch meanwhile; finish writes the commit and
//! moves the branch with compare-and-swap.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Coordinator                           │
//! │      (collects participants, prepare all, finish all)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ Participant
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Transaction                           │
//! │             (state machine, owns the working tree)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ WorkingTree │       │ MergeEngine │       │    Lock     │
//!  │  (overlay)  │       │  (3-way)    │       │  Manager    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use acidtree::transaction::{LockManager, Transaction};
//!
//! let locks = LockManager::for_repository(&repo);
//! let mut tx = Transaction::begin(repo.clone(), repo.head_branch()?, locks)?;
//!
//! tx.write(&RepoPath::parse("/notes.txt")?, b"hello".to_vec())?;
//!
//! // Commit or abort
//! tx.commit(&CommitMetadata::new().with_message("add notes"))?;  // or tx.abort();
//! ```

mod context;
mod error;
mod lock;
mod participant;
mod state;

pub use context::Transaction;
pub use error::{TransactionError, TransactionResult};
pub use lock::{LockError, LockHandle, LockManager};
pub use participant::{Coordinator, Outcome, Participant};
pub use state::TxState;
