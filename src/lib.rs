//! acidtree - ACID transactions over a Git object store
//!
//! This crate exposes a Git branch as a transactional filesystem. Reads and
//! writes go to a private working tree, a commit is an atomic ref update, and
//! transactions that raced each other are merged with three-way tree
//! reconciliation instead of failing.
//!
//! # Example
//!
//! ```no_run
//! use acidtree::Session;
//!
//! let mut fs = Session::open("./my_repo").unwrap();
//! fs.mkdirs("docs").unwrap();
//! fs.write("docs/hello.txt", b"Hello\n").unwrap();
//! fs.commit("add greeting").unwrap();
//! ```

pub mod merge;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod worktree;

pub use merge::{ConflictKind, ConflictReport};
pub use session::{CwdGuard, FileReader, FileWriter, Session, SessionConfig};
pub use storage::{CommitId, CommitInfo, CommitMetadata, GitRepository};
pub use transaction::{
    Coordinator, Outcome, Participant, Transaction, TransactionError, TransactionResult,
};
pub use worktree::{RepoPath, TreeError};
