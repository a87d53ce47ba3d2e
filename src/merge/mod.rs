//! Three-way merge of trees.
//!
//! When a transaction prepares against a head that moved since it started,
//! [`MergeEngine`] folds the concurrent commits into the transaction's tree
//! or reports every path it could not reconcile.

mod conflict;
mod engine;

pub use conflict::{Conflict, ConflictKind, ConflictReport};
pub use engine::{MergeEngine, Reconciled};
