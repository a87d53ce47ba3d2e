//! In-memory working tree for a single transaction.
//!
//! A [`WorkingTree`] overlays a base tree with the transaction's edits. Reads
//! fall through to the base lazily; writes stay in memory until the
//! transaction serializes the overlay at prepare time.

mod error;
mod overlay;
mod path;

pub use error::{TreeError, TreeResult};
pub use overlay::WorkingTree;
pub use path::RepoPath;
