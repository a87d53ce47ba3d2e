//! Transaction lifecycle states.
//!
//! ```text
//! Active ─► Preparing ─► Prepared ─► Committing ─► Committed
//!   │           │            │
//!   │           ├─► Conflicted (caller must abort)
//!   ▼           ▼            ▼
//!        Aborting ─► Aborted
//! ```

use std::fmt;

/// Where a transaction is in its commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    /// Accepting working tree operations.
    Active,
    /// Serializing the tree and reconciling with the head.
    Preparing,
    /// Voted to commit; holds the commit lock unless there is nothing to write.
    Prepared,
    /// Writing the commit and advancing the ref.
    Committing,
    Committed,
    Aborting,
    Aborted,
    /// Prepare found conflicts; only abort is accepted.
    Conflicted,
}

impl TxState {
    /// Committed or aborted: nothing more can happen.
    pub fn is_finished(&self) -> bool {
        matches!(self, TxState::Committed | TxState::Aborted)
    }

    /// whether working tree mutations are allowed
    pub fn accepts_writes(&self) -> bool {
        matches!(self, TxState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Active => "active",
            TxState::Preparing => "preparing",
            TxState::Prepared => "prepared",
            TxState::Committing => "committing",
            TxState::Committed => "committed",
            TxState::Aborting => "aborting",
            TxState::Aborted => "aborted",
            TxState::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
