//!  Branch and reference management.
//!
//!  Git refs are pointers to commits. This module handles:
//! - finding the branch `HEAD` points at (even while it is unborn)
//! - resolving a branch to its tip, if it has one
//! - compare-and-swap branch updates
//!
//! The compare-and-swap is what lets a committer notice a writer that did not
//! take the repository lock.

use git2::{ErrorCode, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, RefName};

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch to its current commit, `None` if it has no commits yet.
    pub fn resolve(repo: &Repository, name: &RefName) -> StorageResult<Option<CommitId>> {
        let reference = match repo.find_reference(name.as_str()) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(name.to_string()))?;

        Ok(Some(CommitId::new(commit.id())))
    }

    /// The branch `HEAD` is attached to.
    pub fn head_branch(repo: &Repository) -> StorageResult<RefName> {
        let head = repo.find_reference("HEAD")?;
        match head.symbolic_target() {
            Some(target) => RefName::branch(target),
            None => Err(StorageError::DetachedHead),
        }
    }

    /// check whether `name` is the branch `HEAD` is attached to
    pub fn is_head_branch(repo: &Repository, name: &RefName) -> bool {
        Self::head_branch(repo)
            .map(|head| &head == name)
            .unwrap_or(false)
    }

    /// Move a branch only if it still points at `expected`.
    ///
    /// `expected == None` means the branch must not exist yet. Returns
    /// `Ok(false)` when somebody else moved (or created) the branch first.
    pub fn update_if_unchanged(
        repo: &Repository,
        name: &RefName,
        expected: Option<CommitId>,
        new_target: CommitId,
    ) -> StorageResult<bool> {
        let log_message = format!("acidtree: advance to {}", new_target.short());

        let result = match expected {
            Some(old) => repo
                .reference_matching(name.as_str(), new_target.raw(), true, old.raw(), &log_message)
                .map(|_| ()),
            None => repo
                .reference(name.as_str(), new_target.raw(), false, &log_message)
                .map(|_| ()),
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Exists | ErrorCode::NotFound) => {
                Ok(false)
            }
            Err(e) => Err(StorageError::Git(e)),
        }
    }
}
