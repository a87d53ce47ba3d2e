//! Commit-serializing repository lock.
//!
//! # Architecture
//!
//! Committers take an exclusive OS-level lock on `<git_dir>/acidtree.lock`
//! for the span from re-reading the head to advancing the ref. Everything
//! else (building blobs and trees) happens outside the lock.
//!
//! The lock is advisory: only processes going through this crate against
//! the same repository path exclude each other.
//!
//! # Invariants
//!
//! - Acquisition blocks without timeout; contention never fails
//! - A [`LockHandle`] releases on drop, on every exit path
//! - Separate handles exclude each other even within one process

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, trace};

use crate::storage::GitRepository;

/// Errors from the locking primitive.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to create or open the lock file.
    #[error("failed to create lock {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(std::io::Error),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(std::io::Error),
}

/// Hands out exclusive holds on one repository's commit lock.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    /// Name of the lock file inside the git directory.
    pub const LOCK_FILE: &'static str = "acidtree.lock";

    /// Lock manager for `repo`, keyed to its git directory.
    pub fn for_repository(repo: &GitRepository) -> Self {
        Self::at(repo.git_dir().join(Self::LOCK_FILE))
    }

    /// Lock manager using an explicit lock file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, LockError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| LockError::CreateFailed {
                path: self.path.clone(),
                source,
            })
    }

    /// Block until the lock is ours.
    pub fn acquire(&self) -> Result<LockHandle, LockError> {
        let file = self.open()?;
        trace!(path = %self.path.display(), "waiting for commit lock");
        file.lock_exclusive().map_err(LockError::AcquireFailed)?;
        debug!(path = %self.path.display(), "acquired commit lock");
        Ok(LockHandle {
            path: self.path.clone(),
            file: Some(file),
        })
    }

    /// Take the lock if it is free, `None` if someone else holds it.
    pub fn try_acquire(&self) -> Result<Option<LockHandle>, LockError> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(LockHandle {
                path: self.path.clone(),
                file: Some(file),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            // fs2 reports contention as the platform's lock error on some targets
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(LockError::AcquireFailed(e)),
        }
    }

    /// Give the lock back.
    pub fn release(&self, mut handle: LockHandle) -> Result<(), LockError> {
        handle.release()
    }
}

/// Exclusive hold on the commit lock, released on drop.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    file: Option<File>,
}

impl LockHandle {
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release early; dropping does the same, ignoring errors.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock().map_err(LockError::ReleaseFailed)?;
            debug!(path = %self.path.display(), "released commit lock");
        }
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            debug!(path = %self.path.display(), "released commit lock on drop");
        }
    }
}
