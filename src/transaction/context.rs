//! A single transaction over the repository tree.
//!
//! The transaction owns a [`WorkingTree`] rooted at the commit its branch
//! pointed to when it began. Nothing reaches the object store until
//! [`Transaction::prepare`]; nothing moves the branch until
//! [`Transaction::finish_commit`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::merge::{MergeEngine, Reconciled};
use crate::storage::{
    CommitId, CommitMetadata, EntryRef, GitRepository, ObjectStore, RefName, TreeEntries, TreeId,
};
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::lock::{LockHandle, LockManager};
use crate::transaction::state::TxState;
use crate::worktree::{RepoPath, WorkingTree};

/// What finish will write, decided at prepare time.
#[derive(Debug)]
enum PendingCommit {
    /// nothing changed relative to the head
    Noop,
    Commit {
        tree: TreeId,
        parents: Vec<CommitId>,
        expected: Option<CommitId>,
        metadata: CommitMetadata,
    },
}

/// One logical unit of work on a branch.
#[derive(Debug)]
pub struct Transaction {
    id: String,
    repo: GitRepository,
    ref_name: RefName,
    base_commit: Option<CommitId>,
    tree: WorkingTree,
    state: TxState,
    locks: LockManager,
    lock: Option<LockHandle>,
    pending: Option<PendingCommit>,
    started_at: DateTime<Utc>,
}

impl Transaction {
    /// Begin a transaction at the current head of `ref_name`.
    pub fn begin(
        repo: GitRepository,
        ref_name: RefName,
        locks: LockManager,
    ) -> TransactionResult<Self> {
        let base_commit = repo.resolve_ref(&ref_name)?;
        Self::begin_at(repo, ref_name, locks, base_commit)
    }

    /// Begin a transaction whose snapshot is `base_commit` (`None` for an
    /// empty tree) rather than the current head.
    pub fn begin_at(
        repo: GitRepository,
        ref_name: RefName,
        locks: LockManager,
        base_commit: Option<CommitId>,
    ) -> TransactionResult<Self> {
        let tree = Self::load_tree(&repo, base_commit)?;
        let id = Ulid::new().to_string().to_lowercase();

        debug!(
            tx_id = %id,
            branch = %ref_name,
            base = ?base_commit.map(|c| c.short()),
            "began transaction"
        );

        Ok(Self {
            id,
            repo,
            ref_name,
            base_commit,
            tree,
            state: TxState::Active,
            locks,
            lock: None,
            pending: None,
            started_at: Utc::now(),
        })
    }

    fn load_tree(repo: &GitRepository, commit: Option<CommitId>) -> TransactionResult<WorkingTree> {
        let base_tree = commit.map(|c| repo.commit_tree(c)).transpose()?;
        Ok(WorkingTree::new(repo, base_tree)?)
    }

    // ==================== Accessors ====================

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// branch this transaction commits to
    pub fn ref_name(&self) -> &RefName {
        &self.ref_name
    }

    /// Commit the snapshot was taken from, `None` on an unborn branch.
    pub fn base_commit(&self) -> Option<CommitId> {
        self.base_commit
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// true once a mutating call succeeded
    pub fn is_dirty(&self) -> bool {
        self.tree.is_dirty()
    }

    /// whether the commit lock is currently held
    pub fn holds_lock(&self) -> bool {
        self.lock.as_ref().is_some_and(LockHandle::is_held)
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Move the snapshot to another commit. Only allowed before any change.
    pub fn set_base(&mut self, commit: Option<CommitId>) -> TransactionResult<()> {
        self.ensure_writable()?;
        if self.tree.is_dirty() {
            return Err(TransactionError::InvalidOperation(
                "cannot change the base of a transaction with pending changes".to_string(),
            ));
        }
        self.tree = Self::load_tree(&self.repo, commit)?;
        self.base_commit = commit;
        debug!(tx_id = %self.id, base = ?commit.map(|c| c.short()), "rebased transaction");
        Ok(())
    }

    fn ensure_writable(&self) -> TransactionResult<()> {
        if self.state.accepts_writes() {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    fn ensure_readable(&self) -> TransactionResult<()> {
        if self.state.is_finished() {
            Err(self.not_active())
        } else {
            Ok(())
        }
    }

    fn not_active(&self) -> TransactionError {
        TransactionError::NotActive {
            tx_id: self.id.clone(),
            state: self.state.to_string(),
        }
    }

    // ==================== Tree Operations ====================

    /// Read a file's content.
    pub fn read(&mut self, path: &RepoPath) -> TransactionResult<Vec<u8>> {
        self.ensure_readable()?;
        Ok(self.tree.read(&self.repo, path)?)
    }

    /// Names in a directory, sorted.
    pub fn list(&mut self, path: &RepoPath) -> TransactionResult<Vec<String>> {
        self.ensure_readable()?;
        Ok(self.tree.list(&self.repo, path)?)
    }

    pub fn exists(&mut self, path: &RepoPath) -> TransactionResult<bool> {
        self.ensure_readable()?;
        Ok(self.tree.exists(&self.repo, path)?)
    }

    pub fn is_dir(&mut self, path: &RepoPath) -> TransactionResult<bool> {
        self.ensure_readable()?;
        Ok(self.tree.is_dir(&self.repo, path)?)
    }

    pub fn is_empty(&mut self, path: &RepoPath) -> TransactionResult<bool> {
        self.ensure_readable()?;
        Ok(self.tree.is_empty(&self.repo, path)?)
    }

    /// Object id of a path as it stands in this transaction.
    pub fn hash(&mut self, path: &RepoPath) -> TransactionResult<EntryRef> {
        self.ensure_readable()?;
        Ok(self.tree.hash(&self.repo, path)?)
    }

    /// Create or replace a file.
    pub fn write(&mut self, path: &RepoPath, data: Vec<u8>) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.write(&self.repo, path, data)?)
    }

    pub fn mkdir(&mut self, path: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.mkdir(&self.repo, path)?)
    }

    /// Create a directory and any missing parents.
    pub fn mkdirs(&mut self, path: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.mkdirs(&self.repo, path)?)
    }

    /// Remove a file.
    pub fn remove(&mut self, path: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.remove(&self.repo, path)?)
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, path: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.remove_dir(&self.repo, path)?)
    }

    /// Remove a directory and everything below it.
    pub fn remove_tree(&mut self, path: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.remove_tree(&self.repo, path)?)
    }

    pub fn rename(&mut self, src: &RepoPath, dst: &RepoPath) -> TransactionResult<()> {
        self.ensure_writable()?;
        Ok(self.tree.rename(&self.repo, src, dst)?)
    }

    // ==================== Commit Protocol ====================

    /// Phase one: serialize, lock, reconcile with the head, vote.
    ///
    /// `Ok` is a vote to commit and leaves the transaction `Prepared`. A
    /// merge conflict leaves it `Conflicted`; any other failure aborts it.
    /// The commit lock is released on every error path.
    pub fn prepare(&mut self, metadata: &CommitMetadata) -> TransactionResult<()> {
        self.ensure_writable()?;
        self.state = TxState::Preparing;

        match self.reconcile(metadata) {
            Ok(pending) => {
                self.pending = Some(pending);
                self.state = TxState::Prepared;
                Ok(())
            }
            Err(TransactionError::Conflict(report)) => {
                self.release_lock();
                self.state = TxState::Conflicted;
                info!(
                    tx_id = %self.id,
                    conflicts = report.len(),
                    paths = %report,
                    "transaction conflicted"
                );
                Err(TransactionError::Conflict(report))
            }
            Err(e) => {
                warn!(tx_id = %self.id, error = %e, "prepare failed");
                self.abort();
                Err(e)
            }
        }
    }

    fn reconcile(&mut self, metadata: &CommitMetadata) -> TransactionResult<PendingCommit> {
        if !self.tree.is_dirty() {
            debug!(tx_id = %self.id, "nothing to commit");
            return Ok(PendingCommit::Noop);
        }

        let ours = self.tree.serialize(&self.repo)?;
        let base_tree = match self.tree.base() {
            Some(tree) => tree,
            None => self.repo.put_tree(&TreeEntries::new())?,
        };
        if ours == base_tree {
            debug!(tx_id = %self.id, "changes cancel out, nothing to commit");
            return Ok(PendingCommit::Noop);
        }

        debug!(
            tx_id = %self.id,
            changed = self.tree.changed_paths().count(),
            tree = %ours,
            "serialized working tree"
        );

        self.lock = Some(self.locks.acquire()?);
        let head = self.repo.resolve_ref(&self.ref_name)?;

        let (tree, parents) = match head {
            // unborn branch: nothing concurrent to fold in
            None => (ours, self.base_commit.into_iter().collect()),
            Some(head) if Some(head) == self.base_commit => (ours, vec![head]),
            Some(head) => {
                let ancestor = match self.base_commit {
                    Some(base) => self.repo.merge_base(head, base)?,
                    None => None,
                };
                if let (Some(base), true) = (self.base_commit, ancestor == Some(head)) {
                    // head is behind our base: nothing of theirs to fold in
                    (ours, vec![base])
                } else {
                    let merge_base = ancestor.map(|c| self.repo.commit_tree(c)).transpose()?;
                    let theirs = self.repo.commit_tree(head)?;
                    debug!(
                        tx_id = %self.id,
                        head = %head.short(),
                        "head moved since transaction began, merging"
                    );
                    match MergeEngine::new(&self.repo).reconcile(merge_base, ours, theirs)? {
                        Reconciled::Merged(merged) if merged == theirs => {
                            debug!(tx_id = %self.id, "head already contains these changes");
                            self.release_lock();
                            return Ok(PendingCommit::Noop);
                        }
                        Reconciled::Merged(merged) => {
                            let mut parents = vec![head];
                            parents.extend(self.base_commit);
                            (merged, parents)
                        }
                        Reconciled::Conflicted(report) => {
                            return Err(TransactionError::Conflict(report));
                        }
                    }
                }
            }
        };

        Ok(PendingCommit::Commit {
            tree,
            parents,
            expected: head,
            metadata: metadata.clone(),
        })
    }

    /// Phase two: write the commit and advance the branch.
    ///
    /// Returns the new commit, or `None` when there was nothing to write.
    pub fn finish_commit(&mut self) -> TransactionResult<Option<CommitId>> {
        if self.state != TxState::Prepared {
            return Err(self.not_active());
        }
        self.state = TxState::Committing;

        let pending = self.pending.take().unwrap_or(PendingCommit::Noop);
        let (tree, parents, expected, metadata) = match pending {
            PendingCommit::Noop => {
                self.release_lock();
                self.state = TxState::Committed;
                return Ok(None);
            }
            PendingCommit::Commit {
                tree,
                parents,
                expected,
                metadata,
            } => (tree, parents, expected, metadata),
        };

        let result = self.advance(tree, &parents, expected, &metadata);
        if result.is_ok() {
            // under the lock, so checkouts land in commit order
            self.repo.sync_workdir(&self.ref_name);
        }
        self.release_lock();

        match result {
            Ok(commit) => {
                self.state = TxState::Committed;
                info!(
                    tx_id = %self.id,
                    branch = %self.ref_name,
                    commit = %commit.short(),
                    merge = parents.len() > 1,
                    "committed transaction"
                );
                Ok(Some(commit))
            }
            Err(e) => {
                warn!(tx_id = %self.id, error = %e, "commit failed");
                self.abort();
                Err(e)
            }
        }
    }

    fn advance(
        &self,
        tree: TreeId,
        parents: &[CommitId],
        expected: Option<CommitId>,
        metadata: &CommitMetadata,
    ) -> TransactionResult<CommitId> {
        let commit = self.repo.put_commit(tree, parents, metadata)?;
        if !self.repo.update_ref(&self.ref_name, expected, commit)? {
            return Err(TransactionError::RefRace {
                branch: self.ref_name.to_string(),
                expected: expected.map(|c| c.short()).unwrap_or_else(|| "unborn".to_string()),
            });
        }
        Ok(commit)
    }

    /// Prepare and finish in one step, for callers without a coordinator.
    pub fn commit(&mut self, metadata: &CommitMetadata) -> TransactionResult<Option<CommitId>> {
        self.prepare(metadata)?;
        self.finish_commit()
    }

    /// Discard the working tree and any held lock.
    ///
    /// Always succeeds; a no-op once the transaction has finished.
    pub fn abort(&mut self) {
        if self.state.is_finished() {
            return;
        }
        self.state = TxState::Aborting;
        self.pending = None;
        self.release_lock();
        if let Ok(empty) = WorkingTree::new(&self.repo, None) {
            self.tree = empty;
        }
        self.state = TxState::Aborted;
        debug!(tx_id = %self.id, "aborted transaction");
    }

    fn release_lock(&mut self) {
        if let Some(mut handle) = self.lock.take() {
            if let Err(e) = handle.release() {
                warn!(tx_id = %self.id, error = %e, "failed to release commit lock");
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.release_lock();
    }
}
