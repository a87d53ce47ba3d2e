//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps `git2::Repository`
//!  with thread-safe access and is the concrete [`ObjectStore`] the rest of the
//!  system commits through.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::{Repository, RepositoryInitOptions};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::storage::blob;
use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::store::ObjectStore;
use crate::storage::tree;
use crate::storage::types::{
    BlobId, CommitId, CommitMetadata, GitSignature, RefName, TreeEntries, TreeId,
};

/// Options used when a repository has to be created.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub bare: bool,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

/// The main Git repository wrapper.
///
/// Clone this to share it - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    git_dir: PathBuf,
    bare: bool,
}

impl GitRepository {
    fn wrap(repo: Repository, path: &Path) -> Self {
        let git_dir = repo.path().to_path_buf();
        let bare = repo.is_bare();
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                git_dir,
                bare,
            }),
        }
    }

    /// Open an existing repository (bare or with a working copy).
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo =
            Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Ok(Self::wrap(repo, path))
    }

    /// Initialize a new repository.
    pub fn init(path: impl AsRef<Path>, options: &InitOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        let mut init = RepositoryInitOptions::new();
        init.bare(options.bare).mkpath(true);
        let repo = Repository::init_opts(path, &init)?;

        {
            let mut config = repo.config()?;
            if let Some(name) = &options.user_name {
                config.set_str("user.name", name)?;
            }
            if let Some(email) = &options.user_email {
                config.set_str("user.email", email)?;
            }
            config.set_bool("core.quotepath", false)?;
        }

        debug!(path = %path.display(), bare = options.bare, "initialized repository");
        Ok(Self::wrap(repo, path))
    }

    /// Open a repository, creating it first if nothing is there.
    pub fn open_or_init(path: impl AsRef<Path>, options: &InitOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(repo) => Ok(repo),
            Err(StorageError::NotInitialized(_)) => Self::init(path, options),
            Err(e) => Err(e),
        }
    }

    /// Get the repository path as given by the caller.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The git directory (`.git` or the bare repository itself).
    pub fn git_dir(&self) -> &Path {
        &self.inner.git_dir
    }

    pub fn is_bare(&self) -> bool {
        self.inner.bare
    }

    /// Execute a function with exclusive access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== High-level Operations ====================

    /// The branch `HEAD` is attached to.
    pub fn head_branch(&self) -> StorageResult<RefName> {
        self.with_repo(RefManager::head_branch)
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Resolve a revision expression to a commit.
    pub fn resolve_revision(&self, rev: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| commit::resolve_revision(repo, rev))
    }

    /// First-parent history from `start`, newest first, at most `limit` entries.
    pub fn history(&self, start: CommitId, limit: usize) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| commit::first_parent_log(repo, start, limit))
    }

    /// Nearest common ancestor of two commits, `None` for unrelated histories.
    pub fn merge_base(&self, a: CommitId, b: CommitId) -> StorageResult<Option<CommitId>> {
        self.with_repo(|repo| match repo.merge_base(a.raw(), b.raw()) {
            Ok(oid) => Ok(Some(CommitId::new(oid))),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    /// Signature configured for this repository, or the crate default.
    pub fn default_signature(&self) -> GitSignature {
        self.with_repo(|repo| {
            Ok(repo
                .signature()
                .ok()
                .and_then(|sig| match (sig.name(), sig.email()) {
                    (Some(name), Some(email)) => Some(GitSignature::new(name, email)),
                    _ => None,
                })
                .unwrap_or_default())
        })
        .unwrap_or_default()
    }

    /// Refresh the working copy after `name` moved.
    ///
    /// Only applies to non-bare repositories whose `HEAD` is attached to
    /// `name`. Failures are logged, never returned: the commit already happened.
    pub fn sync_workdir(&self, name: &RefName) {
        if self.is_bare() {
            return;
        }
        let result = self.with_repo(|repo| {
            if !RefManager::is_head_branch(repo, name) {
                return Ok(());
            }
            let mut checkout = CheckoutBuilder::new();
            checkout.force().remove_untracked(false);
            repo.checkout_head(Some(&mut checkout))?;
            Ok(())
        });
        if let Err(e) = result {
            warn!(branch = %name, error = %e, "failed to update working copy");
        }
    }
}

impl ObjectStore for GitRepository {
    fn get_tree(&self, id: TreeId) -> StorageResult<TreeEntries> {
        self.with_repo(|repo| tree::read_tree(repo, id))
    }

    fn get_blob(&self, id: BlobId) -> StorageResult<Vec<u8>> {
        self.with_repo(|repo| blob::read_blob(repo, id))
    }

    fn put_blob(&self, data: &[u8]) -> StorageResult<BlobId> {
        self.with_repo(|repo| blob::write_blob(repo, data))
    }

    fn hash_blob(&self, data: &[u8]) -> StorageResult<BlobId> {
        blob::hash_blob(data)
    }

    fn put_tree(&self, entries: &TreeEntries) -> StorageResult<TreeId> {
        self.with_repo(|repo| tree::write_tree(repo, entries))
    }

    fn put_commit(
        &self,
        tree: TreeId,
        parents: &[CommitId],
        metadata: &CommitMetadata,
    ) -> StorageResult<CommitId> {
        let signature = metadata.signature(&self.default_signature());
        self.with_repo(|repo| {
            CommitBuilder::new(repo, tree)
                .parents(parents)
                .message(metadata.message())
                .signature(signature)
                .write()
        })
    }

    fn commit_tree(&self, id: CommitId) -> StorageResult<TreeId> {
        self.get_commit(id).map(|info| info.tree_id)
    }

    fn commit_parents(&self, id: CommitId) -> StorageResult<Vec<CommitId>> {
        self.get_commit(id).map(|info| info.parent_ids)
    }

    fn resolve_ref(&self, name: &RefName) -> StorageResult<Option<CommitId>> {
        self.with_repo(|repo| RefManager::resolve(repo, name))
    }

    fn update_ref(
        &self,
        name: &RefName,
        expected: Option<CommitId>,
        new: CommitId,
    ) -> StorageResult<bool> {
        self.with_repo(|repo| RefManager::update_if_unchanged(repo, name, expected, new))
    }

    fn three_way_text_merge(
        &self,
        base: BlobId,
        ours: BlobId,
        theirs: BlobId,
    ) -> StorageResult<Option<Vec<u8>>> {
        self.with_repo(|repo| blob::merge_text(repo, base, ours, theirs))
    }
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.inner.path)
            .field("bare", &self.inner.bare)
            .finish()
    }
}
