//! Session - the filesystem-facing interface of acidtree.
//!
//! A [`Session`] keeps a current working directory and the active
//! [`Transaction`], beginning a new one lazily on first use after every
//! commit or abort. Paths are `/`-separated; a leading `/` is absolute from
//! the repository root, anything else is relative to [`Session::cwd`].
//!
//! Sessions are not meant to be shared between threads. Run one per thread
//! (or process) against the same repository path instead; their commits are
//! serialized and merged.

use std::io::{self, Read, Write};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::storage::{
    CommitId, CommitInfo, CommitMetadata, GitRepository, InitOptions, ObjectStore, RefName,
    StorageError,
};
use crate::transaction::{
    LockManager, Outcome, Participant, Transaction, TransactionError, TransactionResult,
};
use crate::worktree::{RepoPath, TreeError};

/// Session configuration options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the repository.
    pub path: PathBuf,
    /// Branch to commit to; `None` follows `HEAD`.
    pub head: Option<String>,
    /// Create the repository if it doesn't exist.
    pub create_if_missing: bool,
    /// Create as a bare repository.
    pub bare: bool,
    /// `user.name` for a newly created repository.
    pub user_name: Option<String>,
    /// `user.email` for a newly created repository.
    pub user_email: Option<String>,
    /// Sort key when committed through a coordinator.
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            head: None,
            create_if_missing: true,
            bare: false,
            user_name: None,
            user_email: None,
            name: "acidtree".to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Commit to `branch` instead of the branch `HEAD` points at.
    pub fn head(mut self, branch: impl Into<String>) -> Self {
        self.head = Some(branch.into());
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn bare(mut self, value: bool) -> Self {
        self.bare = value;
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Transactional filesystem view of one branch of a repository.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    repo: GitRepository,
    ref_name: RefName,
    locks: LockManager,
    cwd: RepoPath,
    tx: Option<Transaction>,
}

impl Session {
    /// Open or create a repository at the given path.
    pub fn open(path: impl AsRef<Path>) -> TransactionResult<Self> {
        Self::open_with_config(SessionConfig::new(path.as_ref()))
    }

    /// Open or create a repository with custom configuration.
    pub fn open_with_config(config: SessionConfig) -> TransactionResult<Self> {
        let repo = if config.create_if_missing {
            let options = InitOptions {
                bare: config.bare,
                user_name: config.user_name.clone(),
                user_email: config.user_email.clone(),
            };
            GitRepository::open_or_init(&config.path, &options)?
        } else {
            GitRepository::open(&config.path)?
        };

        let ref_name = match config.head.as_deref() {
            Some(head) if head != "HEAD" => RefName::branch(head)?,
            _ => repo.head_branch().map_err(|e| match e {
                StorageError::DetachedHead => TransactionError::InvalidOperation(
                    "HEAD is detached; name the branch to commit to".to_string(),
                ),
                e => e.into(),
            })?,
        };
        let locks = LockManager::for_repository(&repo);

        debug!(path = %config.path.display(), branch = %ref_name, "opened session");
        Ok(Self {
            config,
            repo,
            ref_name,
            locks,
            cwd: RepoPath::root(),
            tx: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// branch this session commits to
    pub fn branch(&self) -> &RefName {
        &self.ref_name
    }

    /// The active transaction, begun at the branch head if there is none.
    pub fn transaction(&mut self) -> TransactionResult<&mut Transaction> {
        let stale = self
            .tx
            .as_ref()
            .map_or(true, |tx| tx.state().is_finished());
        if stale {
            let tx = Transaction::begin(
                self.repo.clone(),
                self.ref_name.clone(),
                self.locks.clone(),
            )?;
            return Ok(self.tx.insert(tx));
        }
        self.tx
            .as_mut()
            .ok_or_else(|| TransactionError::InvalidOperation("no transaction".to_string()))
    }

    fn resolve(&self, path: &str) -> TransactionResult<RepoPath> {
        Ok(self.cwd.resolve(path)?)
    }

    // ==================== Working Directory ====================

    /// Current working directory, as an absolute path.
    pub fn cwd(&self) -> String {
        self.cwd.to_string()
    }

    /// Change the working directory. The target must be a directory.
    pub fn chdir(&mut self, path: &str) -> TransactionResult<()> {
        let target = self.resolve(path)?;
        let tx = self.transaction()?;
        if !tx.is_dir(&target)? {
            return Err(if tx.exists(&target)? {
                TreeError::NotADirectory(target.to_string()).into()
            } else {
                TreeError::NotFound(target.to_string()).into()
            });
        }
        self.cwd = target;
        Ok(())
    }

    /// Change the working directory until the returned guard is dropped.
    pub fn cd(&mut self, path: &str) -> TransactionResult<CwdGuard<'_>> {
        let previous = self.cwd.clone();
        self.chdir(path)?;
        Ok(CwdGuard {
            session: self,
            previous,
        })
    }

    // ==================== Files ====================

    /// Open a file for reading.
    pub fn open_read(&mut self, path: &str) -> TransactionResult<FileReader> {
        let data = self.read(path)?;
        Ok(FileReader {
            inner: io::Cursor::new(data),
        })
    }

    /// Open a file for writing, truncating it.
    pub fn open_write(&mut self, path: &str) -> TransactionResult<FileWriter<'_>> {
        let path = self.resolve(path)?;
        self.transaction()?.write(&path, Vec::new())?;
        Ok(FileWriter::new(self, path, Vec::new()))
    }

    /// Open a file for writing after its current content.
    pub fn open_append(&mut self, path: &str) -> TransactionResult<FileWriter<'_>> {
        let path = self.resolve(path)?;
        let tx = self.transaction()?;
        let existing = match tx.read(&path) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                tx.write(&path, Vec::new())?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(FileWriter::new(self, path, existing))
    }

    /// Create a new file for writing; fails if anything exists at `path`.
    pub fn create(&mut self, path: &str) -> TransactionResult<FileWriter<'_>> {
        let path = self.resolve(path)?;
        let tx = self.transaction()?;
        if tx.is_dir(&path)? {
            return Err(TreeError::IsADirectory(path.to_string()).into());
        }
        if tx.exists(&path)? {
            return Err(TreeError::AlreadyExists(path.to_string()).into());
        }
        tx.write(&path, Vec::new())?;
        Ok(FileWriter::new(self, path, Vec::new()))
    }

    /// Read a whole file.
    pub fn read(&mut self, path: &str) -> TransactionResult<Vec<u8>> {
        let path = self.resolve(path)?;
        self.transaction()?.read(&path)
    }

    /// Replace a whole file.
    pub fn write(&mut self, path: &str, data: &[u8]) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.write(&path, data.to_vec())
    }

    pub fn append(&mut self, path: &str, data: &[u8]) -> TransactionResult<()> {
        let mut writer = self.open_append(path)?;
        writer.extend(data);
        writer.finish()
    }

    // ==================== Directories ====================

    /// Names in a directory, sorted. `""` lists the working directory.
    pub fn list(&mut self, path: &str) -> TransactionResult<Vec<String>> {
        let path = self.resolve(path)?;
        self.transaction()?.list(&path)
    }

    /// Create a directory; its parent must exist.
    pub fn mkdir(&mut self, path: &str) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.mkdir(&path)
    }

    /// Create a directory and any missing ancestors.
    pub fn mkdirs(&mut self, path: &str) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.mkdirs(&path)
    }

    /// Remove a single file.
    pub fn remove(&mut self, path: &str) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.remove(&path)
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, path: &str) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.remove_dir(&path)
    }

    /// Remove a directory and all of its contents.
    pub fn remove_tree(&mut self, path: &str) -> TransactionResult<()> {
        let path = self.resolve(path)?;
        self.transaction()?.remove_tree(&path)
    }

    /// Move a file or directory.
    pub fn rename(&mut self, src: &str, dst: &str) -> TransactionResult<()> {
        let src = self.resolve(src)?;
        let dst = self.resolve(dst)?;
        self.transaction()?.rename(&src, &dst)
    }

    pub fn exists(&mut self, path: &str) -> TransactionResult<bool> {
        let path = self.resolve(path)?;
        self.transaction()?.exists(&path)
    }

    pub fn is_dir(&mut self, path: &str) -> TransactionResult<bool> {
        let path = self.resolve(path)?;
        self.transaction()?.is_dir(&path)
    }

    /// Whether a directory has no entries.
    pub fn is_empty(&mut self, path: &str) -> TransactionResult<bool> {
        let path = self.resolve(path)?;
        self.transaction()?.is_empty(&path)
    }

    /// Git object id of a file or directory, pending edits included.
    pub fn hash(&mut self, path: &str) -> TransactionResult<String> {
        let path = self.resolve(path)?;
        Ok(self.transaction()?.hash(&path)?.to_hex())
    }

    // ==================== Transactions ====================

    /// Commit the current transaction is based on.
    pub fn get_base(&mut self) -> TransactionResult<Option<CommitId>> {
        Ok(self.transaction()?.base_commit())
    }

    /// Rebase the current, untouched transaction onto `rev` (any revision
    /// expression: commit id, branch, tag).
    pub fn set_base(&mut self, rev: &str) -> TransactionResult<()> {
        let commit = self.repo.resolve_revision(rev)?;
        self.transaction()?.set_base(Some(commit))
    }

    /// Commit the current transaction with a message.
    pub fn commit(&mut self, message: &str) -> TransactionResult<Option<CommitId>> {
        self.commit_with(&CommitMetadata::new().with_message(message))
    }

    /// Commit the current transaction.
    ///
    /// Returns the new commit, `None` when there was nothing to commit. On
    /// any failure the transaction is aborted; the next call starts afresh.
    pub fn commit_with(&mut self, metadata: &CommitMetadata) -> TransactionResult<Option<CommitId>> {
        let Some(mut tx) = self.tx.take() else {
            return Ok(None);
        };
        if tx.state().is_finished() {
            return Ok(None);
        }
        tx.commit(metadata).map_err(|e| {
            tx.abort();
            e
        })
    }

    /// Throw away the current transaction.
    pub fn abort(&mut self) {
        if let Some(mut tx) = self.tx.take() {
            tx.abort();
        }
    }

    /// First-parent history of the branch, newest first.
    pub fn log(&self, limit: usize) -> TransactionResult<Vec<CommitInfo>> {
        match self.repo.resolve_ref(&self.ref_name)? {
            Some(head) => Ok(self.repo.history(head, limit)?),
            None => Ok(Vec::new()),
        }
    }
}

impl Participant for Session {
    fn sort_key(&self) -> String {
        self.config.name.clone()
    }

    fn prepare(&mut self, metadata: &CommitMetadata) -> TransactionResult<()> {
        match self.tx.as_mut() {
            Some(tx) if !tx.state().is_finished() => tx.prepare(metadata),
            _ => Ok(()),
        }
    }

    fn finish(&mut self, outcome: Outcome) -> TransactionResult<Option<CommitId>> {
        match self.tx.take() {
            Some(mut tx) if !tx.state().is_finished() => Participant::finish(&mut tx, outcome),
            _ => Ok(None),
        }
    }
}

/// Restores the previous working directory when dropped.
#[derive(Debug)]
pub struct CwdGuard<'s> {
    session: &'s mut Session,
    previous: RepoPath,
}

impl Deref for CwdGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for CwdGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for CwdGuard<'_> {
    fn drop(&mut self) {
        self.session.cwd = mem::take(&mut self.previous);
    }
}

/// Non-seekable reader over a file's content.
#[derive(Debug)]
pub struct FileReader {
    inner: io::Cursor<Vec<u8>>,
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Writer into the working tree.
///
/// Content lands in the transaction on [`flush`](Write::flush),
/// [`finish`](FileWriter::finish) or drop. The session cannot be used while
/// a writer is open.
#[derive(Debug)]
pub struct FileWriter<'s> {
    session: &'s mut Session,
    path: RepoPath,
    buf: Vec<u8>,
    finished: bool,
}

impl<'s> FileWriter<'s> {
    fn new(session: &'s mut Session, path: RepoPath, buf: Vec<u8>) -> Self {
        Self {
            session,
            path,
            buf,
            finished: false,
        }
    }

    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Store the content and close the file.
    pub fn finish(mut self) -> TransactionResult<()> {
        self.finished = true;
        let data = mem::take(&mut self.buf);
        self.session.transaction()?.write(&self.path, data)
    }
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let data = self.buf.clone();
        self.session
            .transaction()
            .and_then(|tx| tx.write(&self.path, data))
            .map_err(into_io_error)
    }
}

impl Drop for FileWriter<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let data = mem::take(&mut self.buf);
        let result = self
            .session
            .transaction()
            .and_then(|tx| tx.write(&self.path, data));
        if let Err(e) = result {
            warn!(path = %self.path, error = %e, "failed to store file on close");
        }
    }
}

fn into_io_error(e: TransactionError) -> io::Error {
    let kind = match e.tree_error() {
        Some(TreeError::NotFound(_)) => io::ErrorKind::NotFound,
        Some(TreeError::AlreadyExists(_)) => io::ErrorKind::AlreadyExists,
        Some(TreeError::InvalidArgument(_)) => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConflictKind;
    use crate::transaction::Coordinator;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn setup() -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let session = Session::open(dir.path()).unwrap();
        (dir, session)
    }

    fn reopen(dir: &TempDir) -> Session {
        Session::open(dir.path()).unwrap()
    }

    fn tree_err(result: TransactionResult<impl std::fmt::Debug>) -> TreeError {
        match result.unwrap_err() {
            TransactionError::Tree(e) => e,
            other => panic!("expected a tree error, got {other:?}"),
        }
    }

    fn read_string(session: &mut Session, path: &str) -> String {
        String::from_utf8(session.read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_new_repo_with_working_directory() {
        let (dir, _session) = setup();
        assert!(dir.path().join(".git").exists());
    }

    #[test]
    fn test_no_repo_dont_create() {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig::new(dir.path().join("missing")).create_if_missing(false);
        let err = Session::open_with_config(config).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::Storage(StorageError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_read_write_file() {
        let (dir, mut fs) = setup();
        assert_eq!(fs.hash("").unwrap(), EMPTY_TREE);
        assert!(matches!(tree_err(fs.hash("foo")), TreeError::NotFound(_)));

        let mut f = fs.open_write("foo").unwrap();
        writeln!(f, "Hello").unwrap();
        f.finish().unwrap();

        assert_eq!(fs.read("foo").unwrap(), b"Hello\n");
        assert_eq!(
            fs.hash("foo").unwrap(),
            "e965047ad7c57865823c7d992b1d046ea66edf78"
        );
        let on_disk = dir.path().join("foo");
        assert!(!on_disk.exists());

        fs.commit("add foo").unwrap();
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"Hello\n");

        let mut content = String::new();
        fs.open_read("foo").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello\n");
    }

    #[test]
    fn test_read_write_file_in_subfolder_bare_repo() {
        let dir = TempDir::new().unwrap();
        let mut fs = Session::open_with_config(SessionConfig::new(dir.path()).bare(true)).unwrap();
        assert!(fs.repository().is_bare());

        fs.mkdir("foo").unwrap();
        fs.write("foo/bar", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        let mut again = Session::open(dir.path()).unwrap();
        assert_eq!(again.read("foo/bar").unwrap(), b"Hello\n");
        assert!(again.is_dir("foo").unwrap());
    }

    #[test]
    fn test_writer_stores_on_drop() {
        let (_dir, mut fs) = setup();
        {
            let mut f = fs.open_write("foo").unwrap();
            f.write_all(b"dropped").unwrap();
        }
        assert_eq!(fs.read("foo").unwrap(), b"dropped");
    }

    #[test]
    fn test_append_twice_to_same_file() {
        let (_dir, mut fs) = setup();
        writeln!(fs.open_append("foo").unwrap(), "One").unwrap();
        writeln!(fs.open_append("foo").unwrap(), "Two").unwrap();
        assert_eq!(read_string(&mut fs, "foo"), "One\nTwo\n");

        fs.commit("").unwrap();
        assert_eq!(read_string(&mut fs, "foo"), "One\nTwo\n");

        fs.append("foo", b"Three\n").unwrap();
        assert_eq!(read_string(&mut fs, "foo"), "One\nTwo\nThree\n");
    }

    #[test]
    fn test_open_edge_cases() {
        let (_dir, mut fs) = setup();

        assert!(matches!(tree_err(fs.open_read("foo")), TreeError::NotFound(_)));
        assert!(matches!(tree_err(fs.open_write("foo/bar")), TreeError::NotFound(_)));
        assert!(matches!(tree_err(fs.open_read(".")), TreeError::IsADirectory(_)));
        assert!(matches!(tree_err(fs.open_write(".")), TreeError::IsADirectory(_)));

        fs.mkdir("foo").unwrap();
        assert!(matches!(tree_err(fs.open_write("foo")), TreeError::IsADirectory(_)));

        fs.write("bar", b"Howdy").unwrap();
        assert!(matches!(
            tree_err(fs.open_write("bar/foo")),
            TreeError::NotADirectory(_)
        ));

        assert!(matches!(tree_err(fs.create("bar")), TreeError::AlreadyExists(_)));
        assert!(matches!(tree_err(fs.create("foo")), TreeError::IsADirectory(_)));
        assert!(matches!(tree_err(fs.create("/")), TreeError::IsADirectory(_)));
        fs.create("baz").unwrap().finish().unwrap();
        assert!(fs.exists("baz").unwrap());
    }

    #[test]
    fn test_mkdir_edge_cases() {
        let (_dir, mut fs) = setup();

        assert!(matches!(tree_err(fs.mkdir("foo/bar")), TreeError::NotFound(_)));

        fs.write("foo", b"Howdy!").unwrap();
        assert!(matches!(tree_err(fs.mkdir("foo/bar")), TreeError::NotADirectory(_)));

        fs.mkdir("bar").unwrap();
        assert!(matches!(tree_err(fs.mkdir("bar")), TreeError::AlreadyExists(_)));

        fs.mkdirs("a/b/c").unwrap();
        fs.mkdirs("a/b/c").unwrap();
        assert!(fs.is_dir("/a/b/c").unwrap());
        assert!(matches!(tree_err(fs.mkdirs("foo/x")), TreeError::NotADirectory(_)));
    }

    #[test]
    fn test_commit_metadata_through_coordinator() {
        let dir = TempDir::new().unwrap();
        let mut fs = Session::open(dir.path()).unwrap();
        fs.write("foo", b"Howdy!").unwrap();

        let mut coordinator = Coordinator::new();
        coordinator
            .join(&mut fs)
            .note("A test commit.")
            .set_user("Fred Flintstone")
            .set_extended_info("email", "fred@bed.rock");
        coordinator.commit().unwrap();

        let log = fs.log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].author_name, "Fred Flintstone");
        assert_eq!(log[0].author_email, "fred@bed.rock");
        assert_eq!(log[0].message, "A test commit.");
    }

    #[test]
    fn test_commit_metadata_extended_info_for_user() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Howdy!").unwrap();
        let meta = CommitMetadata::new()
            .with_user("ignored")
            .with_extended("user", "Fred Flintstone")
            .with_extended("email", "fred@bed.rock");
        fs.commit_with(&meta).unwrap();

        let head = &fs.log(1).unwrap()[0];
        assert_eq!(head.author_name, "Fred Flintstone");
        assert_eq!(head.message, CommitMetadata::DEFAULT_MESSAGE);
    }

    #[test]
    fn test_modify_file() {
        let (dir, mut fs) = setup();
        fs.write("foo", b"Howdy!\n").unwrap();
        fs.commit("").unwrap();

        fs.write("foo", b"Hello!\n").unwrap();
        assert_eq!(std::fs::read(dir.path().join("foo")).unwrap(), b"Howdy!\n");
        fs.commit("").unwrap();
        assert_eq!(std::fs::read(dir.path().join("foo")).unwrap(), b"Hello!\n");
        assert_eq!(fs.log(10).unwrap().len(), 2);
    }

    #[test]
    fn test_rm() {
        let (dir, mut fs) = setup();
        fs.mkdirs("foo").unwrap();
        fs.write("foo/bar", b"Hello\n").unwrap();
        fs.commit("").unwrap();
        assert!(dir.path().join("foo/bar").exists());

        assert!(matches!(tree_err(fs.remove("foo")), TreeError::IsADirectory(_)));
        assert!(matches!(tree_err(fs.remove("bar")), TreeError::NotFound(_)));
        fs.remove("foo/bar").unwrap();
        fs.commit("").unwrap();

        assert!(!fs.exists("foo/bar").unwrap());
        assert!(!dir.path().join("foo/bar").exists());
    }

    #[test]
    fn test_rmdir() {
        let (_dir, mut fs) = setup();
        fs.mkdirs("foo").unwrap();
        fs.write("foo/bar", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        assert!(matches!(tree_err(fs.remove_dir("foo")), TreeError::DirectoryNotEmpty(_)));
        assert!(matches!(tree_err(fs.remove_dir("foo/bar")), TreeError::NotADirectory(_)));
        assert!(matches!(tree_err(fs.remove_dir("nope")), TreeError::NotFound(_)));

        fs.remove("foo/bar").unwrap();
        fs.remove_dir("foo").unwrap();
        fs.commit("").unwrap();
        assert!(!fs.exists("foo").unwrap());
    }

    #[test]
    fn test_rmtree() {
        let (_dir, mut fs) = setup();
        fs.mkdirs("foo/bar").unwrap();
        fs.write("foo/bar/baz", b"Hello\n").unwrap();
        fs.write("foo/top", b"Hi\n").unwrap();
        fs.commit("").unwrap();

        fs.remove_tree("foo").unwrap();
        assert!(!fs.exists("foo/bar/baz").unwrap());
        fs.commit("").unwrap();
        assert!(fs.list("/").unwrap().is_empty());
    }

    #[test]
    fn test_cant_remove_root_dir() {
        let (_dir, mut fs) = setup();
        assert!(matches!(tree_err(fs.remove_dir("/")), TreeError::InvalidArgument(_)));
        assert!(matches!(tree_err(fs.remove_tree("/")), TreeError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty() {
        let (_dir, mut fs) = setup();
        assert!(fs.is_empty("/").unwrap());
        fs.write("foo", b"Hello\n").unwrap();
        assert!(!fs.is_empty("/").unwrap());
        assert!(matches!(tree_err(fs.is_empty("foo")), TreeError::NotADirectory(_)));
        assert!(matches!(tree_err(fs.is_empty("bar")), TreeError::NotFound(_)));
    }

    #[test]
    fn test_mv() {
        let (_dir, mut fs) = setup();
        fs.mkdirs("one/a").unwrap();
        fs.mkdirs("one/b").unwrap();
        fs.write("one/a/foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        fs.rename("one/a/foo", "one/b/bar").unwrap();
        assert!(!fs.exists("one/a/foo").unwrap());
        assert_eq!(fs.read("one/b/bar").unwrap(), b"Hello\n");

        fs.rename("one/b", "two").unwrap();
        assert_eq!(fs.read("two/bar").unwrap(), b"Hello\n");

        assert!(matches!(tree_err(fs.rename("one", "one/a/x")), TreeError::InvalidArgument(_)));
        assert!(matches!(tree_err(fs.rename("nope", "x")), TreeError::NotFound(_)));
        assert!(matches!(tree_err(fs.rename("two", "one/a")), TreeError::AlreadyExists(_)));
        assert!(matches!(tree_err(fs.rename("two", "x/y")), TreeError::NotFound(_)));

        fs.commit("").unwrap();
        assert_eq!(fs.list("/").unwrap(), vec!["one", "two"]);
        assert_eq!(fs.list("one").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_mv_noop() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();
        let head = fs.get_base().unwrap();

        fs.rename("foo", "/foo").unwrap();
        assert_eq!(fs.commit("").unwrap(), None);
        assert_eq!(fs.get_base().unwrap(), head);
    }

    #[test]
    fn test_listdir() {
        let (_dir, mut fs) = setup();
        fs.mkdirs("one/a").unwrap();
        fs.write("one/b", b"").unwrap();
        fs.write("one/c", b"").unwrap();
        assert_eq!(fs.list("one").unwrap(), vec!["a", "b", "c"]);
        assert!(matches!(tree_err(fs.list("one/b")), TreeError::NotADirectory(_)));
        assert!(matches!(tree_err(fs.list("two")), TreeError::NotFound(_)));
    }

    #[test]
    fn test_chdir() {
        let (_dir, mut fs) = setup();
        fs.mkdirs("one/a").unwrap();
        fs.mkdir("two").unwrap();
        fs.write("three", b"Hello!").unwrap();
        fs.write("two/three", b"Haha!").unwrap();

        fs.chdir("one").unwrap();
        assert_eq!(fs.cwd(), "/one");
        assert_eq!(fs.list("").unwrap(), vec!["a"]);

        assert!(matches!(tree_err(fs.chdir("/three")), TreeError::NotADirectory(_)));
        assert!(matches!(tree_err(fs.chdir("nope")), TreeError::NotFound(_)));
        assert_eq!(fs.cwd(), "/one");

        {
            let mut inner = fs.cd("/two").unwrap();
            assert_eq!(inner.cwd(), "/two");
            assert_eq!(inner.list("").unwrap(), vec!["three"]);
            assert_eq!(inner.read("three").unwrap(), b"Haha!");
            assert_eq!(inner.read("/three").unwrap(), b"Hello!");
            assert_eq!(inner.read("../three").unwrap(), b"Hello!");
        }
        assert_eq!(fs.cwd(), "/one");
        assert!(fs.cd("/three").is_err());
        assert_eq!(fs.cwd(), "/one");

        fs.chdir("..").unwrap();
        assert_eq!(fs.cwd(), "/");
        assert!(matches!(tree_err(fs.chdir("..")), TreeError::InvalidArgument(_)));
    }

    #[test]
    fn test_directory_name_with_spaces() {
        let (_dir, mut fs) = setup();
        fs.mkdir("foo bar").unwrap();
        fs.cd("foo bar").unwrap().write("foo", b"bar").unwrap();
        fs.commit("").unwrap();

        let mut inner = fs.cd("foo bar").unwrap();
        assert_eq!(inner.read("foo").unwrap(), b"bar");
    }

    #[test]
    fn test_abort_discards() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello").unwrap();
        fs.abort();
        assert!(!fs.exists("foo").unwrap());
        assert_eq!(fs.commit("").unwrap(), None);
        assert!(fs.log(10).unwrap().is_empty());
    }

    // ==================== Concurrency ====================

    #[test]
    fn test_merge_add_file() {
        let (dir, mut fs) = setup();
        fs.write("foo", b"Hello!\n").unwrap();
        fs.commit("").unwrap();

        fs.write("bar", b"Howdy!\n").unwrap();
        let mut other = reopen(&dir);
        other.write("baz", b"Ciao!\n").unwrap();
        other.commit("").unwrap();
        fs.commit("").unwrap();

        assert!(fs.exists("foo").unwrap());
        assert!(fs.exists("bar").unwrap());
        assert!(fs.exists("baz").unwrap());
        assert!(fs.log(1).unwrap()[0].is_merge());
    }

    #[test]
    fn test_merge_rm_file() {
        let (dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        fs.write("baz", b"Prego\n").unwrap();
        fs.commit("").unwrap();

        fs.remove("foo").unwrap();
        let mut other = reopen(&dir);
        other.remove("baz").unwrap();
        other.commit("").unwrap();
        fs.commit("").unwrap();

        assert!(!fs.exists("foo").unwrap());
        assert!(fs.exists("bar").unwrap());
        assert!(!fs.exists("baz").unwrap());
    }

    #[test]
    fn test_merge_rm_same_file() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        fs.commit("").unwrap();

        let base = fs.get_base().unwrap().unwrap();
        fs.remove("foo").unwrap();
        fs.commit("").unwrap();

        fs.set_base(&base.to_string()).unwrap();
        fs.remove("foo").unwrap();
        fs.write("baz", b"Prego\n").unwrap();
        fs.commit("").unwrap();

        assert!(!fs.exists("foo").unwrap());
        assert!(fs.exists("bar").unwrap());
        assert!(fs.exists("baz").unwrap());
    }

    #[test]
    fn test_merge_add_same_file() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        let base = fs.get_base().unwrap().unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        fs.commit("").unwrap();

        fs.set_base(&base.to_string()).unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        fs.write("baz", b"Prego\n").unwrap();
        fs.commit("").unwrap();

        assert_eq!(fs.read("bar").unwrap(), b"Grazie\n");
        assert!(fs.exists("baz").unwrap());
    }

    #[test]
    fn test_merge_add_different_file_same_path() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        let base = fs.get_base().unwrap().unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        let winner = fs.commit("").unwrap();

        fs.set_base(&base.to_string()).unwrap();
        fs.write("bar", b"Prego\n").unwrap();
        let err = fs.commit("").unwrap_err();

        let report = err.conflict_report().unwrap();
        assert_eq!(report.kind_of("/bar"), Some(ConflictKind::AddAdd));
        assert_eq!(fs.get_base().unwrap(), winner);
        assert_eq!(fs.read("bar").unwrap(), b"Grazie\n");
    }

    #[test]
    fn test_merge_file() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"One\nTwo\nThree\nFour\nFive\n").unwrap();
        fs.commit("").unwrap();

        let base = fs.get_base().unwrap().unwrap();
        fs.write("foo", b"One\nDos\nThree\nFour\nFive\n").unwrap();
        fs.commit("").unwrap();

        fs.set_base(&base.to_string()).unwrap();
        fs.append("foo", b"Sei\n").unwrap();
        fs.commit("").unwrap();

        assert_eq!(
            read_string(&mut fs, "foo"),
            "One\nDos\nThree\nFour\nFive\nSei\n"
        );
    }

    #[test]
    fn test_set_base_requires_clean_transaction() {
        let (_dir, mut fs) = setup();
        fs.write("foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        let base = fs.get_base().unwrap().unwrap();
        fs.write("bar", b"Grazie\n").unwrap();
        assert!(matches!(
            fs.set_base(&base.to_string()),
            Err(TransactionError::InvalidOperation(_))
        ));
        assert!(matches!(
            fs.set_base("whatever"),
            Err(TransactionError::Storage(_))
        ));
        fs.commit("").unwrap();

        fs.set_base(&base.to_string()).unwrap();
        assert!(fs.exists("foo").unwrap());
        assert!(!fs.exists("bar").unwrap());
        fs.write("baz", b"Prego\n").unwrap();
        fs.commit("").unwrap();

        assert!(fs.exists("foo").unwrap());
        assert!(fs.exists("bar").unwrap());
        assert!(fs.exists("baz").unwrap());
    }

    #[test]
    fn test_use_other_branch() {
        let dir = TempDir::new().unwrap();
        let mut fs = Session::open_with_config(SessionConfig::new(dir.path()).head("foo")).unwrap();
        fs.write("foo", b"Hello\n").unwrap();
        fs.commit("").unwrap();

        let mut fs2 = reopen(&dir);
        fs2.write("foo", b"Howdy!\n").unwrap();
        fs2.commit("").unwrap();

        assert_eq!(fs.branch().short_name(), "foo");
        assert_eq!(fs.read("foo").unwrap(), b"Hello\n");
        assert_eq!(fs2.read("foo").unwrap(), b"Howdy!\n");
    }

    #[test]
    fn test_branch_and_then_merge() {
        let dir = TempDir::new().unwrap();
        let mut fs = Session::open(dir.path()).unwrap();
        fs.write("foo", b"Hello").unwrap();
        fs.commit("").unwrap();

        let mut fs2 =
            Session::open_with_config(SessionConfig::new(dir.path()).head("abranch")).unwrap();
        let base = fs.get_base().unwrap().unwrap();
        fs2.set_base(&base.to_string()).unwrap();
        fs2.write("bar", b"Ciao").unwrap();
        fs.write("baz", b"Hola").unwrap();
        fs2.commit("").unwrap();
        fs.commit("").unwrap();

        fs.set_base("abranch").unwrap();
        fs.write("beez", b"buzz").unwrap();
        fs.commit("").unwrap();

        for path in ["foo", "bar", "baz", "beez"] {
            assert!(fs.exists(path).unwrap(), "{path} missing");
        }
        assert!(fs2.exists("foo").unwrap());
        assert!(fs2.exists("bar").unwrap());
        assert!(!fs2.exists("baz").unwrap());
        assert!(!fs2.exists("beez").unwrap());

        let head = &fs.log(1).unwrap()[0];
        assert_eq!(head.parent_ids.len(), 2);
    }

    #[test]
    fn test_concurrent_sessions_in_threads() {
        let dir = TempDir::new().unwrap();
        {
            let mut fs = Session::open(dir.path()).unwrap();
            fs.write("shared", b"base\n").unwrap();
            fs.commit("").unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let workers: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|name| {
                let path = dir.path().to_path_buf();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut fs = Session::open(&path).unwrap();
                    assert_eq!(fs.read("shared").unwrap(), b"base\n");
                    barrier.wait();
                    fs.write(name, name.as_bytes()).unwrap();
                    fs.commit(name).unwrap().is_some()
                })
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }

        let mut fs = Session::open(dir.path()).unwrap();
        assert_eq!(fs.read("left").unwrap(), b"left");
        assert_eq!(fs.read("right").unwrap(), b"right");
        assert_eq!(fs.log(10).unwrap().len(), 3);

        // the working copy follows the last commit, not whichever checkout ran last
        assert_eq!(std::fs::read(dir.path().join("left")).unwrap(), b"left");
        assert_eq!(std::fs::read(dir.path().join("right")).unwrap(), b"right");
    }

    #[test]
    fn test_reserved_name_fails_without_losing_other_edits() {
        let (_dir, mut fs) = setup();
        fs.write("keep", b"kept\n").unwrap();

        assert!(matches!(tree_err(fs.write(".git", b"x")), TreeError::InvalidArgument(_)));
        assert!(matches!(tree_err(fs.mkdir("sub/.git")), TreeError::InvalidArgument(_)));
        assert!(matches!(tree_err(fs.rename("keep", ".git")), TreeError::InvalidArgument(_)));

        assert!(fs.commit("keep only").unwrap().is_some());
        assert_eq!(fs.read("keep").unwrap(), b"kept\n");
        assert_eq!(fs.list("/").unwrap(), vec!["keep"]);
    }
}
