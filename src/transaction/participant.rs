//! Two-phase commit participation.
//!
//! A [`Participant`] is anything a two-phase commit coordinator can drive:
//! it votes in `prepare` and is told the outcome in `finish`. [`Coordinator`]
//! is a small in-process coordinator for callers that do not bring their own.

use tracing::{debug, warn};

use crate::storage::{CommitId, CommitMetadata};
use crate::transaction::context::Transaction;
use crate::transaction::error::{TransactionError, TransactionResult};

/// How a coordinated commit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Abort,
}

/// The contract a two-phase commit coordinator drives.
pub trait Participant {
    /// Participants are prepared and finished in ascending key order.
    fn sort_key(&self) -> String;

    /// Vote. `Ok` commits to being able to finish; `Err` votes to abort.
    fn prepare(&mut self, metadata: &CommitMetadata) -> TransactionResult<()>;

    /// Complete the transaction. Aborting never fails.
    fn finish(&mut self, outcome: Outcome) -> TransactionResult<Option<CommitId>>;
}

impl Participant for Transaction {
    fn sort_key(&self) -> String {
        self.ref_name().to_string()
    }

    fn prepare(&mut self, metadata: &CommitMetadata) -> TransactionResult<()> {
        Transaction::prepare(self, metadata)
    }

    fn finish(&mut self, outcome: Outcome) -> TransactionResult<Option<CommitId>> {
        match outcome {
            Outcome::Commit => self.finish_commit(),
            Outcome::Abort => {
                self.abort();
                Ok(None)
            }
        }
    }
}

/// In-process two-phase commit coordinator.
///
/// Dropping a coordinator that has not committed aborts every participant.
pub struct Coordinator<'a> {
    participants: Vec<&'a mut dyn Participant>,
    metadata: CommitMetadata,
    done: bool,
}

impl<'a> Coordinator<'a> {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            metadata: CommitMetadata::new(),
            done: false,
        }
    }

    /// Register a participant for this commit.
    pub fn join(&mut self, participant: &'a mut dyn Participant) -> &mut Self {
        self.participants.push(participant);
        self
    }

    /// Append a line to the commit message.
    pub fn note(&mut self, text: &str) -> &mut Self {
        let message = self.metadata.message.get_or_insert_with(String::new);
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(text);
        self
    }

    pub fn set_user(&mut self, user: impl Into<String>) -> &mut Self {
        self.metadata.user = Some(user.into());
        self
    }

    pub fn set_extended_info(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.metadata.extended.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self) -> &CommitMetadata {
        &self.metadata
    }

    /// Prepare everyone, then finish everyone.
    ///
    /// The first negative vote aborts all participants and is returned as
    /// [`TransactionError::Vetoed`]. Returns the commits written in phase two,
    /// in participant order.
    pub fn commit(mut self) -> TransactionResult<Vec<CommitId>> {
        self.participants.sort_by_key(|p| p.sort_key());

        for i in 0..self.participants.len() {
            if let Err(e) = self.participants[i].prepare(&self.metadata) {
                let participant = self.participants[i].sort_key();
                debug!(participant = %participant, error = %e, "participant vetoed commit");
                self.abort_all();
                return Err(TransactionError::Vetoed {
                    participant,
                    source: Box::new(e),
                });
            }
        }

        self.done = true;
        let mut commits = Vec::new();
        let mut first_error = None;
        for participant in self.participants.iter_mut() {
            match participant.finish(Outcome::Commit) {
                Ok(commit) => commits.extend(commit),
                Err(e) => {
                    warn!(participant = %participant.sort_key(), error = %e, "finish failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(commits),
        }
    }

    /// Abort every participant.
    pub fn abort(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        self.done = true;
        for participant in self.participants.iter_mut() {
            let _ = participant.finish(Outcome::Abort);
        }
    }
}

impl Default for Coordinator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Coordinator<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GitRepository, InitOptions, ObjectStore, RefName};
    use crate::transaction::{LockManager, TxState};
    use crate::worktree::RepoPath;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository, LockManager) {
        let dir = TempDir::new().unwrap();
        let options = InitOptions {
            bare: true,
            ..Default::default()
        };
        let repo = GitRepository::init(dir.path(), &options).unwrap();
        let locks = LockManager::for_repository(&repo);
        (dir, repo, locks)
    }

    fn begin(repo: &GitRepository, branch: &str, locks: &LockManager) -> Transaction {
        let name = RefName::branch(branch).unwrap();
        Transaction::begin(repo.clone(), name, locks.clone()).unwrap()
    }

    fn p(path: &str) -> RepoPath {
        RepoPath::parse(path).unwrap()
    }

    /// records the calls it receives, optionally voting no
    struct Recorder {
        key: String,
        veto: bool,
        calls: Vec<String>,
    }

    impl Recorder {
        fn new(key: &str, veto: bool) -> Self {
            Self {
                key: key.to_string(),
                veto,
                calls: Vec::new(),
            }
        }
    }

    impl Participant for Recorder {
        fn sort_key(&self) -> String {
            self.key.clone()
        }

        fn prepare(&mut self, _metadata: &CommitMetadata) -> TransactionResult<()> {
            self.calls.push("prepare".to_string());
            if self.veto {
                Err(TransactionError::InvalidOperation("no".to_string()))
            } else {
                Ok(())
            }
        }

        fn finish(&mut self, outcome: Outcome) -> TransactionResult<Option<CommitId>> {
            self.calls.push(format!("{:?}", outcome).to_lowercase());
            Ok(None)
        }
    }

    #[test]
    fn test_coordinated_commit() {
        let (_dir, repo, locks) = setup();
        let mut tx = begin(&repo, "main", &locks);
        tx.write(&p("/a"), b"a".to_vec()).unwrap();

        let mut coordinator = Coordinator::new();
        coordinator
            .join(&mut tx)
            .note("first line")
            .note("second line")
            .set_user("alice")
            .set_extended_info("email", "alice@example.com");
        let commits = coordinator.commit().unwrap();

        assert_eq!(commits.len(), 1);
        assert_eq!(tx.state(), TxState::Committed);
        let info = repo.get_commit(commits[0]).unwrap();
        assert_eq!(info.message, "first line\nsecond line");
        assert_eq!(info.author_name, "alice");
        assert_eq!(info.author_email, "alice@example.com");
    }

    #[test]
    fn test_veto_aborts_everyone() {
        let (_dir, repo, locks) = setup();
        let mut tx = begin(&repo, "main", &locks);
        tx.write(&p("/a"), b"a".to_vec()).unwrap();
        let mut recorder = Recorder::new("zzz", true);

        let mut coordinator = Coordinator::new();
        coordinator.join(&mut recorder).join(&mut tx);
        let err = coordinator.commit().unwrap_err();

        assert!(matches!(err, TransactionError::Vetoed { ref participant, .. } if participant == "zzz"));
        assert_eq!(tx.state(), TxState::Aborted);
        assert_eq!(recorder.calls, vec!["prepare", "abort"]);
        let main = RefName::branch("main").unwrap();
        assert_eq!(repo.resolve_ref(&main).unwrap(), None);
        assert!(locks.try_acquire().unwrap().is_some());
    }

    #[test]
    fn test_participants_run_in_key_order() {
        // one repository each: participants sharing a repository would
        // contend for the same commit lock
        let (_dir_a, repo_a, locks_a) = setup();
        let (_dir_z, repo_z, locks_z) = setup();
        let mut late = begin(&repo_z, "zeta", &locks_z);
        let mut early = begin(&repo_a, "alpha", &locks_a);
        late.write(&p("/z"), vec![]).unwrap();
        early.write(&p("/a"), vec![]).unwrap();

        let mut coordinator = Coordinator::new();
        coordinator.join(&mut late).join(&mut early);
        let commits = coordinator.commit().unwrap();

        let alpha = RefName::branch("alpha").unwrap();
        let zeta = RefName::branch("zeta").unwrap();
        assert_eq!(
            commits,
            vec![
                repo_a.resolve_ref(&alpha).unwrap().unwrap(),
                repo_z.resolve_ref(&zeta).unwrap().unwrap(),
            ]
        );
    }

    #[test]
    fn test_drop_without_commit_aborts() {
        let (_dir, repo, locks) = setup();
        let mut recorder = Recorder::new("r", false);
        {
            let mut coordinator = Coordinator::new();
            coordinator.join(&mut recorder);
        }
        assert_eq!(recorder.calls, vec!["abort"]);

        let mut tx = begin(&repo, "main", &locks);
        tx.write(&p("/a"), vec![]).unwrap();
        {
            let mut coordinator = Coordinator::new();
            coordinator.join(&mut tx);
            coordinator.abort();
        }
        assert_eq!(tx.state(), TxState::Aborted);
    }
}
