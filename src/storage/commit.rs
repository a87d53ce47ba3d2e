//!  Commit creation and history traversal
//!
//! commits are the only durable record of a transaction:
//! - each successful transaction writes exactly one commit
//! - a transaction that had to be folded into a moved head gets two parents
//!
//! commits are written here without touching refs; moving the branch is
//! the ref manager's job so it can be done with compare-and-swap.

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, GitSignature, TreeId};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// Writes one commit object. Refs are left alone.
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree: TreeId,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository, tree: TreeId) -> Self {
        Self {
            repo,
            tree,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::acidtree(),
        }
    }

    /// Parents in order; the first is the one history follows.
    pub fn parents(mut self, parents: &[CommitId]) -> Self {
        self.parents = parents.to_vec();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Author and committer.
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn write(self) -> StorageResult<CommitId> {
        let tree = self
            .repo
            .find_tree(self.tree.raw())
            .map_err(|_| StorageError::ObjectNotFound(self.tree.to_string()))?;
        let sig = self.signature.to_git2_signature()?;

        let mut parents = Vec::with_capacity(self.parents.len());
        for id in &self.parents {
            let parent = self
                .repo
                .find_commit(id.raw())
                .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;
            parents.push(parent);
        }
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = self
            .repo
            .commit(None, &sig, &sig, &self.message, &tree, &parents)?;
        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// resolve a revision expression (`HEAD~2`, a branch, a hex id) to a commit
pub fn resolve_revision(repo: &Repository, rev: &str) -> StorageResult<CommitId> {
    let object = repo
        .revparse_single(rev)
        .map_err(|_| StorageError::RevisionNotFound(rev.to_string()))?;
    let commit = object
        .peel_to_commit()
        .map_err(|_| StorageError::RevisionNotFound(rev.to_string()))?;
    Ok(CommitId::new(commit.id()))
}

/// Up to `limit` commits from `start` along first parents, newest first.
///
/// Merged-in transactions show up only as the second parent of the merge.
pub fn first_parent_log(
    repo: &Repository,
    start: CommitId,
    limit: usize,
) -> StorageResult<Vec<CommitInfo>> {
    let mut walk = repo.revwalk()?;
    walk.push(start.raw())?;
    walk.simplify_first_parent()?;
    walk.set_sorting(Sort::TOPOLOGICAL)?;

    let mut log = Vec::new();
    for oid in walk.take(limit) {
        let commit = repo.find_commit(oid?)?;
        log.push(CommitInfo::from_git2(&commit));
    }
    Ok(log)
}
