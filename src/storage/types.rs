//! core type-safe wrappers around git primitives for the storage layer.

use std::collections::BTreeMap;
use std::fmt;

use git2::Oid;

use crate::storage::error::{StorageError, StorageResult};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a tree entry points at.
///
/// Object kinds are closed: a directory entry is either a file (blob) or a
/// subdirectory (tree). Commits never appear inside trees we produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryRef {
    Blob(BlobId),
    Tree(TreeId),
}

impl EntryRef {
    pub fn is_tree(&self) -> bool {
        matches!(self, EntryRef::Tree(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, EntryRef::Blob(_))
    }

    pub(crate) fn raw(&self) -> Oid {
        match self {
            EntryRef::Blob(id) => id.raw(),
            EntryRef::Tree(id) => id.raw(),
        }
    }

    /// hex object id, without the kind
    pub fn to_hex(&self) -> String {
        self.raw().to_string()
    }

    /// human readable kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            EntryRef::Blob(_) => "blob",
            EntryRef::Tree(_) => "tree",
        }
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.raw())
    }
}

/// Entries of a single tree, ordered byte-wise by name.
pub type TreeEntries = BTreeMap<String, EntryRef>;

/// a fully qualified branch ref (`refs/heads/<name>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefName(String);

impl RefName {
    const HEADS: &'static str = "refs/heads/";

    /// create a RefName from a short branch name or a full `refs/heads/...` path
    pub fn branch(name: impl AsRef<str>) -> StorageResult<Self> {
        let name = name.as_ref();
        let full = if name.starts_with(Self::HEADS) {
            name.to_string()
        } else {
            format!("{}{}", Self::HEADS, name)
        };

        if name.is_empty() || !git2::Reference::is_valid_name(&full) {
            return Err(StorageError::InvalidRefName(name.to_string()));
        }
        Ok(Self(full))
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// get the short branch name
    pub fn short_name(&self) -> &str {
        self.0.strip_prefix(Self::HEADS).unwrap_or(&self.0)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// fallback signature when neither the transaction nor the repo names an author
    pub fn acidtree() -> Self {
        Self::new("acidtree", "acidtree@localhost")
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::acidtree()
    }
}

/// Metadata a coordinator hands over for the commit a transaction produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMetadata {
    /// commit message; empty or missing falls back to [`CommitMetadata::DEFAULT_MESSAGE`]
    pub message: Option<String>,
    /// user recorded by the coordinator
    pub user: Option<String>,
    /// free-form key/value pairs; `user` and `email` override the author
    pub extended: BTreeMap<String, String>,
}

impl CommitMetadata {
    pub const DEFAULT_MESSAGE: &'static str = "acidtree transaction";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_extended(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extended.insert(key.into(), value.into());
        self
    }

    /// message to record, never empty
    pub fn message(&self) -> &str {
        match self.message.as_deref() {
            Some(m) if !m.trim().is_empty() => m,
            _ => Self::DEFAULT_MESSAGE,
        }
    }

    /// author name, if the metadata names one
    pub fn author_name(&self) -> Option<&str> {
        non_empty(self.extended.get("user").map(String::as_str))
            .or_else(|| non_empty(self.user.as_deref()))
    }

    /// author email, if the metadata names one
    pub fn author_email(&self) -> Option<&str> {
        non_empty(self.extended.get("email").map(String::as_str))
    }

    /// resolve the signature to commit with, filling gaps from `fallback`
    pub fn signature(&self, fallback: &GitSignature) -> GitSignature {
        GitSignature::new(
            self.author_name().unwrap_or(&fallback.name),
            self.author_email().unwrap_or(&fallback.email),
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
