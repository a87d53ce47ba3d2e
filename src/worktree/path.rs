//! Repository paths.
//!
//! `/` is the only separator, whatever the host uses. A leading `/` anchors a
//! path at the repository root; anything else is resolved against a working
//! directory.

use std::fmt;

use crate::worktree::error::{TreeError, TreeResult};

/// An absolute, normalized path inside the repository tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPath {
    components: Vec<String>,
}

impl RepoPath {
    /// the repository root
    pub fn root() -> Self {
        Self::default()
    }

    /// parse a path relative to the root
    pub fn parse(path: &str) -> TreeResult<Self> {
        Self::root().resolve(path)
    }

    /// resolve `path` against `self` as working directory.
    ///
    /// Empty and `.` components are dropped, `..` climbs one level. A `.git`
    /// component is refused, git cannot store it in a tree.
    pub fn resolve(&self, path: &str) -> TreeResult<Self> {
        if path.contains('\0') {
            return Err(TreeError::InvalidArgument(format!(
                "path contains a NUL byte: {:?}",
                path
            )));
        }

        let mut components = if path.starts_with('/') {
            Vec::new()
        } else {
            self.components.clone()
        };

        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if components.pop().is_none() {
                        return Err(TreeError::InvalidArgument(format!(
                            "path escapes the repository root: {}",
                            path
                        )));
                    }
                }
                name if name.eq_ignore_ascii_case(".git") => {
                    return Err(TreeError::InvalidArgument(format!(
                        "reserved name in path: {}",
                        path
                    )));
                }
                name => components.push(name.to_string()),
            }
        }

        Ok(Self { components })
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// split into parent directory and final name; `None` for the root
    pub fn split_last(&self) -> Option<(RepoPath, &str)> {
        let (name, parent) = self.components.split_last()?;
        Some((
            RepoPath {
                components: parent.to_vec(),
            },
            name.as_str(),
        ))
    }

    /// final component, if any
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn join(&self, name: &str) -> RepoPath {
        let mut components = self.components.clone();
        components.push(name.to_string());
        RepoPath { components }
    }

    /// true if `self` is `other` or lies below it
    pub fn starts_with(&self, other: &RepoPath) -> bool {
        self.components.starts_with(&other.components)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}
