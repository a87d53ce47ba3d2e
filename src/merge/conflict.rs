//! Conflict reporting for three-way tree merges.

use std::fmt;

use serde::Serialize;

/// Why a path could not be reconciled automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// One side deleted the path, the other changed it.
    DeleteModify,
    /// Both sides created the path with different content.
    AddAdd,
    /// Both sides edited a file and the edits could not be merged
    /// (overlapping hunks, or binary content).
    Content,
    /// One side has a file where the other has a directory.
    Type,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteModify => write!(f, "delete/modify"),
            Self::AddAdd => write!(f, "add/add"),
            Self::Content => write!(f, "content"),
            Self::Type => write!(f, "file/directory"),
        }
    }
}

/// A single conflicting path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// absolute `/`-separated path
    pub path: String,
    pub kind: ConflictKind,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.kind)
    }
}

/// Every conflict found while reconciling two trees, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, path: impl Into<String>, kind: ConflictKind) {
        self.conflicts.push(Conflict {
            path: path.into(),
            kind,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    /// conflicting paths, in path order
    pub fn paths(&self) -> Vec<&str> {
        self.conflicts.iter().map(|c| c.path.as_str()).collect()
    }

    /// kind of conflict recorded for `path`, if any
    pub fn kind_of(&self, path: &str) -> Option<ConflictKind> {
        self.conflicts
            .iter()
            .find(|c| c.path == path)
            .map(|c| c.kind)
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.conflicts.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lookup_and_display() {
        let mut report = ConflictReport::new();
        assert!(report.is_empty());

        report.push("/a", ConflictKind::Content);
        report.push("/b/c", ConflictKind::DeleteModify);

        assert_eq!(report.len(), 2);
        assert_eq!(report.paths(), vec!["/a", "/b/c"]);
        assert_eq!(report.kind_of("/b/c"), Some(ConflictKind::DeleteModify));
        assert_eq!(report.kind_of("/zzz"), None);
        assert_eq!(report.to_string(), "/a (content), /b/c (delete/modify)");
    }

    #[test]
    fn test_report_serializes() {
        let mut report = ConflictReport::new();
        report.push("/a", ConflictKind::AddAdd);
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"conflicts":[{"path":"/a","kind":"add_add"}]}"#);
    }
}
