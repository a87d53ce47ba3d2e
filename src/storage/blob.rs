//! Blob operations for file content.
//!
//! Files are stored verbatim as git blobs. This module also owns the text
//! heuristics and the three-way text merge the merge engine relies on.

use git2::{IndexEntry, IndexTime, ObjectType, Oid, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// how far into a blob we look for a NUL byte, same window git uses
const BINARY_SNIFF_LEN: usize = 8000;

/// write bytes as a blob to the repository
///
/// returns the blob ID (SHA-1 hash of the content)
pub fn write_blob(repo: &Repository, data: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(data)?;
    Ok(BlobId::new(oid))
}

/// read a blob's content from the repository
pub fn read_blob(repo: &Repository, blob_id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo
        .find_blob(blob_id.raw())
        .map_err(|_| StorageError::ObjectNotFound(blob_id.to_string()))?;
    Ok(blob.content().to_vec())
}

/// hash bytes as a blob without writing anything
pub fn hash_blob(data: &[u8]) -> StorageResult<BlobId> {
    let oid = Oid::hash_object(ObjectType::Blob, data)?;
    Ok(BlobId::new(oid))
}

/// true if the content looks binary (a NUL byte near the start)
pub fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

/// three-way merge of text blobs using libgit2's xdiff merge.
///
/// Returns `None` when the two sides touch overlapping hunks.
pub fn merge_text(
    repo: &Repository,
    base: BlobId,
    ours: BlobId,
    theirs: BlobId,
) -> StorageResult<Option<Vec<u8>>> {
    let base_entry = index_entry(repo, base)?;
    let ours_entry = index_entry(repo, ours)?;
    let theirs_entry = index_entry(repo, theirs)?;

    let result = repo.merge_file_from_index(&base_entry, &ours_entry, &theirs_entry, None)?;
    if !result.is_automergeable() {
        return Ok(None);
    }
    Ok(Some(result.content().to_vec()))
}

fn index_entry(repo: &Repository, id: BlobId) -> StorageResult<IndexEntry> {
    let blob = repo
        .find_blob(id.raw())
        .map_err(|_| StorageError::ObjectNotFound(id.to_string()))?;

    Ok(IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100644,
        uid: 0,
        gid: 0,
        file_size: u32::try_from(blob.size()).unwrap_or(u32::MAX),
        id: id.raw(),
        flags: 0,
        flags_extended: 0,
        path: b"file".to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_read_blob() {
        let (_dir, repo) = setup();
        let id = write_blob(&repo, b"hello\n").unwrap();
        assert_eq!(read_blob(&repo, id).unwrap(), b"hello\n");
        assert_eq!(hash_blob(b"hello\n").unwrap(), id);
    }

    #[test]
    fn test_binary_detection() {
        assert!(!is_binary(b"plain text\n"));
        assert!(is_binary(b"\x89PNG\x00\x01"));

        let mut late_nul = vec![b'a'; BINARY_SNIFF_LEN];
        late_nul.push(0);
        assert!(!is_binary(&late_nul));
    }

    #[test]
    fn test_merge_text_disjoint_hunks() {
        let (_dir, repo) = setup();
        let base = write_blob(&repo, b"one\ntwo\nthree\nfour\nfive\n").unwrap();
        let ours = write_blob(&repo, b"ONE\ntwo\nthree\nfour\nfive\n").unwrap();
        let theirs = write_blob(&repo, b"one\ntwo\nthree\nfour\nFIVE\n").unwrap();

        let merged = merge_text(&repo, base, ours, theirs).unwrap().unwrap();
        assert_eq!(merged, b"ONE\ntwo\nthree\nfour\nFIVE\n");
    }

    #[test]
    fn test_merge_text_overlap() {
        let (_dir, repo) = setup();
        let base = write_blob(&repo, b"one\ntwo\nthree\n").unwrap();
        let ours = write_blob(&repo, b"one\nTWO\nthree\n").unwrap();
        let theirs = write_blob(&repo, b"one\nzwei\nthree\n").unwrap();

        assert!(merge_text(&repo, base, ours, theirs).unwrap().is_none());
    }
}
