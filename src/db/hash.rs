//! Content hashing for change detection. A set remembers the hash of its
//! record file at the moment it wrote its snapshot; on the next open the two
//! are compared, and a mismatch means the file was edited outside the
//! application and the snapshot can no longer be trusted.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Hash raw bytes with XXH3-64.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Hash a list of record lines as if they were a file written by
/// [`crate::db::RecordFile`]: lines joined with `\n` plus a trailing newline
/// when non-empty. This lets callers hash an in-memory cache without
/// touching the disk and still get the same digest as [`hash_file`].
pub fn hash_lines(lines: &[String]) -> u64 {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    hash_bytes(content.as_bytes())
}

/// Hash a file's bytes with XXH3-64.
pub fn hash_file(path: &Path) -> Result<u64> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {} for hashing", path.display()))?;
    Ok(hash_bytes(&bytes))
}

/// Whether two files hold identical content.
pub fn files_match(first: &Path, second: &Path) -> Result<bool> {
    Ok(hash_file(first)? == hash_file(second)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lines_and_file_digests_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");
        std::fs::write(&path, "alpha\nbeta\n").unwrap();

        let lines = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(hash_lines(&lines), hash_file(&path).unwrap());
    }

    #[test]
    fn empty_content_hashes_consistently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::write(&path, "").unwrap();

        assert_eq!(hash_lines(&[]), hash_file(&path).unwrap());
    }

    #[test]
    fn different_content_differs() {
        let a = vec!["alpha".to_string()];
        let b = vec!["beta".to_string()];
        assert_ne!(hash_lines(&a), hash_lines(&b));
    }

    #[test]
    fn files_match_compares_content() {
        let dir = TempDir::new().unwrap();
        let one = dir.path().join("one.db");
        let two = dir.path().join("two.db");
        std::fs::write(&one, "same\n").unwrap();
        std::fs::write(&two, "same\n").unwrap();
        assert!(files_match(&one, &two).unwrap());

        std::fs::write(&two, "different\n").unwrap();
        assert!(!files_match(&one, &two).unwrap());
    }
}
