//! Restorable snapshots of the record files. A backup is a timestamped
//! directory holding a copy of every `.db` file in the data directory;
//! restoring copies them back. The sets notice the changed files through the
//! content-hash check the next time they are opened and rebuild themselves
//! from the restored records.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;

/// Subdirectory of the data directory that holds backups.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Extension of the files that get backed up and restored.
const RECORD_FILE_EXT: &str = "db";

/// Copy every record file into a new timestamped backup directory and return
/// its path. Fails when there is nothing to back up.
pub fn create_backup(data_dir: &Path) -> Result<PathBuf> {
    let sources = record_files(data_dir)?;
    if sources.is_empty() {
        bail!("no record files to back up in {}", data_dir.display());
    }

    let backup_dir = fresh_backup_dir(data_dir)?;
    fs::create_dir_all(&backup_dir)
        .with_context(|| format!("failed to create backup directory {}", backup_dir.display()))?;

    for source in sources {
        let file_name = source.file_name().context("record file has no name")?;
        fs::copy(&source, backup_dir.join(file_name))
            .with_context(|| format!("failed to back up {}", source.display()))?;
    }

    Ok(backup_dir)
}

/// Existing backup directories, newest first. The timestamp naming makes
/// lexicographic order chronological.
pub fn list_backups(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = data_dir.join(BACKUP_DIR_NAME);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    let entries = fs::read_dir(&root)
        .with_context(|| format!("failed to list backups in {}", root.display()))?;
    for entry in entries {
        let entry = entry.context("failed to read backup directory entry")?;
        if entry.path().is_dir() {
            backups.push(entry.path());
        }
    }

    backups.sort();
    backups.reverse();
    Ok(backups)
}

/// Copy the record files of `backup_dir` back into the data directory,
/// returning how many files were restored.
pub fn restore_backup(data_dir: &Path, backup_dir: &Path) -> Result<usize> {
    let sources = record_files(backup_dir)?;
    if sources.is_empty() {
        bail!("{} contains no record files", backup_dir.display());
    }

    for source in &sources {
        let file_name = source.file_name().context("backup file has no name")?;
        fs::copy(source, data_dir.join(file_name))
            .with_context(|| format!("failed to restore {}", source.display()))?;
    }

    Ok(sources.len())
}

/// All `.db` files directly inside `dir`, sorted for stable copy order.
fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("failed to read directory entry")?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_FILE_EXT) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pick a backup directory name that does not collide with an earlier backup
/// taken in the same second.
fn fresh_backup_dir(data_dir: &Path) -> Result<PathBuf> {
    let root = data_dir.join(BACKUP_DIR_NAME);
    let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();

    let candidate = root.join(&stamp);
    if !candidate.exists() {
        return Ok(candidate);
    }
    for counter in 2..100 {
        let candidate = root.join(format!("{stamp}-{counter}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!("could not find a free backup directory name under {}", root.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hash::files_match;
    use tempfile::TempDir;

    fn seed_data_dir(dir: &TempDir) {
        std::fs::write(dir.path().join("books.db"), "book line\n").unwrap();
        std::fs::write(dir.path().join("users.db"), "user line\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a record file\n").unwrap();
    }

    #[test]
    fn backup_copies_only_record_files() {
        let dir = TempDir::new().unwrap();
        seed_data_dir(&dir);

        let backup = create_backup(dir.path()).unwrap();
        assert!(backup.join("books.db").exists());
        assert!(backup.join("users.db").exists());
        assert!(!backup.join("notes.txt").exists());
        assert!(files_match(&dir.path().join("books.db"), &backup.join("books.db")).unwrap());
    }

    #[test]
    fn backup_of_empty_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(create_backup(dir.path()).is_err());
    }

    #[test]
    fn restore_round_trips_content() {
        let dir = TempDir::new().unwrap();
        seed_data_dir(&dir);
        let backup = create_backup(dir.path()).unwrap();

        std::fs::write(dir.path().join("books.db"), "mutated after backup\n").unwrap();
        let restored = restore_backup(dir.path(), &backup).unwrap();
        assert_eq!(restored, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("books.db")).unwrap(),
            "book line\n"
        );
    }

    #[test]
    fn backups_list_newest_first() {
        let dir = TempDir::new().unwrap();
        seed_data_dir(&dir);

        let first = create_backup(dir.path()).unwrap();
        let second = create_backup(dir.path()).unwrap();
        let listed = list_backups(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], second);
        assert_eq!(listed[1], first);
        assert_ne!(first, second);
    }

    #[test]
    fn listing_without_backups_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_backups(dir.path()).unwrap().is_empty());
    }
}
