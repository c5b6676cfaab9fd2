use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::hash::hash_lines;

/// Line-oriented UTF-8 record store, one record per line.
///
/// All reads go through an in-memory cache of lines that is loaded when the
/// file is opened. Every mutation rewrites the file from the cache and rolls
/// the cache back if the write fails, so the two can never drift apart. The
/// plain-text format is deliberate: the files stay hand-editable and
/// importable even if the snapshot format changes between versions, and the
/// content hash spots such outside edits on the next open.
pub struct RecordFile {
    path: PathBuf,
    cache: Vec<String>,
}

impl RecordFile {
    /// Open a record file, creating it (and its parent directories) when it
    /// does not exist yet, and preload the line cache.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory {}", parent.display()))?;
        }
        if !path.exists() {
            fs::write(path, "")
                .with_context(|| format!("failed to create record file {}", path.display()))?;
        }

        let mut file = Self {
            path: path.to_path_buf(),
            cache: Vec::new(),
        };
        file.reload()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard the cache and re-read the file, picking up outside edits.
    pub fn reload(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read record file {}", self.path.display()))?;
        self.cache = content.lines().map(str::to_string).collect();
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.cache
    }

    /// The n-th record line (0-based), if it exists.
    pub fn line(&self, n: usize) -> Option<&str> {
        self.cache.get(n).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Append a record line at the end of the file.
    pub fn append_line(&mut self, line: &str) -> Result<()> {
        self.insert_line(self.cache.len(), line)
    }

    /// Insert a record line at position `n`, shifting later lines down.
    pub fn insert_line(&mut self, n: usize, line: &str) -> Result<()> {
        if n > self.cache.len() {
            bail!("line index {n} is out of bounds for {} lines", self.cache.len());
        }
        self.cache.insert(n, line.to_string());
        if let Err(err) = self.write_cache() {
            self.cache.remove(n);
            return Err(err);
        }
        Ok(())
    }

    /// Replace the record line at position `n`.
    pub fn replace_line(&mut self, n: usize, line: &str) -> Result<()> {
        if n >= self.cache.len() {
            bail!("line index {n} is out of bounds for {} lines", self.cache.len());
        }
        let previous = std::mem::replace(&mut self.cache[n], line.to_string());
        if let Err(err) = self.write_cache() {
            self.cache[n] = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Remove and return the record line at position `n`.
    pub fn remove_line(&mut self, n: usize) -> Result<String> {
        if n >= self.cache.len() {
            bail!("line index {n} is out of bounds for {} lines", self.cache.len());
        }
        let removed = self.cache.remove(n);
        if let Err(err) = self.write_cache() {
            self.cache.insert(n, removed);
            return Err(err);
        }
        Ok(removed)
    }

    /// Replace the whole file content in a single write. Used when a set
    /// rewrites itself after a mutation.
    pub fn set_lines(&mut self, lines: Vec<String>) -> Result<()> {
        let previous = std::mem::replace(&mut self.cache, lines);
        if let Err(err) = self.write_cache() {
            self.cache = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Remove every record line. Irreversible.
    pub fn clear(&mut self) -> Result<()> {
        self.set_lines(Vec::new())
    }

    /// Content hash of the cached lines. Matches what [`super::hash::hash_file`]
    /// returns for the file on disk as long as nobody edited it behind our
    /// back, without re-reading it.
    pub fn content_hash(&self) -> u64 {
        hash_lines(&self.cache)
    }

    fn write_cache(&self) -> Result<()> {
        let mut content = self.cache.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write record file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hash::hash_file;
    use tempfile::TempDir;

    fn open_in(dir: &TempDir) -> RecordFile {
        RecordFile::open(&dir.path().join("records.db")).unwrap()
    }

    #[test]
    fn open_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("records.db");
        let file = RecordFile::open(&path).unwrap();
        assert!(path.exists());
        assert!(file.is_empty());
    }

    #[test]
    fn append_replace_remove_keep_file_in_sync() {
        let dir = TempDir::new().unwrap();
        let mut file = open_in(&dir);

        file.append_line("first").unwrap();
        file.append_line("second").unwrap();
        file.insert_line(1, "between").unwrap();
        assert_eq!(file.lines(), ["first", "between", "second"]);

        file.replace_line(0, "FIRST").unwrap();
        assert_eq!(file.line(0), Some("FIRST"));

        let removed = file.remove_line(1).unwrap();
        assert_eq!(removed, "between");

        let on_disk = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(on_disk, "FIRST\nsecond\n");
    }

    #[test]
    fn out_of_bounds_edits_fail() {
        let dir = TempDir::new().unwrap();
        let mut file = open_in(&dir);
        file.append_line("only").unwrap();

        assert!(file.replace_line(1, "x").is_err());
        assert!(file.remove_line(1).is_err());
        assert!(file.insert_line(5, "x").is_err());
        assert_eq!(file.lines(), ["only"]);
    }

    #[test]
    fn cache_hash_matches_file_hash() {
        let dir = TempDir::new().unwrap();
        let mut file = open_in(&dir);
        file.append_line("alpha").unwrap();
        file.append_line("beta").unwrap();

        assert_eq!(file.content_hash(), hash_file(file.path()).unwrap());
    }

    #[test]
    fn reload_picks_up_outside_edits() {
        let dir = TempDir::new().unwrap();
        let mut file = open_in(&dir);
        file.append_line("original").unwrap();

        std::fs::write(file.path(), "edited\nelsewhere\n").unwrap();
        file.reload().unwrap();
        assert_eq!(file.lines(), ["edited", "elsewhere"]);
    }
}
