//! Keyed record collections backed by three coordinated stores: the
//! in-memory map, the trigram index, and the on-disk record file. Holding the
//! data three ways buys fast lookup, fast search, and a human-readable
//! recovery path. A JSON snapshot embeds the record-file hash taken at write
//! time; when the hash no longer matches the file on the next open, the file
//! wins and the set rebuilds itself from it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::omnisearch::{edit_distance, search, TrigramIndex, TRIGRAM_LEN};
use crate::db::RecordFile;
use crate::models::{Book, Lending, Record, User};

/// The catalog of books, keyed by ISBN.
pub type BookSet = RecordSet<Book>;
/// The registered patrons, keyed by user ID.
pub type UserSet = RecordSet<User>;
/// All lendings, open and returned, keyed by lending ID.
pub type LendingSet = RecordSet<Lending>;

/// On-disk snapshot: the records plus the record-file hash at save time.
#[derive(Serialize, Deserialize)]
struct Snapshot<T> {
    file_hash: u64,
    records: Vec<T>,
}

/// A collection of records of one entity type. See the module docs for the
/// storage model; all mutations go through [`insert`](Self::insert) and
/// [`remove`](Self::remove), which keep file, snapshot, and index in sync.
pub struct RecordSet<T: Record> {
    records: HashMap<T::Key, T>,
    index: TrigramIndex<T::Key>,
    file: RecordFile,
    snapshot_path: PathBuf,
}

impl<T> RecordSet<T>
where
    T: Record + Serialize + DeserializeOwned,
{
    /// Open a set from its record file and snapshot, creating both when
    /// missing. The snapshot is only trusted while its embedded hash matches
    /// the record file; otherwise, or when it cannot be read at all, the set
    /// rebuilds from the record file.
    pub fn open(file_path: &Path, snapshot_path: &Path) -> Result<Self> {
        let file = RecordFile::open(file_path)?;
        let current_hash = file.content_hash();

        let mut set = Self {
            records: HashMap::new(),
            index: TrigramIndex::new(),
            file,
            snapshot_path: snapshot_path.to_path_buf(),
        };

        if let Some(snapshot) = read_snapshot::<T>(snapshot_path) {
            if snapshot.file_hash == current_hash {
                for record in snapshot.records {
                    set.index.add(&record.searchable_text(), record.key());
                    set.records.insert(record.key(), record);
                }
                return Ok(set);
            }
        }

        set.rebuild_from_file()?;
        Ok(set)
    }

    /// Re-parse every line of the record file. Malformed lines are skipped so
    /// one hand-edited record cannot take the whole collection down. The
    /// snapshot is rewritten afterwards so the next open is clean.
    fn rebuild_from_file(&mut self) -> Result<()> {
        self.records.clear();
        self.index = TrigramIndex::new();

        for line in self.file.lines() {
            if let Ok(record) = T::from_record_line(line) {
                self.index.add(&record.searchable_text(), record.key());
                self.records.insert(record.key(), record);
            }
        }

        self.write_snapshot()
    }

    /// Add a record, or replace the stored record carrying the same key.
    pub fn insert(&mut self, record: T) -> Result<()> {
        let key = record.key();
        if let Some(old) = self.records.remove(&key) {
            self.index.fast_remove(&old.searchable_text(), &key);
        }
        self.index.add(&record.searchable_text(), key.clone());
        self.records.insert(key, record);
        self.sync_on_write()
    }

    /// Remove a record by key, returning it when it existed.
    pub fn remove(&mut self, key: &T::Key) -> Result<Option<T>> {
        match self.records.remove(key) {
            Some(old) => {
                self.index.fast_remove(&old.searchable_text(), key);
                self.sync_on_write()?;
                Ok(Some(old))
            }
            None => Ok(None),
        }
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    /// All records ordered by key. The stable order feeds both the list
    /// screens and the record-file layout.
    pub fn sorted(&self) -> Vec<T> {
        let mut records: Vec<T> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    /// Ranked omnisearch over the set.
    ///
    /// Queries of at least one trigram go through the index, ranked by hit
    /// count and then by edit distance to the query. Shorter queries fall
    /// back to a substring scan, so an exact substring of a record's
    /// searchable text always finds the record regardless of length.
    pub fn search(&self, query: &str) -> Vec<T> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.sorted();
        }

        if query.chars().count() < TRIGRAM_LEN {
            return self
                .sorted()
                .into_iter()
                .filter(|record| record.searchable_text().contains(&query))
                .collect();
        }

        let mut hits = search(&query, &self.index);
        hits.sort_by(|a, b| {
            b.hits.cmp(&a.hits).then_with(|| {
                let first = self
                    .records
                    .get(&a.key)
                    .map(|r| edit_distance(&query, &r.searchable_text()))
                    .unwrap_or(usize::MAX);
                let second = self
                    .records
                    .get(&b.key)
                    .map(|r| edit_distance(&query, &r.searchable_text()))
                    .unwrap_or(usize::MAX);
                first.cmp(&second).then_with(|| a.key.cmp(&b.key))
            })
        });

        hits.iter()
            .filter_map(|hit| self.records.get(&hit.key).cloned())
            .collect()
    }

    /// Rewrite the record file from the map, then the snapshot with the
    /// fresh file hash.
    fn sync_on_write(&mut self) -> Result<()> {
        let lines: Vec<String> = self
            .sorted()
            .iter()
            .map(Record::to_record_line)
            .collect();
        self.file.set_lines(lines)?;
        self.write_snapshot()
    }

    fn write_snapshot(&self) -> Result<()> {
        let snapshot = Snapshot {
            file_hash: self.file.content_hash(),
            records: self.sorted(),
        };
        let json = serde_json::to_string(&snapshot).context("failed to encode snapshot")?;
        fs::write(&self.snapshot_path, json).with_context(|| {
            format!("failed to write snapshot {}", self.snapshot_path.display())
        })
    }
}

/// Best-effort snapshot read; any unreadable or undecodable snapshot just
/// means a rebuild from the record file.
fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Option<Snapshot<T>> {
    let json = fs::read_to_string(path).ok()?;
    serde_json::from_str(&json).ok()
}

impl RecordSet<Lending> {
    /// Next free lending ID.
    pub fn next_id(&self) -> u64 {
        self.iter().map(|lending| lending.id).max().unwrap_or(0) + 1
    }

    /// The open lending for a book, if any. The lending rules guarantee
    /// there is never more than one.
    pub fn active_for_book(&self, isbn: &str) -> Option<&Lending> {
        self.iter()
            .find(|lending| !lending.returned && lending.isbn == isbn)
    }

    /// How many lendings a user currently holds open.
    pub fn active_count_for_user(&self, user_id: &str) -> usize {
        self.iter()
            .filter(|lending| !lending.returned && lending.user_id == user_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        (
            dir.path().join("books.db"),
            dir.path().join("books.snapshot.json"),
        )
    }

    fn sample_book() -> Book {
        Book::new(
            "978-0-13-468599-1",
            "The Rust Programming Language",
            "Steve Klabnik; Carol Nichols",
            2019,
        )
        .unwrap()
    }

    #[test]
    fn insert_then_get_returns_equal_record() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let mut books = BookSet::open(&file, &snapshot).unwrap();

        let book = sample_book();
        books.insert(book.clone()).unwrap();
        assert_eq!(books.get(&book.isbn), Some(&book));
        assert!(books.contains(&book.isbn));
    }

    #[test]
    fn records_survive_a_reopen() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let book = sample_book();

        {
            let mut books = BookSet::open(&file, &snapshot).unwrap();
            books.insert(book.clone()).unwrap();
        }

        let books = BookSet::open(&file, &snapshot).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books.get(&book.isbn), Some(&book));
    }

    #[test]
    fn reopen_without_snapshot_rebuilds_from_record_file() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let book = sample_book();

        {
            let mut books = BookSet::open(&file, &snapshot).unwrap();
            books.insert(book.clone()).unwrap();
        }
        std::fs::remove_file(&snapshot).unwrap();

        let books = BookSet::open(&file, &snapshot).unwrap();
        assert_eq!(books.get(&book.isbn), Some(&book));
    }

    #[test]
    fn outside_edit_invalidates_snapshot_and_rebuilds() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let book = sample_book();

        {
            let mut books = BookSet::open(&file, &snapshot).unwrap();
            books.insert(book.clone()).unwrap();
        }

        // Hand-edit the record file behind the snapshot's back.
        let other = Book::new("0-306-40615-2", "Another Book", "Someone Else", 2001).unwrap();
        let mut content = std::fs::read_to_string(&file).unwrap();
        content.push_str(&other.to_record_line());
        content.push('\n');
        std::fs::write(&file, content).unwrap();

        let books = BookSet::open(&file, &snapshot).unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books.get(&other.isbn), Some(&other));
    }

    #[test]
    fn malformed_lines_are_skipped_on_rebuild() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let book = sample_book();

        let mut content = book.to_record_line();
        content.push('\n');
        content.push_str("this line is not a book record\n");
        std::fs::write(&file, content).unwrap();

        let books = BookSet::open(&file, &snapshot).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books.get(&book.isbn), Some(&book));
    }

    #[test]
    fn insert_with_same_key_replaces() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let mut books = BookSet::open(&file, &snapshot).unwrap();

        let mut book = sample_book();
        books.insert(book.clone()).unwrap();
        book.title = "The Rust Programming Language, 2nd Edition".to_string();
        books.insert(book.clone()).unwrap();

        assert_eq!(books.len(), 1);
        assert_eq!(books.get(&book.isbn).unwrap().title, book.title);
    }

    #[test]
    fn remove_persists() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let book = sample_book();

        {
            let mut books = BookSet::open(&file, &snapshot).unwrap();
            books.insert(book.clone()).unwrap();
            let removed = books.remove(&book.isbn).unwrap();
            assert_eq!(removed, Some(book.clone()));
            assert!(books.remove(&book.isbn).unwrap().is_none());
        }

        let books = BookSet::open(&file, &snapshot).unwrap();
        assert!(books.is_empty());
    }

    #[test]
    fn search_finds_any_exact_substring() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let mut books = BookSet::open(&file, &snapshot).unwrap();
        let book = sample_book();
        books.insert(book.clone()).unwrap();
        books
            .insert(Book::new("0-306-40615-2", "Calculus", "Ron Larson", 2001).unwrap())
            .unwrap();

        // Long, trigram-sized, and sub-trigram queries all hit.
        for query in ["rust programming", "rus", "ru", "r"] {
            let results = books.search(query);
            assert!(
                results.iter().any(|found| found.isbn == book.isbn),
                "query {query:?} missed the record"
            );
        }
        assert!(books.search("zzzz").is_empty());
    }

    #[test]
    fn search_ranks_closer_matches_first() {
        let dir = TempDir::new().unwrap();
        let (file, snapshot) = paths(&dir);
        let mut books = BookSet::open(&file, &snapshot).unwrap();

        let rust = sample_book();
        books.insert(rust.clone()).unwrap();
        books
            .insert(Book::new("0-306-40615-2", "Gardening at Night", "Rusty Trowel", 2001).unwrap())
            .unwrap();

        let results = books.search("rust programming language");
        assert_eq!(results[0].isbn, rust.isbn);
    }

    #[test]
    fn lending_set_helpers() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lendings.db");
        let snapshot = dir.path().join("lendings.snapshot.json");
        let mut lendings = LendingSet::open(&file, &snapshot).unwrap();

        assert_eq!(lendings.next_id(), 1);
        let due = "2026-09-01".parse().unwrap();
        lendings.insert(Lending::new(1, "isbn1", "u1", due)).unwrap();
        let mut returned = Lending::new(2, "isbn2", "u1", due);
        returned.returned = true;
        lendings.insert(returned).unwrap();

        assert_eq!(lendings.next_id(), 3);
        assert!(lendings.active_for_book("isbn1").is_some());
        assert!(lendings.active_for_book("isbn2").is_none());
        assert_eq!(lendings.active_count_for_user("u1"), 1);
    }
}
