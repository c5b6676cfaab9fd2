//! The aggregate model: the three record sets plus every operation that has
//! to look at more than one of them. The list and form controllers only ever
//! mutate records through this type, so the lending rules are enforced in one
//! place.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use directories::BaseDirs;

use crate::db::backup;
use crate::models::{Book, BookDataError, Lending, LendingError, User, UserDataError, MAX_ACTIVE_LENDINGS};
use crate::sets::{BookSet, LendingSet, UserSet};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-lending-manager";

const BOOKS_FILE: &str = "books.db";
const USERS_FILE: &str = "users.db";
const LENDINGS_FILE: &str = "lendings.db";
const BOOKS_SNAPSHOT: &str = "books.snapshot.json";
const USERS_SNAPSHOT: &str = "users.snapshot.json";
const LENDINGS_SNAPSHOT: &str = "lendings.snapshot.json";

/// Everything the application knows, loaded from one data directory.
pub struct Library {
    pub books: BookSet,
    pub users: UserSet,
    pub lendings: LendingSet,
    data_dir: PathBuf,
}

impl Library {
    /// Resolve the per-user data directory inside the home directory.
    pub fn default_data_dir() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
        Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
    }

    /// Open (or initialize) every set inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            books: BookSet::open(&data_dir.join(BOOKS_FILE), &data_dir.join(BOOKS_SNAPSHOT))?,
            users: UserSet::open(&data_dir.join(USERS_FILE), &data_dir.join(USERS_SNAPSHOT))?,
            lendings: LendingSet::open(
                &data_dir.join(LENDINGS_FILE),
                &data_dir.join(LENDINGS_SNAPSHOT),
            )?,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Store a new or edited book. `original_isbn` is `None` when creating;
    /// when editing it carries the key the book was stored under, so the
    /// record can be re-keyed if the ISBN was corrected.
    pub fn save_book(&mut self, mut book: Book, original_isbn: Option<&str>) -> Result<()> {
        match original_isbn {
            None => {
                if self.books.contains(&book.isbn) {
                    return Err(BookDataError::DuplicateIsbn(book.isbn).into());
                }
            }
            Some(original) => {
                let stored = self
                    .books
                    .get(&original.to_string())
                    .ok_or_else(|| LendingError::UnknownBook(original.to_string()))?;
                // The lend counter is a lifetime statistic; edits keep it.
                book.times_lent = stored.times_lent;

                if book.isbn != original {
                    if self.lendings.active_for_book(original).is_some() {
                        return Err(LendingError::BookHasOpenLending(original.to_string()).into());
                    }
                    if self.books.contains(&book.isbn) {
                        return Err(BookDataError::DuplicateIsbn(book.isbn).into());
                    }
                    self.books.remove(&original.to_string())?;
                }
            }
        }

        self.books.insert(book)
    }

    /// Delete a book. Refused while the book is out with a patron.
    pub fn delete_book(&mut self, isbn: &str) -> Result<()> {
        if self.lendings.active_for_book(isbn).is_some() {
            return Err(LendingError::BookHasOpenLending(isbn.to_string()).into());
        }
        self.books
            .remove(&isbn.to_string())?
            .ok_or_else(|| LendingError::UnknownBook(isbn.to_string()))?;
        Ok(())
    }

    /// Store a new or edited user; `original_id` works like
    /// [`save_book`](Self::save_book)'s `original_isbn`.
    pub fn save_user(&mut self, user: User, original_id: Option<&str>) -> Result<()> {
        match original_id {
            None => {
                if self.users.contains(&user.id) {
                    return Err(UserDataError::DuplicateId(user.id).into());
                }
            }
            Some(original) => {
                if !self.users.contains(&original.to_string()) {
                    return Err(LendingError::UnknownUser(original.to_string()).into());
                }
                if user.id != original {
                    if self.lendings.active_count_for_user(original) > 0 {
                        return Err(LendingError::UserHasOpenLendings(original.to_string()).into());
                    }
                    if self.users.contains(&user.id) {
                        return Err(UserDataError::DuplicateId(user.id).into());
                    }
                    self.users.remove(&original.to_string())?;
                }
            }
        }

        self.users.insert(user)
    }

    /// Delete a user. Refused while the user holds open lendings.
    pub fn delete_user(&mut self, id: &str) -> Result<()> {
        if self.lendings.active_count_for_user(id) > 0 {
            return Err(LendingError::UserHasOpenLendings(id.to_string()).into());
        }
        self.users
            .remove(&id.to_string())?
            .ok_or_else(|| LendingError::UnknownUser(id.to_string()))?;
        Ok(())
    }

    /// Lend a book to a user until `return_date`.
    ///
    /// Enforces the lending rules: the book and user must exist, the book
    /// must not be out already, the user must be under the open-lending
    /// limit, and the return date must not lie in the past.
    pub fn lend_book(
        &mut self,
        isbn: &str,
        user_id: &str,
        return_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Lending> {
        let book = self
            .books
            .get(&isbn.to_string())
            .cloned()
            .ok_or_else(|| LendingError::UnknownBook(isbn.to_string()))?;
        if !self.users.contains(&user_id.to_string()) {
            return Err(LendingError::UnknownUser(user_id.to_string()).into());
        }
        if self.lendings.active_for_book(isbn).is_some() {
            return Err(LendingError::BookAlreadyLent(isbn.to_string()).into());
        }
        if self.lendings.active_count_for_user(user_id) >= MAX_ACTIVE_LENDINGS {
            return Err(LendingError::BorrowLimitReached(user_id.to_string()).into());
        }
        if return_date < today {
            return Err(LendingError::ReturnDateInPast.into());
        }

        let lending = Lending::new(self.lendings.next_id(), isbn, user_id, return_date);
        self.lendings.insert(lending.clone())?;

        let mut book = book;
        book.times_lent += 1;
        self.books.insert(book)?;

        Ok(lending)
    }

    /// Mark an open lending as returned, freeing the book.
    pub fn return_lending(&mut self, id: u64) -> Result<Lending> {
        let mut lending = self
            .lendings
            .get(&id)
            .cloned()
            .ok_or(LendingError::UnknownLending(id))?;
        if lending.returned {
            return Err(LendingError::AlreadyReturned(id).into());
        }
        lending.returned = true;
        self.lendings.insert(lending.clone())?;
        Ok(lending)
    }

    /// Move the return date of an open lending.
    pub fn reschedule_lending(
        &mut self,
        id: u64,
        return_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Lending> {
        let mut lending = self
            .lendings
            .get(&id)
            .cloned()
            .ok_or(LendingError::UnknownLending(id))?;
        if lending.returned {
            return Err(LendingError::AlreadyReturned(id).into());
        }
        if return_date < today {
            return Err(LendingError::ReturnDateInPast.into());
        }
        lending.return_date = return_date;
        self.lendings.insert(lending.clone())?;
        Ok(lending)
    }

    /// Delete a lending record from the history. Open lendings have to be
    /// returned first.
    pub fn delete_lending(&mut self, id: u64) -> Result<()> {
        let lending = self
            .lendings
            .get(&id)
            .ok_or(LendingError::UnknownLending(id))?;
        if !lending.returned {
            return Err(LendingError::StillOpen(id).into());
        }
        self.lendings.remove(&id)?;
        Ok(())
    }

    /// Snapshot every record file into a new backup directory.
    pub fn create_backup(&self) -> Result<PathBuf> {
        backup::create_backup(&self.data_dir)
    }

    /// Existing backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        backup::list_backups(&self.data_dir)
    }

    /// Restore a backup and reload every set from the restored files. The
    /// content-hash check sees the changed files and rebuilds from them.
    pub fn restore_backup(&mut self, backup_dir: &Path) -> Result<()> {
        backup::restore_backup(&self.data_dir, backup_dir)?;
        *self = Self::open(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn library_with_fixtures(dir: &TempDir) -> Library {
        let mut library = Library::open(dir.path()).unwrap();
        library
            .save_book(
                Book::new("9780134685991", "The Rust Programming Language", "Steve Klabnik", 2019)
                    .unwrap(),
                None,
            )
            .unwrap();
        library
            .save_book(
                Book::new("0306406152", "Flow Measurement Handbook", "Roger Baker", 2000).unwrap(),
                None,
            )
            .unwrap();
        library
            .save_user(User::new("u1", "Ada", "Lovelace", "ada@example.org").unwrap(), None)
            .unwrap();
        library
    }

    #[test]
    fn a_book_cannot_be_lent_twice_concurrently() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let today = date("2026-08-07");

        library
            .lend_book("9780134685991", "u1", date("2026-09-01"), today)
            .unwrap();
        let err = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), today)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LendingError>(),
            Some(&LendingError::BookAlreadyLent("9780134685991".to_string()))
        );
    }

    #[test]
    fn returning_allows_lending_again() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let today = date("2026-08-07");

        let lending = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), today)
            .unwrap();
        library.return_lending(lending.id).unwrap();
        library
            .lend_book("9780134685991", "u1", date("2026-10-01"), today)
            .unwrap();

        assert_eq!(library.books.get(&"9780134685991".to_string()).unwrap().times_lent, 2);
    }

    #[test]
    fn returning_twice_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let lending = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), date("2026-08-07"))
            .unwrap();
        library.return_lending(lending.id).unwrap();
        let err = library.return_lending(lending.id).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LendingError>(),
            Some(&LendingError::AlreadyReturned(lending.id))
        );
    }

    #[test]
    fn borrow_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::open(dir.path()).unwrap();
        library
            .save_user(User::new("u1", "Ada", "Lovelace", "ada@example.org").unwrap(), None)
            .unwrap();

        // Five distinct books go out fine; the sixth is refused.
        let isbns = [
            "9780134685991",
            "0306406152",
            "043942089X",
            "9780306406157",
            "9781593278281",
            "9780132350884",
        ];
        let today = date("2026-08-07");
        for (i, isbn) in isbns.iter().enumerate() {
            library
                .save_book(Book::new(isbn, &format!("Book {i}"), "Author", 2019).unwrap(), None)
                .unwrap();
        }
        for isbn in &isbns[..MAX_ACTIVE_LENDINGS] {
            library.lend_book(isbn, "u1", date("2026-09-01"), today).unwrap();
        }
        let err = library
            .lend_book(isbns[MAX_ACTIVE_LENDINGS], "u1", date("2026-09-01"), today)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LendingError>(),
            Some(&LendingError::BorrowLimitReached("u1".to_string()))
        );
    }

    #[test]
    fn rescheduling_moves_the_due_date_of_open_lendings_only() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let today = date("2026-08-07");
        let lending = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), today)
            .unwrap();

        let moved = library
            .reschedule_lending(lending.id, date("2026-10-01"), today)
            .unwrap();
        assert_eq!(moved.return_date, date("2026-10-01"));
        assert!(library
            .reschedule_lending(lending.id, date("2026-01-01"), today)
            .is_err());

        library.return_lending(lending.id).unwrap();
        let err = library
            .reschedule_lending(lending.id, date("2026-11-01"), today)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LendingError>(),
            Some(&LendingError::AlreadyReturned(lending.id))
        );
    }

    #[test]
    fn past_return_date_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let err = library
            .lend_book("9780134685991", "u1", date("2026-08-01"), date("2026-08-07"))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LendingError>(),
            Some(&LendingError::ReturnDateInPast)
        );
    }

    #[test]
    fn lent_books_and_borrowing_users_cannot_be_deleted() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let lending = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), date("2026-08-07"))
            .unwrap();

        assert!(library.delete_book("9780134685991").is_err());
        assert!(library.delete_user("u1").is_err());
        assert!(library.delete_lending(lending.id).is_err());

        library.return_lending(lending.id).unwrap();
        library.delete_lending(lending.id).unwrap();
        library.delete_book("9780134685991").unwrap();
        library.delete_user("u1").unwrap();
    }

    #[test]
    fn duplicate_keys_are_refused() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);

        let err = library
            .save_book(
                Book::new("9780134685991", "Impostor", "Nobody", 2020).unwrap(),
                None,
            )
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<BookDataError>(),
            Some(&BookDataError::DuplicateIsbn("9780134685991".to_string()))
        );

        let err = library
            .save_user(User::new("u1", "Eva", "Clone", "eva@example.org").unwrap(), None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<UserDataError>(),
            Some(&UserDataError::DuplicateId("u1".to_string()))
        );
    }

    #[test]
    fn editing_keeps_the_lend_counter() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let lending = library
            .lend_book("9780134685991", "u1", date("2026-09-01"), date("2026-08-07"))
            .unwrap();
        library.return_lending(lending.id).unwrap();

        let edited =
            Book::new("9780134685991", "The Rust Programming Language, 2e", "Steve Klabnik", 2023)
                .unwrap();
        library.save_book(edited, Some("9780134685991")).unwrap();
        let stored = library.books.get(&"9780134685991".to_string()).unwrap();
        assert_eq!(stored.times_lent, 1);
        assert_eq!(stored.title, "The Rust Programming Language, 2e");
    }

    #[test]
    fn backup_then_restore_reproduces_the_model() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_fixtures(&dir);
        let backup = library.create_backup().unwrap();

        // Mutate everything after the backup.
        library
            .lend_book("9780134685991", "u1", date("2026-09-01"), date("2026-08-07"))
            .unwrap();
        library.delete_book("0306406152").unwrap();
        library
            .save_user(User::new("u2", "Grace", "Hopper", "grace@example.org").unwrap(), None)
            .unwrap();

        library.restore_backup(&backup).unwrap();

        assert_eq!(library.books.len(), 2);
        assert!(library.books.contains(&"0306406152".to_string()));
        assert_eq!(library.books.get(&"9780134685991".to_string()).unwrap().times_lent, 0);
        assert_eq!(library.users.len(), 1);
        assert!(library.lendings.is_empty());
    }
}
