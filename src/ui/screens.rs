use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;

use crate::library::Library;
use crate::models::{Book, Lending, User};

/// One row of the books tab: the record plus who currently holds it.
#[derive(Clone)]
pub(crate) struct BookRow {
    pub(crate) book: Book,
    pub(crate) lent_to: Option<String>,
}

/// One row of the users tab: the record plus how many lendings are open.
#[derive(Clone)]
pub(crate) struct UserRow {
    pub(crate) user: User,
    pub(crate) open_lendings: usize,
}

/// One row of the lendings tab with the book and user resolved for display.
#[derive(Clone)]
pub(crate) struct LendingRow {
    pub(crate) lending: Lending,
    pub(crate) book_title: String,
    pub(crate) user_name: String,
}

impl LendingRow {
    /// "Title -> Name" line used by the confirm dialogs.
    pub(crate) fn summary(&self) -> String {
        format!("{} -> {}", self.book_title, self.user_name)
    }

    pub(crate) fn status_label(&self, today: NaiveDate) -> &'static str {
        if self.lending.returned {
            "Returned"
        } else if self.lending.is_overdue(today) {
            "OVERDUE"
        } else {
            "Open"
        }
    }
}

/// Backing state shared by every tab: the visible rows (already filtered),
/// the omnisearch query that produced them, and the selection.
pub(crate) struct TabList<R> {
    pub(crate) rows: Vec<R>,
    pub(crate) filter: Option<String>,
    pub(crate) selected: usize,
}

pub(crate) type BookTab = TabList<BookRow>;
pub(crate) type UserTab = TabList<UserRow>;
pub(crate) type LendingTab = TabList<LendingRow>;

impl<R> TabList<R> {
    pub(crate) fn new() -> Self {
        Self {
            rows: Vec::new(),
            filter: None,
            selected: 0,
        }
    }

    /// Swap in freshly computed rows, keeping the selection in bounds.
    pub(crate) fn set_rows(&mut self, rows: Vec<R>) {
        self.rows = rows;
        self.ensure_in_bounds();
    }

    pub(crate) fn current(&self) -> Option<&R> {
        self.rows.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.rows.is_empty() {
            return;
        }
        let len = self.rows.len() as isize;
        let mut new = self.selected as isize + offset;
        if new < 0 {
            new = 0;
        }
        if new >= len {
            new = len - 1;
        }
        self.selected = new as usize;
    }

    pub(crate) fn select_first(&mut self) {
        if !self.rows.is_empty() {
            self.selected = 0;
        }
    }

    pub(crate) fn select_last(&mut self) {
        if !self.rows.is_empty() {
            self.selected = self.rows.len() - 1;
        }
    }

    /// Select the row `predicate` matches, if present.
    pub(crate) fn select_where(&mut self, predicate: impl Fn(&R) -> bool) {
        if let Some(position) = self.rows.iter().position(predicate) {
            self.selected = position;
        }
    }

    /// Whether an omnisearch filter is currently narrowing the rows.
    pub(crate) fn has_filter(&self) -> bool {
        self.filter
            .as_ref()
            .map(|query| !query.trim().is_empty())
            .unwrap_or(false)
    }

    fn ensure_in_bounds(&mut self) {
        if self.rows.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.rows.len() {
            self.selected = self.rows.len() - 1;
        }
    }
}

/// Build the books tab rows from the current filter and lending state.
pub(crate) fn book_rows(library: &Library, filter: Option<&str>) -> Vec<BookRow> {
    let books = match filter {
        Some(query) => library.books.search(query),
        None => library.books.sorted(),
    };
    books
        .into_iter()
        .map(|book| BookRow {
            lent_to: library
                .lendings
                .active_for_book(&book.isbn)
                .map(|lending| lending.user_id.clone()),
            book,
        })
        .collect()
}

/// Build the users tab rows from the current filter and lending state.
pub(crate) fn user_rows(library: &Library, filter: Option<&str>) -> Vec<UserRow> {
    let users = match filter {
        Some(query) => library.users.search(query),
        None => library.users.sorted(),
    };
    users
        .into_iter()
        .map(|user| UserRow {
            open_lendings: library.lendings.active_count_for_user(&user.id),
            user,
        })
        .collect()
}

/// Build the lendings tab rows, resolving book and user for display. Records
/// whose book or user was since removed still render with their raw keys.
pub(crate) fn lending_rows(
    library: &Library,
    filter: Option<&str>,
    only_open: bool,
) -> Vec<LendingRow> {
    let lendings = match filter {
        Some(query) => library.lendings.search(query),
        None => library.lendings.sorted(),
    };
    lendings
        .into_iter()
        .filter(|lending| !only_open || !lending.returned)
        .map(|lending| LendingRow {
            book_title: library
                .books
                .get(&lending.isbn)
                .map(|book| book.title.clone())
                .unwrap_or_else(|| lending.isbn.clone()),
            user_name: library
                .users
                .get(&lending.user_id)
                .map(|user| user.full_name())
                .unwrap_or_else(|| lending.user_id.clone()),
            lending,
        })
        .collect()
}

/// Backing state for the restore picker listing available backups.
pub(crate) struct BackupPicker {
    pub(crate) entries: Vec<PathBuf>,
    pub(crate) selected: usize,
}

impl BackupPicker {
    pub(crate) fn load(library: &Library) -> Result<Self> {
        Ok(Self {
            entries: library.list_backups()?,
            selected: 0,
        })
    }

    pub(crate) fn current(&self) -> Option<&PathBuf> {
        self.entries.get(self.selected)
    }

    /// Directory name shown in the picker and the confirm dialog.
    pub(crate) fn label(path: &std::path::Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.entries.is_empty() {
            return;
        }
        let len = self.entries.len() as isize;
        let mut new = self.selected as isize + offset;
        if new < 0 {
            new = 0;
        }
        if new >= len {
            new = len - 1;
        }
        self.selected = new as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_stays_in_bounds() {
        let mut tab: TabList<u32> = TabList::new();
        tab.set_rows(vec![1, 2, 3]);
        tab.move_selection(10);
        assert_eq!(tab.selected, 2);
        tab.move_selection(-10);
        assert_eq!(tab.selected, 0);

        tab.selected = 2;
        tab.set_rows(vec![1]);
        assert_eq!(tab.selected, 0);

        tab.set_rows(Vec::new());
        assert!(tab.current().is_none());
    }

    #[test]
    fn select_where_finds_a_row() {
        let mut tab: TabList<u32> = TabList::new();
        tab.set_rows(vec![10, 20, 30]);
        tab.select_where(|row| *row == 20);
        assert_eq!(tab.selected, 1);
        // No match leaves the selection alone.
        tab.select_where(|row| *row == 99);
        assert_eq!(tab.selected, 1);
    }
}
