use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::{Book, BookDataError, Lending, User, UserDataError};

/// Form state for creating or editing a book. Input is kept as raw strings
/// until save time, when [`parse`](Self::parse) runs the full validation and
/// either yields a record or the typed error shown inside the form.
#[derive(Default, Clone)]
pub(crate) struct BookForm {
    pub(crate) isbn: String,
    pub(crate) title: String,
    pub(crate) authors: String,
    pub(crate) year: String,
    pub(crate) active: BookField,
    pub(crate) error: Option<String>,
}

/// Fields available within the book form.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub(crate) enum BookField {
    #[default]
    Isbn,
    Title,
    Authors,
    Year,
}

impl BookForm {
    /// Populate the form from an existing book when editing.
    pub(crate) fn from_book(book: &Book) -> Self {
        Self {
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            authors: book.authors_string(),
            year: book.year.to_string(),
            active: BookField::Isbn,
            error: None,
        }
    }

    /// Move focus to the next field, wrapping around.
    pub(crate) fn next_field(&mut self) {
        self.active = match self.active {
            BookField::Isbn => BookField::Title,
            BookField::Title => BookField::Authors,
            BookField::Authors => BookField::Year,
            BookField::Year => BookField::Isbn,
        };
    }

    /// Append a character to the active field, rejecting input the field can
    /// never accept.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        match self.active {
            BookField::Isbn => {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == ' ' {
                    self.isbn.push(ch);
                    true
                } else {
                    false
                }
            }
            BookField::Title => push_text(&mut self.title, ch),
            BookField::Authors => push_text(&mut self.authors, ch),
            BookField::Year => {
                if ch.is_ascii_digit() && self.year.len() < 4 {
                    self.year.push(ch);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Remove the last character from the active field.
    pub(crate) fn backspace(&mut self) {
        match self.active {
            BookField::Isbn => {
                self.isbn.pop();
            }
            BookField::Title => {
                self.title.pop();
            }
            BookField::Authors => {
                self.authors.pop();
            }
            BookField::Year => {
                self.year.pop();
            }
        }
    }

    /// Validate the inputs and build the record ready for saving.
    pub(crate) fn parse(&self) -> Result<Book, BookDataError> {
        let year = self.year.trim().parse::<i32>().unwrap_or(0);
        Book::new(&self.isbn, &self.title, &self.authors, year)
    }

    /// Render a single labelled line for the form widget.
    pub(crate) fn build_line(&self, field_name: &str, field: BookField) -> Line<'static> {
        let value = match field {
            BookField::Isbn => &self.isbn,
            BookField::Title => &self.title,
            BookField::Authors => &self.authors,
            BookField::Year => &self.year,
        };
        form_line(field_name, value, self.active == field)
    }

    /// Character count of the requested field, used for cursor placement.
    pub(crate) fn value_len(&self, field: BookField) -> usize {
        match field {
            BookField::Isbn => self.isbn.chars().count(),
            BookField::Title => self.title.chars().count(),
            BookField::Authors => self.authors.chars().count(),
            BookField::Year => self.year.chars().count(),
        }
    }
}

/// Form state for creating or editing a user.
#[derive(Default, Clone)]
pub(crate) struct UserForm {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) surname: String,
    pub(crate) email: String,
    pub(crate) active: UserField,
    pub(crate) error: Option<String>,
}

/// Fields available within the user form.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub(crate) enum UserField {
    #[default]
    Id,
    Name,
    Surname,
    Email,
}

impl UserForm {
    /// Populate the form from an existing user when editing.
    pub(crate) fn from_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            surname: user.surname.clone(),
            email: user.email.clone(),
            active: UserField::Id,
            error: None,
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.active = match self.active {
            UserField::Id => UserField::Name,
            UserField::Name => UserField::Surname,
            UserField::Surname => UserField::Email,
            UserField::Email => UserField::Id,
        };
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        match self.active {
            UserField::Id => {
                if ch.is_ascii_alphanumeric() {
                    self.id.push(ch);
                    true
                } else {
                    false
                }
            }
            UserField::Name => push_text(&mut self.name, ch),
            UserField::Surname => push_text(&mut self.surname, ch),
            UserField::Email => {
                if !ch.is_control() && !ch.is_whitespace() {
                    self.email.push(ch);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            UserField::Id => {
                self.id.pop();
            }
            UserField::Name => {
                self.name.pop();
            }
            UserField::Surname => {
                self.surname.pop();
            }
            UserField::Email => {
                self.email.pop();
            }
        }
    }

    pub(crate) fn parse(&self) -> Result<User, UserDataError> {
        User::new(&self.id, &self.name, &self.surname, &self.email)
    }

    pub(crate) fn build_line(&self, field_name: &str, field: UserField) -> Line<'static> {
        let value = match field {
            UserField::Id => &self.id,
            UserField::Name => &self.name,
            UserField::Surname => &self.surname,
            UserField::Email => &self.email,
        };
        form_line(field_name, value, self.active == field)
    }

    pub(crate) fn value_len(&self, field: UserField) -> usize {
        match field {
            UserField::Id => self.id.chars().count(),
            UserField::Name => self.name.chars().count(),
            UserField::Surname => self.surname.chars().count(),
            UserField::Email => self.email.chars().count(),
        }
    }
}

/// Default loan period offered when a lending form opens.
const DEFAULT_LOAN_DAYS: i64 = 28;

/// Form state for lending a book: who borrows it and until when.
#[derive(Clone)]
pub(crate) struct LendForm {
    pub(crate) user_id: String,
    pub(crate) return_date: String,
    pub(crate) active: LendField,
    pub(crate) error: Option<String>,
}

/// Fields available within the lend form.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub(crate) enum LendField {
    #[default]
    UserId,
    ReturnDate,
}

impl LendForm {
    /// Start a lend form with the standard loan period already filled in.
    pub(crate) fn new(today: NaiveDate) -> Self {
        Self {
            user_id: String::new(),
            return_date: (today + chrono::Duration::days(DEFAULT_LOAN_DAYS)).to_string(),
            active: LendField::UserId,
            error: None,
        }
    }

    pub(crate) fn toggle_field(&mut self) {
        self.active = match self.active {
            LendField::UserId => LendField::ReturnDate,
            LendField::ReturnDate => LendField::UserId,
        };
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        match self.active {
            LendField::UserId => {
                if ch.is_ascii_alphanumeric() {
                    self.user_id.push(ch);
                    true
                } else {
                    false
                }
            }
            LendField::ReturnDate => {
                if ch.is_ascii_digit() || ch == '-' {
                    self.return_date.push(ch);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            LendField::UserId => {
                self.user_id.pop();
            }
            LendField::ReturnDate => {
                self.return_date.pop();
            }
        }
    }

    /// Validate the inputs and return typed values ready for the lending
    /// rules to inspect.
    pub(crate) fn parse_inputs(&self) -> Result<(String, NaiveDate)> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            anyhow::bail!("User ID is required.");
        }
        let return_date = self
            .return_date
            .trim()
            .parse::<NaiveDate>()
            .context("Return date must be a date in YYYY-MM-DD form.")?;
        Ok((user_id.to_string(), return_date))
    }

    pub(crate) fn build_line(&self, field_name: &str, field: LendField) -> Line<'static> {
        let value = match field {
            LendField::UserId => &self.user_id,
            LendField::ReturnDate => &self.return_date,
        };
        form_line(field_name, value, self.active == field)
    }

    pub(crate) fn value_len(&self, field: LendField) -> usize {
        match field {
            LendField::UserId => self.user_id.chars().count(),
            LendField::ReturnDate => self.return_date.chars().count(),
        }
    }
}

/// Single-field form for moving an open lending's return date.
#[derive(Clone)]
pub(crate) struct DueDateForm {
    pub(crate) value: String,
    pub(crate) error: Option<String>,
}

impl DueDateForm {
    pub(crate) fn from_lending(lending: &Lending) -> Self {
        Self {
            value: lending.return_date.to_string(),
            error: None,
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_ascii_digit() || ch == '-' {
            self.value.push(ch);
            true
        } else {
            false
        }
    }

    pub(crate) fn backspace(&mut self) {
        self.value.pop();
    }

    pub(crate) fn parse_input(&self) -> Result<NaiveDate> {
        self.value
            .trim()
            .parse::<NaiveDate>()
            .context("Return date must be a date in YYYY-MM-DD form.")
    }

    pub(crate) fn build_line(&self) -> Line<'static> {
        form_line("Return date", &self.value, true)
    }
}

/// Confirmation state before deleting a book.
#[derive(Clone)]
pub(crate) struct ConfirmBookDelete {
    pub(crate) isbn: String,
    pub(crate) title: String,
}

impl ConfirmBookDelete {
    pub(crate) fn from(book: &Book) -> Self {
        Self {
            isbn: book.isbn.clone(),
            title: book.title.clone(),
        }
    }
}

/// Confirmation state before deleting a user.
#[derive(Clone)]
pub(crate) struct ConfirmUserDelete {
    pub(crate) id: String,
    pub(crate) full_name: String,
}

impl ConfirmUserDelete {
    pub(crate) fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name(),
        }
    }
}

/// Confirmation state before marking a lending as returned.
#[derive(Clone)]
pub(crate) struct ConfirmReturn {
    pub(crate) id: u64,
    pub(crate) summary: String,
}

/// Confirmation state before deleting a returned lending from the history.
#[derive(Clone)]
pub(crate) struct ConfirmLendingDelete {
    pub(crate) id: u64,
    pub(crate) summary: String,
}

/// Confirmation state before restoring a backup over the live data.
#[derive(Clone)]
pub(crate) struct ConfirmRestore {
    pub(crate) dir: PathBuf,
    pub(crate) label: String,
}

/// Append a printable character to a free-text field.
fn push_text(value: &mut String, ch: char) -> bool {
    if ch.is_control() {
        false
    } else {
        value.push(ch);
        true
    }
}

/// Shared rendering for one labelled form line: the active field shows
/// yellow, empty inactive fields show the placeholder dimmed.
fn form_line(field_name: &str, value: &str, is_active: bool) -> Line<'static> {
    let display = if value.is_empty() {
        "<required>".to_string()
    } else {
        value.to_string()
    };

    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else if value.is_empty() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::raw(format!("{field_name}: ")),
        Span::styled(display, style),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_form_rejects_characters_per_field() {
        let mut form = BookForm::default();
        assert!(form.push_char('9'));
        assert!(form.push_char('-'));
        assert!(!form.push_char('!'));

        form.active = BookField::Year;
        assert!(form.push_char('2'));
        assert!(!form.push_char('a'));
        for ch in ['0', '1', '9'] {
            form.push_char(ch);
        }
        // A fifth digit no longer fits a year.
        assert!(!form.push_char('9'));
    }

    #[test]
    fn book_form_parse_surfaces_validation_errors() {
        let mut form = BookForm {
            isbn: "9780134685991".to_string(),
            title: String::new(),
            authors: "Steve Klabnik".to_string(),
            year: "2019".to_string(),
            ..BookForm::default()
        };
        assert_eq!(form.parse(), Err(BookDataError::EmptyTitle));

        form.title = "The Rust Programming Language".to_string();
        assert!(form.parse().is_ok());
    }

    #[test]
    fn lend_form_parses_date_and_requires_user() {
        let today = "2026-08-07".parse().unwrap();
        let mut form = LendForm::new(today);
        assert!(form.parse_inputs().is_err());

        form.user_id = "u1".to_string();
        let (user_id, due) = form.parse_inputs().unwrap();
        assert_eq!(user_id, "u1");
        assert_eq!(due, "2026-09-04".parse().unwrap());

        form.return_date = "never".to_string();
        assert!(form.parse_inputs().is_err());
    }
}
