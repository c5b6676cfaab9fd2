use std::fmt;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Record, FIELD_SEPARATOR};

/// Authors are stored as a list but entered and displayed as a single
/// semicolon-separated string.
const AUTHOR_SEPARATOR: &str = "; ";

/// Validation failures for book data. Raised before anything touches the
/// catalog, so a rejected edit leaves the BookSet exactly as it was.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookDataError {
    #[error("Book title is required.")]
    EmptyTitle,
    #[error("At least one author is required.")]
    NoAuthors,
    #[error("Release year must be between 1 and {max}.")]
    YearOutOfRange { max: i32 },
    #[error("{0:?} is not a valid ISBN-10 or ISBN-13.")]
    IsbnNotValid(String),
    #[error("A book with ISBN {0} is already registered.")]
    DuplicateIsbn(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A catalog record. The ISBN is the unique key; `times_lent` counts how
/// often the book has gone out over its lifetime and survives edits.
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub times_lent: u32,
}

impl Book {
    /// Validate the fields and build a new catalog record. `authors` is the
    /// display form, individual names separated by semicolons.
    pub fn new(isbn: &str, title: &str, authors: &str, year: i32) -> Result<Self, BookDataError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(BookDataError::EmptyTitle);
        }

        let authors = split_authors(authors);
        if authors.is_empty() {
            return Err(BookDataError::NoAuthors);
        }

        let max_year = Utc::now().date_naive().year() + 10;
        if year < 1 || year > max_year {
            return Err(BookDataError::YearOutOfRange { max: max_year });
        }

        if !is_valid_isbn(isbn) {
            return Err(BookDataError::IsbnNotValid(isbn.to_string()));
        }

        Ok(Self {
            isbn: normalize_isbn(isbn),
            title: title.to_string(),
            authors,
            year,
            times_lent: 0,
        })
    }

    /// Authors as the single display string used by forms and list rows.
    pub fn authors_string(&self) -> String {
        self.authors.join(AUTHOR_SEPARATOR)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.isbn)
    }
}

impl Record for Book {
    type Key = String;

    fn key(&self) -> String {
        self.isbn.clone()
    }

    fn to_record_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.title,
            self.authors_string(),
            self.isbn,
            self.year,
            self.times_lent,
            sep = FIELD_SEPARATOR,
        )
    }

    fn from_record_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 5 {
            bail!("malformed book record: expected 5 fields, found {}", fields.len());
        }

        Ok(Self {
            title: fields[0].to_string(),
            authors: split_authors(fields[1]),
            isbn: fields[2].to_string(),
            year: fields[3].parse().context("book year is not a number")?,
            times_lent: fields[4]
                .parse()
                .context("book lend counter is not a number")?,
        })
    }

    fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.isbn,
            self.title,
            self.authors_string(),
            self.year,
        )
        .to_lowercase()
    }
}

/// Split a semicolon-separated author string, dropping empty entries.
fn split_authors(authors: &str) -> Vec<String> {
    authors
        .split(';')
        .map(|author| author.trim())
        .filter(|author| !author.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip the hyphens and spaces commonly typed inside ISBNs.
fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|ch| !matches!(ch, '-' | ' '))
        .collect::<String>()
        .to_uppercase()
}

/// Checksum validation accepting both ISBN-10 and ISBN-13.
pub fn is_valid_isbn(isbn: &str) -> bool {
    let normalized = normalize_isbn(isbn);
    match normalized.len() {
        10 => is_valid_isbn10(&normalized),
        13 => is_valid_isbn13(&normalized),
        _ => false,
    }
}

fn is_valid_isbn10(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (position, ch) in isbn.chars().enumerate() {
        let value = match ch {
            '0'..='9' => ch as u32 - '0' as u32,
            // A trailing X stands for the check value ten.
            'X' if position == 9 => 10,
            _ => return false,
        };
        sum += (10 - position as u32) * value;
    }
    sum % 11 == 0
}

fn is_valid_isbn13(isbn: &str) -> bool {
    let mut sum = 0u32;
    for (position, ch) in isbn.chars().enumerate() {
        let value = match ch {
            '0'..='9' => ch as u32 - '0' as u32,
            _ => return false,
        };
        let weight = if position % 2 == 0 { 1 } else { 3 };
        sum += weight * value;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_isbn13_and_isbn10() {
        assert!(is_valid_isbn("978-0-13-468599-1")); // The Rust Programming Language
        assert!(is_valid_isbn("0-306-40615-2"));
        assert!(is_valid_isbn("043942089X"));
    }

    #[test]
    fn rejects_bad_checksums_and_shapes() {
        assert!(!is_valid_isbn("978-0-13-468599-2"));
        assert!(!is_valid_isbn("0-306-40615-1"));
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn("abcdefghij"));
        assert!(!is_valid_isbn(""));
    }

    #[test]
    fn new_book_validates_fields() {
        assert_eq!(
            Book::new("9780134685991", "", "Steve Klabnik", 2019),
            Err(BookDataError::EmptyTitle)
        );
        assert_eq!(
            Book::new("9780134685991", "The Rust Programming Language", " ; ", 2019),
            Err(BookDataError::NoAuthors)
        );
        assert!(matches!(
            Book::new("9780134685991", "The Rust Programming Language", "Steve Klabnik", 0),
            Err(BookDataError::YearOutOfRange { .. })
        ));
        assert_eq!(
            Book::new("not-an-isbn", "The Rust Programming Language", "Steve Klabnik", 2019),
            Err(BookDataError::IsbnNotValid("not-an-isbn".to_string()))
        );
    }

    #[test]
    fn new_book_normalizes_isbn_and_splits_authors() {
        let book = Book::new(
            "978-0-13-468599-1",
            "The Rust Programming Language",
            "Steve Klabnik; Carol Nichols",
            2019,
        )
        .unwrap();
        assert_eq!(book.isbn, "9780134685991");
        assert_eq!(book.authors, vec!["Steve Klabnik", "Carol Nichols"]);
        assert_eq!(book.authors_string(), "Steve Klabnik; Carol Nichols");
        assert_eq!(book.times_lent, 0);
    }

    #[test]
    fn record_line_round_trips() {
        let book = Book::new("9780134685991", "The Rust Programming Language", "Steve Klabnik; Carol Nichols", 2019)
            .unwrap();
        let parsed = Book::from_record_line(&book.to_record_line()).unwrap();
        assert_eq!(parsed, book);
    }

    #[test]
    fn malformed_record_line_is_rejected() {
        assert!(Book::from_record_line("only one field").is_err());
        let bad_year = format!(
            "Title{sep}Author{sep}9780134685991{sep}not-a-year{sep}0",
            sep = FIELD_SEPARATOR
        );
        assert!(Book::from_record_line(&bad_year).is_err());
    }
}
