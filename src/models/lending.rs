use std::fmt;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Record, FIELD_SEPARATOR};

/// Rule violations around lending and returning books. These guard the model
/// invariants, so a refused operation leaves every set untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LendingError {
    #[error("No book with ISBN {0} is registered.")]
    UnknownBook(String),
    #[error("No user with ID {0} is registered.")]
    UnknownUser(String),
    #[error("Book {0} is already lent out.")]
    BookAlreadyLent(String),
    #[error("User {0} has reached the limit of open lendings.")]
    BorrowLimitReached(String),
    #[error("Return date must not be in the past.")]
    ReturnDateInPast,
    #[error("Lending {0} is already marked as returned.")]
    AlreadyReturned(u64),
    #[error("No lending with ID {0} exists.")]
    UnknownLending(u64),
    #[error("Lending {0} is still open; mark it returned first.")]
    StillOpen(u64),
    #[error("Book {0} has an open lending and cannot be deleted.")]
    BookHasOpenLending(String),
    #[error("User {0} has open lendings and cannot be deleted.")]
    UserHasOpenLendings(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Associates one book with one user for a borrowing period. The numeric ID
/// is assigned by the LendingSet and is the unique key. Book and user are
/// referenced by their own keys so a lending can be decoded without either
/// set at hand.
pub struct Lending {
    pub id: u64,
    pub isbn: String,
    pub user_id: String,
    pub return_date: NaiveDate,
    pub returned: bool,
}

impl Lending {
    pub fn new(id: u64, isbn: &str, user_id: &str, return_date: NaiveDate) -> Self {
        Self {
            id,
            isbn: isbn.to_string(),
            user_id: user_id.to_string(),
            return_date,
            returned: false,
        }
    }

    /// An open lending past its agreed return date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.returned && self.return_date < today
    }
}

impl fmt::Display for Lending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} -> {} (due {})",
            self.id, self.isbn, self.user_id, self.return_date
        )
    }
}

impl Record for Lending {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn to_record_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.id,
            self.isbn,
            self.user_id,
            self.return_date,
            self.returned,
            sep = FIELD_SEPARATOR,
        )
    }

    fn from_record_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 5 {
            bail!("malformed lending record: expected 5 fields, found {}", fields.len());
        }

        Ok(Self {
            id: fields[0].parse().context("lending id is not a number")?,
            isbn: fields[1].to_string(),
            user_id: fields[2].to_string(),
            return_date: fields[3]
                .parse()
                .context("lending return date is not an ISO date")?,
            returned: fields[4]
                .parse()
                .context("lending returned flag is not a boolean")?,
        })
    }

    fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.id, self.isbn, self.user_id, self.return_date
        )
        .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn record_line_round_trips() {
        let mut lending = Lending::new(7, "9780134685991", "u1", date("2026-09-01"));
        let parsed = Lending::from_record_line(&lending.to_record_line()).unwrap();
        assert_eq!(parsed, lending);

        lending.returned = true;
        let parsed = Lending::from_record_line(&lending.to_record_line()).unwrap();
        assert!(parsed.returned);
    }

    #[test]
    fn overdue_only_while_open() {
        let mut lending = Lending::new(1, "9780134685991", "u1", date("2026-01-01"));
        assert!(lending.is_overdue(date("2026-01-02")));
        assert!(!lending.is_overdue(date("2026-01-01")));

        lending.returned = true;
        assert!(!lending.is_overdue(date("2026-01-02")));
    }

    #[test]
    fn malformed_record_line_is_rejected() {
        assert!(Lending::from_record_line("nope").is_err());
        let bad_date = format!(
            "1{sep}9780134685991{sep}u1{sep}someday{sep}false",
            sep = FIELD_SEPARATOR
        );
        assert!(Lending::from_record_line(&bad_date).is_err());
    }
}
