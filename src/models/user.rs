use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Record, FIELD_SEPARATOR};

/// How many lendings a single patron may have open at once.
pub const MAX_ACTIVE_LENDINGS: usize = 5;

/// Validation failures for patron data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserDataError {
    #[error("User ID is required.")]
    EmptyId,
    #[error("User ID {0:?} may only contain letters and digits.")]
    InvalidId(String),
    #[error("Name and surname are required.")]
    EmptyName,
    #[error("{0:?} is not a valid email address.")]
    InvalidEmail(String),
    #[error("A user with ID {0} is already registered.")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A patron record. The ID is the unique key. The number of lendings a user
/// currently holds is derived from the LendingSet rather than stored here, so
/// it can never drift out of sync.
pub struct User {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub email: String,
}

impl User {
    /// Validate the fields and build a new patron record.
    pub fn new(id: &str, name: &str, surname: &str, email: &str) -> Result<Self, UserDataError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(UserDataError::EmptyId);
        }
        if !is_valid_id(id) {
            return Err(UserDataError::InvalidId(id.to_string()));
        }

        let name = name.trim();
        let surname = surname.trim();
        if name.is_empty() || surname.is_empty() {
            return Err(UserDataError::EmptyName);
        }

        let email = email.trim();
        if !is_valid_email(email) {
            return Err(UserDataError::InvalidEmail(email.to_string()));
        }

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            surname: surname.to_string(),
            email: email.to_string(),
        })
    }

    /// "Name Surname" as shown in list rows and lending details.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.full_name(), self.id)
    }
}

impl Record for User {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn to_record_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.id,
            self.name,
            self.surname,
            self.email,
            sep = FIELD_SEPARATOR,
        )
    }

    fn from_record_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != 4 {
            bail!("malformed user record: expected 4 fields, found {}", fields.len());
        }

        Ok(Self {
            id: fields[0].to_string(),
            name: fields[1].to_string(),
            surname: fields[2].to_string(),
            email: fields[3].to_string(),
        })
    }

    fn searchable_text(&self) -> String {
        format!("{} {} {} {}", self.id, self.name, self.surname, self.email).to_lowercase()
    }
}

/// A user ID is non-empty ASCII letters and digits.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|ch| ch.is_ascii_alphanumeric())
}

/// Minimal email shape check: one `@`, non-empty local part, and a domain
/// containing a dot that is neither leading nor trailing.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        assert!(is_valid_id("ab12"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("ab 12"));
        assert!(!is_valid_id("ab-12"));
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ada@example.org"));
        assert!(!is_valid_email("ada"));
        assert!(!is_valid_email("@example.org"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@.org"));
        assert!(!is_valid_email("ada@example."));
        assert!(!is_valid_email("ada lovelace@example.org"));
    }

    #[test]
    fn new_user_validates_fields() {
        assert_eq!(User::new("", "Ada", "Lovelace", "ada@example.org"), Err(UserDataError::EmptyId));
        assert_eq!(
            User::new("u-1", "Ada", "Lovelace", "ada@example.org"),
            Err(UserDataError::InvalidId("u-1".to_string()))
        );
        assert_eq!(User::new("u1", "", "Lovelace", "ada@example.org"), Err(UserDataError::EmptyName));
        assert_eq!(
            User::new("u1", "Ada", "Lovelace", "ada"),
            Err(UserDataError::InvalidEmail("ada".to_string()))
        );
    }

    #[test]
    fn record_line_round_trips() {
        let user = User::new("u1", "Ada", "Lovelace", "ada@example.org").unwrap();
        let parsed = User::from_record_line(&user.to_record_line()).unwrap();
        assert_eq!(parsed, user);
    }
}
