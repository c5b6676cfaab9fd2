//! Domain models and their validation rules. Each record type knows how to
//! validate itself, how to encode itself as a single line in its record file,
//! and which of its fields take part in search. Keeping persistence and
//! search details next to the data definitions means the collection layer can
//! stay generic over all three entities.

mod book;
mod lending;
mod user;

pub use book::{Book, BookDataError};
pub use lending::{Lending, LendingError};
pub use user::{User, UserDataError, MAX_ACTIVE_LENDINGS};

use std::fmt::Display;
use std::hash::Hash;

use anyhow::Result;

/// Separator between fields within a record line. An information separator
/// control character cannot appear in user input coming from the forms, so
/// records never need escaping.
pub(crate) const FIELD_SEPARATOR: char = '\u{1C}';

/// Behavior shared by every record type stored in a [`crate::sets::RecordSet`].
///
/// `Key` identifies a record uniquely within its set (ISBN for books, user id
/// for users, the numeric lending id for lendings). The line codec must
/// round-trip: `from_record_line(to_record_line(r)) == r`.
pub trait Record: Clone {
    type Key: Clone + Eq + Hash + Ord + Display;

    /// Unique identifier of this record within its set.
    fn key(&self) -> Self::Key;

    /// Encode the record as one line of its record file.
    fn to_record_line(&self) -> String;

    /// Decode a record from one line of its record file.
    fn from_record_line(line: &str) -> Result<Self>;

    /// Lowercased text the trigram index and substring fallback search over.
    fn searchable_text(&self) -> String;
}
