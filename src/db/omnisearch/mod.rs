//! Trigram-based lookup layer over the record sets. The index maps character
//! trigrams to record keys; search counts per-key trigram hits and lets the
//! sets rank and resolve the winners.

mod index;
mod search;

pub use index::{generate_trigrams, TrigramIndex, TRIGRAM_LEN};
pub use search::{edit_distance, search, SearchHit};
