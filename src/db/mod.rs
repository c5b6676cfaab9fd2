//! Persistence module split across logical submodules: the line-oriented
//! record store, content hashing for change detection, restorable backups,
//! and the omnisearch index.

pub mod backup;
pub mod hash;
pub mod omnisearch;
mod record_file;

pub use backup::{create_backup, list_backups, restore_backup};
pub use hash::{hash_file, hash_lines};
pub use record_file::RecordFile;
