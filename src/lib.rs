//! Core library surface for the Library Lending Manager TUI application.
//!
//! The public modules exposed here provide an intentionally small API so the
//! `bin` target as well as potential external tooling can reuse the same
//! pieces: domain models, the persistence layer, the record sets, and the
//! interactive front end.
pub mod db;
pub mod library;
pub mod models;
pub mod sets;
pub mod ui;

/// The aggregate model the whole application works against.
pub use library::Library;

/// The domain types and their validation errors.
pub use models::{Book, BookDataError, Lending, LendingError, User, UserDataError};

/// The keyed collections the controllers read and mutate.
pub use sets::{BookSet, LendingSet, UserSet};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
