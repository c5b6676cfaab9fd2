//! Ratatui front end: one list tab per entity, modal forms for editing a
//! single record, confirm dialogs for the destructive actions, and the
//! backup/restore picker. The `App` owns the aggregate model and all screen
//! state; `terminal` drives the crossterm event loop.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
