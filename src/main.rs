//! Binary entry point that glues the file-backed domain model to the TUI.
//! The bootstrapping pipeline is deliberately thin: resolve the data
//! directory, open the record sets, and drive the Ratatui event loop until
//! the user exits. No business logic lives here.
use library_lending_manager::{run_app, App, Library};

/// Initialize persistence, load the record sets, and launch the event loop.
///
/// Returning a `Result` bubbles up fatal initialization problems (for example
/// an unreadable data directory) to the terminal instead of crashing
/// silently.
fn main() -> anyhow::Result<()> {
    let data_dir = Library::default_data_dir()?;
    let library = Library::open(&data_dir)?;

    let mut app = App::new(library);
    run_app(&mut app)
}
