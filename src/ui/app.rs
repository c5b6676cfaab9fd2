use std::mem;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::library::Library;

use super::forms::{
    BookField, BookForm, ConfirmBookDelete, ConfirmLendingDelete, ConfirmRestore, ConfirmReturn,
    ConfirmUserDelete, DueDateForm, LendField, LendForm, UserField, UserForm,
};
use super::helpers::{centered_rect, fit_width, surface_error};
use super::screens::{
    book_rows, lending_rows, user_rows, BackupPicker, BookTab, LendingTab, UserTab,
};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;

/// The three top-level tabs, one per entity.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Screen {
    Books,
    Users,
    Lendings,
}

impl Screen {
    fn next(self) -> Self {
        match self {
            Screen::Books => Screen::Users,
            Screen::Users => Screen::Lendings,
            Screen::Lendings => Screen::Books,
        }
    }

    fn previous(self) -> Self {
        match self {
            Screen::Books => Screen::Lendings,
            Screen::Users => Screen::Books,
            Screen::Lendings => Screen::Users,
        }
    }
}

/// Fine-grained modes layered over the current tab. Keeping every dialog as
/// an explicit variant makes it easy to reason about which rendering path
/// runs and what the keyboard should do.
enum Mode {
    Normal,
    AddingBook(BookForm),
    EditingBook { isbn: String, form: BookForm },
    ConfirmBookDelete(ConfirmBookDelete),
    AddingUser(UserForm),
    EditingUser { id: String, form: UserForm },
    ConfirmUserDelete(ConfirmUserDelete),
    LendingBook { isbn: String, title: String, form: LendForm },
    EditingDueDate { id: u64, form: DueDateForm },
    ConfirmReturn(ConfirmReturn),
    ConfirmLendingDelete(ConfirmLendingDelete),
    Searching(SearchState),
    PickingBackup(BackupPicker),
    ConfirmRestore(ConfirmRestore),
}

/// State for an active inline search. The filter applies live to the tab the
/// search was opened on.
struct SearchState {
    query: String,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    library: Library,
    screen: Screen,
    mode: Mode,
    books_tab: BookTab,
    users_tab: UserTab,
    lendings_tab: LendingTab,
    /// When set, the lendings tab hides returned records.
    show_only_open: bool,
    status: Option<StatusMessage>,
}

impl App {
    pub fn new(library: Library) -> Self {
        let mut app = Self {
            library,
            screen: Screen::Books,
            mode: Mode::Normal,
            books_tab: BookTab::new(),
            users_tab: UserTab::new(),
            lendings_tab: LendingTab::new(),
            show_only_open: false,
            status: None,
        };
        app.refresh_all();
        app
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // ------------------------------------------------------------------
    // Tab refresh
    // ------------------------------------------------------------------

    fn refresh_books(&mut self) {
        let filter = self.books_tab.filter.clone();
        let rows = book_rows(&self.library, filter.as_deref());
        self.books_tab.set_rows(rows);
    }

    fn refresh_users(&mut self) {
        let filter = self.users_tab.filter.clone();
        let rows = user_rows(&self.library, filter.as_deref());
        self.users_tab.set_rows(rows);
    }

    fn refresh_lendings(&mut self) {
        let filter = self.lendings_tab.filter.clone();
        let rows = lending_rows(&self.library, filter.as_deref(), self.show_only_open);
        self.lendings_tab.set_rows(rows);
    }

    /// Recompute every tab. Mutations run through the Library, so any of the
    /// three views may be stale afterwards.
    fn refresh_all(&mut self) {
        self.refresh_books();
        self.refresh_users();
        self.refresh_lendings();
    }

    /// Replace the active tab's omnisearch filter and recompute its rows.
    fn set_active_filter(&mut self, filter: Option<String>) {
        match self.screen {
            Screen::Books => {
                self.books_tab.filter = filter;
                self.refresh_books();
            }
            Screen::Users => {
                self.users_tab.filter = filter;
                self.refresh_users();
            }
            Screen::Lendings => {
                self.lendings_tab.filter = filter;
                self.refresh_lendings();
            }
        }
    }

    fn active_filter(&self) -> Option<&String> {
        match self.screen {
            Screen::Books => self.books_tab.filter.as_ref(),
            Screen::Users => self.users_tab.filter.as_ref(),
            Screen::Lendings => self.lendings_tab.filter.as_ref(),
        }
    }

    // ------------------------------------------------------------------
    // Status footer
    // ------------------------------------------------------------------

    fn set_status(&mut self, text: impl Into<String>, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    // ------------------------------------------------------------------
    // Key handling
    // ------------------------------------------------------------------

    /// Dispatch one key press. Returns `true` when the application should
    /// exit.
    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mut mode = mem::replace(&mut self.mode, Mode::Normal);

        mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::AddingBook(form) => self.handle_book_form(code, None, form)?,
            Mode::EditingBook { isbn, form } => self.handle_book_form(code, Some(isbn), form)?,
            Mode::ConfirmBookDelete(confirm) => self.handle_confirm_book_delete(code, confirm)?,
            Mode::AddingUser(form) => self.handle_user_form(code, None, form)?,
            Mode::EditingUser { id, form } => self.handle_user_form(code, Some(id), form)?,
            Mode::ConfirmUserDelete(confirm) => self.handle_confirm_user_delete(code, confirm)?,
            Mode::LendingBook { isbn, title, form } => {
                self.handle_lend_form(code, isbn, title, form)?
            }
            Mode::EditingDueDate { id, form } => self.handle_due_date_form(code, id, form)?,
            Mode::ConfirmReturn(confirm) => self.handle_confirm_return(code, confirm)?,
            Mode::ConfirmLendingDelete(confirm) => {
                self.handle_confirm_lending_delete(code, confirm)?
            }
            Mode::Searching(state) => self.handle_search(code, state),
            Mode::PickingBackup(picker) => self.handle_backup_picker(code, picker),
            Mode::ConfirmRestore(confirm) => self.handle_confirm_restore(code, confirm)?,
        };

        self.mode = mode;
        Ok(exit)
    }

    /// Create a backup right away. Bound to Ctrl-B in the event loop.
    pub fn handle_backup_request(&mut self) -> Result<()> {
        match self.library.create_backup() {
            Ok(dir) => {
                let label = BackupPicker::label(&dir);
                self.set_status(format!("Backup {label} created."), StatusKind::Info);
            }
            Err(err) => {
                self.set_status(
                    format!("Backup failed: {}", surface_error(&err)),
                    StatusKind::Error,
                );
            }
        }
        Ok(())
    }

    /// Open the restore picker. Bound to Ctrl-R in the event loop.
    pub fn handle_restore_request(&mut self) -> Result<()> {
        let picker = BackupPicker::load(&self.library)?;
        if picker.entries.is_empty() {
            self.set_status("No backups yet. Press Ctrl-B to create one.", StatusKind::Error);
        } else {
            self.clear_status();
            self.mode = Mode::PickingBackup(picker);
        }
        Ok(())
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        // Keys every tab shares.
        match code {
            KeyCode::Char('q') => {
                *exit = true;
                return Ok(Mode::Normal);
            }
            KeyCode::Tab => {
                self.screen = self.screen.next();
                self.clear_status();
                return Ok(Mode::Normal);
            }
            KeyCode::BackTab => {
                self.screen = self.screen.previous();
                self.clear_status();
                return Ok(Mode::Normal);
            }
            KeyCode::Char('f') => {
                let query = self.active_filter().cloned().unwrap_or_default();
                return Ok(Mode::Searching(SearchState { query }));
            }
            KeyCode::Esc => {
                if self.active_filter().is_some() {
                    self.set_active_filter(None);
                } else {
                    self.clear_status();
                }
                return Ok(Mode::Normal);
            }
            _ => {}
        }

        match self.screen {
            Screen::Books => self.handle_books_key(code),
            Screen::Users => self.handle_users_key(code),
            Screen::Lendings => self.handle_lendings_key(code),
        }
    }

    fn handle_books_key(&mut self, code: KeyCode) -> Result<Mode> {
        match code {
            KeyCode::Up => self.books_tab.move_selection(-1),
            KeyCode::Down => self.books_tab.move_selection(1),
            KeyCode::PageUp => self.books_tab.move_selection(-5),
            KeyCode::PageDown => self.books_tab.move_selection(5),
            KeyCode::Home => self.books_tab.select_first(),
            KeyCode::End => self.books_tab.select_last(),
            KeyCode::Char('+') => {
                self.clear_status();
                return Ok(Mode::AddingBook(BookForm::default()));
            }
            KeyCode::Char('e') | KeyCode::Char('E') => {
                if let Some(row) = self.books_tab.current() {
                    let isbn = row.book.isbn.clone();
                    let form = BookForm::from_book(&row.book);
                    self.clear_status();
                    return Ok(Mode::EditingBook { isbn, form });
                }
                self.set_status("No book selected to edit.", StatusKind::Error);
            }
            KeyCode::Char('-') => {
                if let Some(row) = self.books_tab.current() {
                    let confirm = ConfirmBookDelete::from(&row.book);
                    self.clear_status();
                    return Ok(Mode::ConfirmBookDelete(confirm));
                }
                self.set_status("No book selected to remove.", StatusKind::Error);
            }
            KeyCode::Char('l') | KeyCode::Char('L') => {
                if let Some(row) = self.books_tab.current() {
                    if let Some(holder) = &row.lent_to {
                        self.set_status(
                            format!("Already lent to {holder}."),
                            StatusKind::Error,
                        );
                    } else {
                        let isbn = row.book.isbn.clone();
                        let title = row.book.title.clone();
                        self.clear_status();
                        return Ok(Mode::LendingBook {
                            isbn,
                            title,
                            form: LendForm::new(Self::today()),
                        });
                    }
                } else {
                    self.set_status("No book selected to lend.", StatusKind::Error);
                }
            }
            KeyCode::Enter => {
                // Jump to the open lending of the selected book, if any.
                if let Some(row) = self.books_tab.current() {
                    let isbn = row.book.isbn.clone();
                    match self.library.lendings.active_for_book(&isbn) {
                        Some(lending) => {
                            let id = lending.id;
                            self.screen = Screen::Lendings;
                            self.refresh_lendings();
                            self.lendings_tab.select_where(|r| r.lending.id == id);
                            self.clear_status();
                        }
                        None => {
                            self.set_status("This book is available.", StatusKind::Info);
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_users_key(&mut self, code: KeyCode) -> Result<Mode> {
        match code {
            KeyCode::Up => self.users_tab.move_selection(-1),
            KeyCode::Down => self.users_tab.move_selection(1),
            KeyCode::PageUp => self.users_tab.move_selection(-5),
            KeyCode::PageDown => self.users_tab.move_selection(5),
            KeyCode::Home => self.users_tab.select_first(),
            KeyCode::End => self.users_tab.select_last(),
            KeyCode::Char('+') => {
                self.clear_status();
                return Ok(Mode::AddingUser(UserForm::default()));
            }
            KeyCode::Char('e') | KeyCode::Char('E') => {
                if let Some(row) = self.users_tab.current() {
                    let id = row.user.id.clone();
                    let form = UserForm::from_user(&row.user);
                    self.clear_status();
                    return Ok(Mode::EditingUser { id, form });
                }
                self.set_status("No user selected to edit.", StatusKind::Error);
            }
            KeyCode::Char('-') => {
                if let Some(row) = self.users_tab.current() {
                    let confirm = ConfirmUserDelete::from(&row.user);
                    self.clear_status();
                    return Ok(Mode::ConfirmUserDelete(confirm));
                }
                self.set_status("No user selected to remove.", StatusKind::Error);
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_lendings_key(&mut self, code: KeyCode) -> Result<Mode> {
        match code {
            KeyCode::Up => self.lendings_tab.move_selection(-1),
            KeyCode::Down => self.lendings_tab.move_selection(1),
            KeyCode::PageUp => self.lendings_tab.move_selection(-5),
            KeyCode::PageDown => self.lendings_tab.move_selection(5),
            KeyCode::Home => self.lendings_tab.select_first(),
            KeyCode::End => self.lendings_tab.select_last(),
            KeyCode::Char('o') | KeyCode::Char('O') => {
                self.show_only_open = !self.show_only_open;
                self.refresh_lendings();
                let message = if self.show_only_open {
                    "Showing only open lendings."
                } else {
                    "Showing all lendings."
                };
                self.set_status(message, StatusKind::Info);
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                if let Some(row) = self.lendings_tab.current() {
                    if row.lending.returned {
                        self.set_status("This lending is already returned.", StatusKind::Error);
                    } else {
                        let confirm = ConfirmReturn {
                            id: row.lending.id,
                            summary: row.summary(),
                        };
                        self.clear_status();
                        return Ok(Mode::ConfirmReturn(confirm));
                    }
                } else {
                    self.set_status("No lending selected.", StatusKind::Error);
                }
            }
            KeyCode::Char('e') | KeyCode::Char('E') => {
                if let Some(row) = self.lendings_tab.current() {
                    if row.lending.returned {
                        self.set_status(
                            "Returned lendings cannot be rescheduled.",
                            StatusKind::Error,
                        );
                    } else {
                        let id = row.lending.id;
                        let form = DueDateForm::from_lending(&row.lending);
                        self.clear_status();
                        return Ok(Mode::EditingDueDate { id, form });
                    }
                } else {
                    self.set_status("No lending selected.", StatusKind::Error);
                }
            }
            KeyCode::Char('-') => {
                if let Some(row) = self.lendings_tab.current() {
                    if row.lending.returned {
                        let confirm = ConfirmLendingDelete {
                            id: row.lending.id,
                            summary: row.summary(),
                        };
                        self.clear_status();
                        return Ok(Mode::ConfirmLendingDelete(confirm));
                    }
                    self.set_status(
                        "Open lendings cannot be deleted; mark the return first.",
                        StatusKind::Error,
                    );
                } else {
                    self.set_status("No lending selected.", StatusKind::Error);
                }
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    // ------------------------------------------------------------------
    // Form handlers
    // ------------------------------------------------------------------

    fn handle_book_form(
        &mut self,
        code: KeyCode,
        original_isbn: Option<String>,
        mut form: BookForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match form.parse() {
                Ok(book) => {
                    let isbn = book.isbn.clone();
                    match self.library.save_book(book, original_isbn.as_deref()) {
                        Ok(()) => {
                            self.refresh_all();
                            self.books_tab.select_where(|row| row.book.isbn == isbn);
                            self.set_status("Book saved.", StatusKind::Info);
                            return Ok(Mode::Normal);
                        }
                        Err(err) => form.error = Some(surface_error(&err)),
                    }
                }
                Err(err) => form.error = Some(err.to_string()),
            },
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            _ => {}
        }

        Ok(match original_isbn {
            None => Mode::AddingBook(form),
            Some(isbn) => Mode::EditingBook { isbn, form },
        })
    }

    fn handle_confirm_book_delete(
        &mut self,
        code: KeyCode,
        confirm: ConfirmBookDelete,
    ) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.library.delete_book(&confirm.isbn) {
                    Ok(()) => {
                        self.refresh_all();
                        self.set_status(
                            format!("Deleted \"{}\".", confirm.title),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.set_status(surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmBookDelete(confirm)),
        }
    }

    fn handle_user_form(
        &mut self,
        code: KeyCode,
        original_id: Option<String>,
        mut form: UserForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match form.parse() {
                Ok(user) => {
                    let id = user.id.clone();
                    match self.library.save_user(user, original_id.as_deref()) {
                        Ok(()) => {
                            self.refresh_all();
                            self.users_tab.select_where(|row| row.user.id == id);
                            self.set_status("User saved.", StatusKind::Info);
                            return Ok(Mode::Normal);
                        }
                        Err(err) => form.error = Some(surface_error(&err)),
                    }
                }
                Err(err) => form.error = Some(err.to_string()),
            },
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            _ => {}
        }

        Ok(match original_id {
            None => Mode::AddingUser(form),
            Some(id) => Mode::EditingUser { id, form },
        })
    }

    fn handle_confirm_user_delete(
        &mut self,
        code: KeyCode,
        confirm: ConfirmUserDelete,
    ) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.library.delete_user(&confirm.id) {
                    Ok(()) => {
                        self.refresh_all();
                        self.set_status(
                            format!("Deleted {}.", confirm.full_name),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.set_status(surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmUserDelete(confirm)),
        }
    }

    fn handle_lend_form(
        &mut self,
        code: KeyCode,
        isbn: String,
        title: String,
        mut form: LendForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab | KeyCode::Down | KeyCode::Up => form.toggle_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match form.parse_inputs() {
                Ok((user_id, return_date)) => {
                    match self
                        .library
                        .lend_book(&isbn, &user_id, return_date, Self::today())
                    {
                        Ok(lending) => {
                            self.refresh_all();
                            self.set_status(
                                format!("Lent \"{title}\" to {user_id} until {}.", lending.return_date),
                                StatusKind::Info,
                            );
                            return Ok(Mode::Normal);
                        }
                        Err(err) => form.error = Some(surface_error(&err)),
                    }
                }
                Err(err) => form.error = Some(surface_error(&err)),
            },
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            _ => {}
        }

        Ok(Mode::LendingBook { isbn, title, form })
    }

    fn handle_due_date_form(&mut self, code: KeyCode, id: u64, mut form: DueDateForm) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match form.parse_input() {
                Ok(return_date) => {
                    match self.library.reschedule_lending(id, return_date, Self::today()) {
                        Ok(lending) => {
                            self.refresh_lendings();
                            self.set_status(
                                format!("Return date moved to {}.", lending.return_date),
                                StatusKind::Info,
                            );
                            return Ok(Mode::Normal);
                        }
                        Err(err) => form.error = Some(surface_error(&err)),
                    }
                }
                Err(err) => form.error = Some(surface_error(&err)),
            },
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            _ => {}
        }

        Ok(Mode::EditingDueDate { id, form })
    }

    fn handle_confirm_return(&mut self, code: KeyCode, confirm: ConfirmReturn) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.library.return_lending(confirm.id) {
                    Ok(_) => {
                        self.refresh_all();
                        self.set_status(
                            format!("Returned: {}.", confirm.summary),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.set_status(surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmReturn(confirm)),
        }
    }

    fn handle_confirm_lending_delete(
        &mut self,
        code: KeyCode,
        confirm: ConfirmLendingDelete,
    ) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.library.delete_lending(confirm.id) {
                    Ok(()) => {
                        self.refresh_lendings();
                        self.set_status(
                            format!("Deleted lending record #{}.", confirm.id),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.set_status(surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmLendingDelete(confirm)),
        }
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Mode {
        match code {
            KeyCode::Esc => {
                self.set_active_filter(None);
                return Mode::Normal;
            }
            KeyCode::Enter => {
                let query = state.query.trim().to_string();
                if query.is_empty() {
                    self.set_active_filter(None);
                } else {
                    self.set_active_filter(Some(query));
                }
                return Mode::Normal;
            }
            KeyCode::Backspace => {
                state.query.pop();
                self.set_active_filter(Some(state.query.clone()));
            }
            KeyCode::Char(ch) => {
                if !ch.is_control() {
                    state.query.push(ch);
                    self.set_active_filter(Some(state.query.clone()));
                }
            }
            _ => {}
        }
        Mode::Searching(state)
    }

    fn handle_backup_picker(&mut self, code: KeyCode, mut picker: BackupPicker) -> Mode {
        match code {
            KeyCode::Esc => return Mode::Normal,
            KeyCode::Up => picker.move_selection(-1),
            KeyCode::Down => picker.move_selection(1),
            KeyCode::Enter => {
                if let Some(dir) = picker.current() {
                    return Mode::ConfirmRestore(ConfirmRestore {
                        dir: dir.clone(),
                        label: BackupPicker::label(dir),
                    });
                }
            }
            _ => {}
        }
        Mode::PickingBackup(picker)
    }

    fn handle_confirm_restore(&mut self, code: KeyCode, confirm: ConfirmRestore) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.library.restore_backup(&confirm.dir) {
                    Ok(()) => {
                        self.refresh_all();
                        self.set_status(
                            format!("Restored backup {}.", confirm.label),
                            StatusKind::Info,
                        );
                    }
                    Err(err) => {
                        self.set_status(
                            format!("Restore failed: {}", surface_error(&err)),
                            StatusKind::Error,
                        );
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmRestore(confirm)),
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(frame.area());

        self.draw_tab_bar(frame, chunks[0]);
        match self.screen {
            Screen::Books => self.draw_books(frame, chunks[1]),
            Screen::Users => self.draw_users(frame, chunks[1]),
            Screen::Lendings => self.draw_lendings(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::Normal => {}
            Mode::AddingBook(form) => self.draw_book_form(frame, chunks[1], "Add Book", form),
            Mode::EditingBook { form, .. } => {
                self.draw_book_form(frame, chunks[1], "Edit Book", form)
            }
            Mode::ConfirmBookDelete(confirm) => self.draw_confirm(
                frame,
                chunks[1],
                "Delete Book",
                vec![
                    format!("Delete \"{}\"?", confirm.title),
                    format!("ISBN {}", confirm.isbn),
                ],
            ),
            Mode::AddingUser(form) => self.draw_user_form(frame, chunks[1], "Add User", form),
            Mode::EditingUser { form, .. } => {
                self.draw_user_form(frame, chunks[1], "Edit User", form)
            }
            Mode::ConfirmUserDelete(confirm) => self.draw_confirm(
                frame,
                chunks[1],
                "Delete User",
                vec![format!("Delete {} ({})?", confirm.full_name, confirm.id)],
            ),
            Mode::LendingBook { title, form, .. } => {
                self.draw_lend_form(frame, chunks[1], title, form)
            }
            Mode::EditingDueDate { form, .. } => self.draw_due_date_form(frame, chunks[1], form),
            Mode::ConfirmReturn(confirm) => self.draw_confirm(
                frame,
                chunks[1],
                "Mark as Returned",
                vec![format!("Return {}?", confirm.summary)],
            ),
            Mode::ConfirmLendingDelete(confirm) => self.draw_confirm(
                frame,
                chunks[1],
                "Delete Lending Record",
                vec![format!("Delete record #{} ({})?", confirm.id, confirm.summary)],
            ),
            Mode::Searching(state) => self.draw_search_bar(frame, chunks[1], state),
            Mode::PickingBackup(picker) => self.draw_backup_picker(frame, chunks[1], picker),
            Mode::ConfirmRestore(confirm) => self.draw_confirm(
                frame,
                chunks[1],
                "Restore Backup",
                vec![
                    format!("Restore backup {}?", confirm.label),
                    "Unsaved current records will be overwritten.".to_string(),
                ],
            ),
        }
    }

    fn draw_tab_bar(&self, frame: &mut Frame, area: Rect) {
        let tabs = [
            (Screen::Books, format!(" Books ({}) ", self.library.books.len())),
            (Screen::Users, format!(" Users ({}) ", self.library.users.len())),
            (
                Screen::Lendings,
                format!(" Lendings ({}) ", self.library.lendings.len()),
            ),
        ];

        let mut spans = Vec::new();
        for (screen, label) in tabs {
            let style = if screen == self.screen {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    /// Shared frame for the three tabs: a bordered block, a bold header row,
    /// and the visible slice of rows scrolled so the selection stays on
    /// screen.
    fn draw_rows(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: String,
        header: String,
        lines: Vec<Line<'static>>,
        selected: usize,
        empty_message: &str,
    ) {
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height < 2 {
            return;
        }

        if lines.is_empty() {
            let message = Paragraph::new(empty_message.to_string()).alignment(Alignment::Center);
            frame.render_widget(message, inner);
            return;
        }

        let header_area = Rect { height: 1, ..inner };
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                header,
                Style::default().add_modifier(Modifier::BOLD),
            ))),
            header_area,
        );

        let list_area = Rect {
            y: inner.y + 1,
            height: inner.height - 1,
            ..inner
        };
        let visible = list_area.height as usize;
        let scroll = selected.saturating_sub(visible.saturating_sub(1));
        let paragraph = Paragraph::new(lines).scroll((scroll as u16, 0));
        frame.render_widget(paragraph, list_area);
    }

    fn row_style(selected: bool) -> Style {
        if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }

    fn draw_books(&self, frame: &mut Frame, area: Rect) {
        let width = area.width.saturating_sub(2) as usize;
        let isbn_w = 15;
        let year_w = 5;
        let status_w = 18;
        let flex = width.saturating_sub(isbn_w + year_w + status_w + 8);
        let title_w = flex * 3 / 5;
        let authors_w = flex.saturating_sub(title_w);

        let header = format!(
            "  {} {} {} {} {}",
            fit_width("ISBN", isbn_w),
            fit_width("Title", title_w),
            fit_width("Authors", authors_w),
            fit_width("Year", year_w),
            fit_width("Status", status_w),
        );

        let lines: Vec<Line<'static>> = self
            .books_tab
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let selected = i == self.books_tab.selected;
                let marker = if selected { "> " } else { "  " };
                let status = match &row.lent_to {
                    Some(holder) => format!("Lent to {holder}"),
                    None => "Available".to_string(),
                };
                let text = format!(
                    "{marker}{} {} {} {} {}",
                    fit_width(&row.book.isbn, isbn_w),
                    fit_width(&row.book.title, title_w),
                    fit_width(&row.book.authors_string(), authors_w),
                    fit_width(&row.book.year.to_string(), year_w),
                    fit_width(&status, status_w),
                );
                let style = if !selected && row.lent_to.is_some() {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Self::row_style(selected)
                };
                Line::from(Span::styled(text, style))
            })
            .collect();

        let title = self.tab_title("Books", self.books_tab.has_filter());
        let empty = if self.books_tab.has_filter() {
            "No books match the current search."
        } else {
            "No books yet. Press '+' to add one."
        };
        self.draw_rows(frame, area, title, header, lines, self.books_tab.selected, empty);
    }

    fn draw_users(&self, frame: &mut Frame, area: Rect) {
        let width = area.width.saturating_sub(2) as usize;
        let id_w = 12;
        let open_w = 10;
        let flex = width.saturating_sub(id_w + open_w + 8);
        let name_w = flex / 2;
        let email_w = flex.saturating_sub(name_w);

        let header = format!(
            "  {} {} {} {}",
            fit_width("ID", id_w),
            fit_width("Name", name_w),
            fit_width("Email", email_w),
            fit_width("Borrowed", open_w),
        );

        let lines: Vec<Line<'static>> = self
            .users_tab
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let selected = i == self.users_tab.selected;
                let marker = if selected { "> " } else { "  " };
                let text = format!(
                    "{marker}{} {} {} {}",
                    fit_width(&row.user.id, id_w),
                    fit_width(&row.user.full_name(), name_w),
                    fit_width(&row.user.email, email_w),
                    fit_width(&row.open_lendings.to_string(), open_w),
                );
                Line::from(Span::styled(text, Self::row_style(selected)))
            })
            .collect();

        let title = self.tab_title("Users", self.users_tab.has_filter());
        let empty = if self.users_tab.has_filter() {
            "No users match the current search."
        } else {
            "No users yet. Press '+' to add one."
        };
        self.draw_rows(frame, area, title, header, lines, self.users_tab.selected, empty);
    }

    fn draw_lendings(&self, frame: &mut Frame, area: Rect) {
        let today = Self::today();
        let width = area.width.saturating_sub(2) as usize;
        let id_w = 5;
        let due_w = 11;
        let status_w = 9;
        let flex = width.saturating_sub(id_w + due_w + status_w + 8);
        let book_w = flex / 2;
        let user_w = flex.saturating_sub(book_w);

        let header = format!(
            "  {} {} {} {} {}",
            fit_width("ID", id_w),
            fit_width("Book", book_w),
            fit_width("User", user_w),
            fit_width("Due", due_w),
            fit_width("Status", status_w),
        );

        let lines: Vec<Line<'static>> = self
            .lendings_tab
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let selected = i == self.lendings_tab.selected;
                let marker = if selected { "> " } else { "  " };
                let text = format!(
                    "{marker}{} {} {} {} {}",
                    fit_width(&row.lending.id.to_string(), id_w),
                    fit_width(&row.book_title, book_w),
                    fit_width(&row.user_name, user_w),
                    fit_width(&row.lending.return_date.to_string(), due_w),
                    fit_width(row.status_label(today), status_w),
                );
                let style = if selected {
                    Self::row_style(true)
                } else if row.lending.is_overdue(today) {
                    Style::default().fg(Color::Red)
                } else if row.lending.returned {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(text, style))
            })
            .collect();

        let mut title = self.tab_title("Lendings", self.lendings_tab.has_filter());
        if self.show_only_open {
            title.push_str(" [open only]");
        }
        let empty = if self.lendings_tab.has_filter() {
            "No lendings match the current search."
        } else if self.show_only_open {
            "No open lendings."
        } else {
            "No lendings yet. Lend a book from the Books tab with 'l'."
        };
        self.draw_rows(
            frame,
            area,
            title,
            header,
            lines,
            self.lendings_tab.selected,
            empty,
        );
    }

    fn tab_title(&self, name: &str, filtered: bool) -> String {
        if filtered {
            format!("{name} [filtered]")
        } else {
            name.to_string()
        }
    }

    fn draw_book_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &BookForm) {
        let fields = [
            ("ISBN", BookField::Isbn),
            ("Title", BookField::Title),
            ("Authors (use ;)", BookField::Authors),
            ("Year", BookField::Year),
        ];
        let lines: Vec<Line<'static>> = fields
            .iter()
            .map(|(name, field)| form.build_line(name, *field))
            .collect();
        let cursor = fields
            .iter()
            .position(|(_, field)| *field == form.active)
            .map(|i| (i, fields[i].0.chars().count() + 2 + form.value_len(form.active)));
        self.draw_form(frame, area, title, lines, form.error.as_deref(), cursor);
    }

    fn draw_user_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &UserForm) {
        let fields = [
            ("ID", UserField::Id),
            ("Name", UserField::Name),
            ("Surname", UserField::Surname),
            ("Email", UserField::Email),
        ];
        let lines: Vec<Line<'static>> = fields
            .iter()
            .map(|(name, field)| form.build_line(name, *field))
            .collect();
        let cursor = fields
            .iter()
            .position(|(_, field)| *field == form.active)
            .map(|i| (i, fields[i].0.chars().count() + 2 + form.value_len(form.active)));
        self.draw_form(frame, area, title, lines, form.error.as_deref(), cursor);
    }

    fn draw_lend_form(&self, frame: &mut Frame, area: Rect, book_title: &str, form: &LendForm) {
        let lines = vec![
            Line::from(format!("Lend \"{book_title}\"")),
            Line::from(""),
            form.build_line("User ID", LendField::UserId),
            form.build_line("Return date", LendField::ReturnDate),
        ];
        let (line, label) = match form.active {
            LendField::UserId => (2, "User ID"),
            LendField::ReturnDate => (3, "Return date"),
        };
        let cursor = Some((line, label.chars().count() + 2 + form.value_len(form.active)));
        self.draw_form(frame, area, "Lend Book", lines, form.error.as_deref(), cursor);
    }

    fn draw_due_date_form(&self, frame: &mut Frame, area: Rect, form: &DueDateForm) {
        let lines = vec![form.build_line()];
        let cursor = Some((0, "Return date".chars().count() + 2 + form.value.chars().count()));
        self.draw_form(
            frame,
            area,
            "Reschedule Return",
            lines,
            form.error.as_deref(),
            cursor,
        );
    }

    /// Shared modal chrome: centered cleared rectangle, titled block, the
    /// form lines, the error at the bottom, and the cursor placed at the end
    /// of the active field.
    fn draw_form(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        mut lines: Vec<Line<'static>>,
        error: Option<&str>,
        cursor: Option<(usize, usize)>,
    ) {
        let popup = centered_rect(60, 50, area);
        frame.render_widget(Clear, popup);

        lines.push(Line::from(""));
        if let Some(error) = error {
            lines.push(Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red),
            )));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title.to_string());
        let inner = block.inner(popup);
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup);

        if let Some((line, column)) = cursor {
            if (line as u16) < inner.height && (column as u16) < inner.width {
                frame.set_cursor_position((inner.x + column as u16, inner.y + line as u16));
            }
        }
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, title: &str, messages: Vec<String>) {
        let popup = centered_rect(50, 30, area);
        frame.render_widget(Clear, popup);

        let mut lines: Vec<Line<'static>> = messages.into_iter().map(Line::from).collect();
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Cyan)),
            Span::raw(" Confirm   "),
            Span::styled("[n]", Style::default().fg(Color::Cyan)),
            Span::raw(" Cancel"),
        ]));

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title.to_string());
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Left);
        frame.render_widget(paragraph, popup);
    }

    fn draw_backup_picker(&self, frame: &mut Frame, area: Rect, picker: &BackupPicker) {
        let popup = centered_rect(50, 60, area);
        frame.render_widget(Clear, popup);

        let lines: Vec<Line<'static>> = picker
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let selected = i == picker.selected;
                let marker = if selected { "> " } else { "  " };
                Line::from(Span::styled(
                    format!("{marker}{}", BackupPicker::label(entry)),
                    Self::row_style(selected),
                ))
            })
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Restore Backup (newest first)");
        let visible = block.inner(popup).height as usize;
        let scroll = picker.selected.saturating_sub(visible.saturating_sub(1));
        let paragraph = Paragraph::new(lines).block(block).scroll((scroll as u16, 0));
        frame.render_widget(paragraph, popup);
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Search");
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();
        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match &self.mode {
            Mode::Normal => match self.screen {
                Screen::Books => &[
                    ("[+]", "Add"),
                    ("[e]", "Edit"),
                    ("[-]", "Delete"),
                    ("[l]", "Lend"),
                    ("[Enter]", "Open Lending"),
                    ("[f]", "Search"),
                    ("[Tab]", "Next Tab"),
                    ("[^B]", "Backup"),
                    ("[^R]", "Restore"),
                    ("[q]", "Quit"),
                ],
                Screen::Users => &[
                    ("[+]", "Add"),
                    ("[e]", "Edit"),
                    ("[-]", "Delete"),
                    ("[f]", "Search"),
                    ("[Tab]", "Next Tab"),
                    ("[^B]", "Backup"),
                    ("[^R]", "Restore"),
                    ("[q]", "Quit"),
                ],
                Screen::Lendings => &[
                    ("[r]", "Mark Returned"),
                    ("[e]", "Reschedule"),
                    ("[-]", "Delete"),
                    ("[o]", "Open Only"),
                    ("[f]", "Search"),
                    ("[Tab]", "Next Tab"),
                    ("[q]", "Quit"),
                ],
            },
            Mode::Searching(_) => &[
                ("[Enter]", "Keep Filter"),
                ("[Esc]", "Clear"),
            ],
            Mode::PickingBackup(_) => &[
                ("[Up/Down]", "Navigate"),
                ("[Enter]", "Restore"),
                ("[Esc]", "Cancel"),
            ],
            Mode::ConfirmBookDelete(_)
            | Mode::ConfirmUserDelete(_)
            | Mode::ConfirmReturn(_)
            | Mode::ConfirmLendingDelete(_)
            | Mode::ConfirmRestore(_) => &[("[y]", "Confirm"), ("[n]", "Cancel")],
            Mode::EditingDueDate { .. } => &[("[Enter]", "Save"), ("[Esc]", "Cancel")],
            _ => &[
                ("[Tab]", "Next Field"),
                ("[Enter]", "Save"),
                ("[Esc]", "Cancel"),
            ],
        };

        let mut spans = Vec::new();
        for (key, action) in keys {
            spans.push(Span::styled((*key).to_string(), key_style));
            spans.push(Span::raw(format!(" {action}   ")));
        }
        Line::from(spans)
    }
}
