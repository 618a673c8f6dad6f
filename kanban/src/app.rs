//! Application state and event handling.
//!
//! [`App`] turns key presses into [`SyncCommand`]s for the background
//! worker and applies the [`SyncEvent`]s it reports. It never waits for a
//! remote call: the board only changes when an event comes back.

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use kanban_proto::task::{Task, TaskId, TaskStatus, normalize_title};

use crate::board::{Board, Mutation};
use crate::sync::{SyncCommand, SyncEvent};

/// Which part of the screen receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// The "Add task" input box (default).
    Input,
    /// One of the three columns.
    Column(TaskStatus),
}

impl Focus {
    /// Input -> To Do -> In Progress -> Done -> Input.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Input => Self::Column(TaskStatus::ToDo),
            Self::Column(TaskStatus::ToDo) => Self::Column(TaskStatus::InProgress),
            Self::Column(TaskStatus::InProgress) => Self::Column(TaskStatus::Done),
            Self::Column(TaskStatus::Done) => Self::Input,
        }
    }

    /// Reverse of [`Focus::next`].
    #[must_use]
    pub const fn prev(self) -> Self {
        match self {
            Self::Input => Self::Column(TaskStatus::Done),
            Self::Column(TaskStatus::Done) => Self::Column(TaskStatus::InProgress),
            Self::Column(TaskStatus::InProgress) => Self::Column(TaskStatus::ToDo),
            Self::Column(TaskStatus::ToDo) => Self::Input,
        }
    }
}

/// Main application state.
pub struct App {
    /// Local mirror of the collection.
    pub board: Board,
    /// Text in the "Add task" box.
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Title of the create waiting for confirmation; the input is cleared
    /// once it is applied.
    pending_create: Option<String>,
    /// Which part of the screen is focused.
    pub focus: Focus,
    /// Selected row per column, in [`TaskStatus::ALL`] order.
    selected: [usize; 3],
    /// Id of the task picked up for a drag, if any.
    pub carrying: Option<TaskId>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Whether snapshots are still arriving.
    pub is_connected: bool,
    /// Where the board is synced to, for the status bar.
    pub connection_info: String,
    /// When the last snapshot was applied.
    pub last_snapshot: Option<DateTime<Local>>,
}

impl App {
    /// Create an empty board with the input focused.
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            input: String::new(),
            cursor_position: 0,
            pending_create: None,
            focus: Focus::Input,
            selected: [0; 3],
            carrying: None,
            should_quit: false,
            is_connected: false,
            connection_info: String::new(),
            last_snapshot: None,
        }
    }

    /// Records the connection description shown in the status bar.
    pub fn set_connection(&mut self, connected: bool, info: impl Into<String>) {
        self.is_connected = connected;
        self.connection_info = info.into();
    }

    /// Selected row in a column.
    #[must_use]
    pub const fn selected_index(&self, status: TaskStatus) -> usize {
        self.selected[status.index()]
    }

    /// Task under the cursor in a column.
    #[must_use]
    pub fn selected_task(&self, status: TaskStatus) -> Option<&Task> {
        self.board
            .column(status)
            .get(self.selected_index(status))
            .copied()
    }

    /// Applies an outcome reported by the sync worker.
    pub fn apply_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Snapshot(tasks) => {
                self.board.apply_snapshot(tasks);
                self.last_snapshot = Some(Local::now());
                self.is_connected = true;
            }
            SyncEvent::Applied(mutation) => {
                if let Mutation::Created(task) = &mutation {
                    self.confirm_create(&task.title);
                }
                self.board.apply(mutation);
            }
            SyncEvent::Disconnected => {
                self.is_connected = false;
            }
        }
        self.clamp_selection();
    }

    /// Handle a key event, returning the remote call it asks for.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return None;
        }

        if self.board.editing().is_some() {
            return self.handle_edit_key(key);
        }

        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) => {
                if self.carrying.take().is_none() {
                    self.should_quit = true;
                }
                return None;
            }
            (KeyCode::Tab, KeyModifiers::SHIFT) | (KeyCode::BackTab, _) => {
                self.focus = self.focus.prev();
                return None;
            }
            (KeyCode::Tab, _) => {
                self.focus = self.focus.next();
                return None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Input => self.handle_input_key(key),
            Focus::Column(status) => self.handle_column_key(status, key),
        }
    }

    /// Keys while a task title is being edited.
    fn handle_edit_key(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        match key.code {
            KeyCode::Enter => {
                // Edit mode ends when the rename comes back applied.
                let edit = self.board.editing()?;
                return Some(SyncCommand::Rename {
                    id: edit.id.clone(),
                    title: edit.draft.clone(),
                });
            }
            KeyCode::Esc => self.board.cancel_edit(),
            KeyCode::Backspace => {
                if let Some(draft) = self.board.edit_draft_mut() {
                    draft.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(draft) = self.board.edit_draft_mut() {
                    draft.push(c);
                }
            }
            _ => {}
        }
        None
    }

    /// Handle key event when input is focused.
    fn handle_input_key(&mut self, key: KeyEvent) -> Option<SyncCommand> {
        match key.code {
            KeyCode::Enter => return self.submit_input(),
            KeyCode::Char(c) => self.enter_char(c),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.cursor_position = self.cursor_position.saturating_sub(1),
            KeyCode::Right => {
                if self.cursor_position < self.input.chars().count() {
                    self.cursor_position += 1;
                }
            }
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.input.chars().count(),
            _ => {}
        }
        None
    }

    /// Handle key event when a column is focused.
    fn handle_column_key(&mut self, status: TaskStatus, key: KeyEvent) -> Option<SyncCommand> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                let row = &mut self.selected[status.index()];
                *row = row.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_index(status) + 1 < self.board.column(status).len() {
                    self.selected[status.index()] += 1;
                }
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.focus = Focus::Column(column_left(status));
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.focus = Focus::Column(column_right(status));
            }
            KeyCode::Char('e') => {
                if let Some(id) = self.selected_task(status).map(|t| t.id.clone()) {
                    self.board.begin_edit(&id);
                }
            }
            KeyCode::Char('d') => {
                let id = self.selected_task(status)?.id.clone();
                return Some(SyncCommand::Delete { id });
            }
            KeyCode::Char(' ') => {
                if self.carrying.is_some() {
                    return self.drop_on(status);
                }
                self.carrying = self.selected_task(status).map(|t| t.id.clone());
            }
            KeyCode::Enter if self.carrying.is_some() => return self.drop_on(status),
            _ => {}
        }
        None
    }

    /// Ends a drag over a column.
    ///
    /// A payload whose task has disappeared is discarded without a command.
    fn drop_on(&mut self, status: TaskStatus) -> Option<SyncCommand> {
        let id = self.carrying.take()?;
        if self.board.get(&id).is_none() {
            tracing::debug!(task_id = %id, "dropped task is not on the board");
            return None;
        }
        Some(SyncCommand::Move { id, status })
    }

    /// Dispatches the input as a new task.
    ///
    /// The text stays in the box until the create is confirmed, so a failed
    /// create can be retried.
    fn submit_input(&mut self) -> Option<SyncCommand> {
        let title = normalize_title(&self.input)?.to_string();
        self.pending_create = Some(title.clone());
        Some(SyncCommand::Create { title })
    }

    /// Clears the input once the create it submitted is applied, unless the
    /// user has typed something else since.
    fn confirm_create(&mut self, title: &str) {
        if self.pending_create.as_deref() != Some(title) {
            return;
        }
        self.pending_create = None;
        if normalize_title(&self.input) == Some(title) {
            self.input.clear();
            self.cursor_position = 0;
        }
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        let at = self.byte_index();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn clamp_selection(&mut self) {
        for status in TaskStatus::ALL {
            let len = self.board.column(status).len();
            let row = &mut self.selected[status.index()];
            *row = (*row).min(len.saturating_sub(1));
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

const fn column_left(status: TaskStatus) -> TaskStatus {
    match status {
        TaskStatus::ToDo | TaskStatus::InProgress => TaskStatus::ToDo,
        TaskStatus::Done => TaskStatus::InProgress,
    }
}

const fn column_right(status: TaskStatus) -> TaskStatus {
    match status {
        TaskStatus::ToDo => TaskStatus::InProgress,
        TaskStatus::InProgress | TaskStatus::Done => TaskStatus::Done,
    }
}
