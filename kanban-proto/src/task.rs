//! Task model shared by the board, the store clients and the store server.
//!
//! A task document is stored remotely as `{title, status}` and keyed by an
//! identifier the store assigns. [`Task`] is the local record: the identifier
//! merged with the stored fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Store-assigned task identifier.
///
/// Opaque to clients: it is only compared, displayed and sent back to the
/// store. The reference store hands out UUID v7 strings, so ordering by id
/// is ordering by creation time there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an identifier string received from (or minted by) the store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a task, which is also the column it is shown in.
///
/// The set is closed and any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started. Every new task begins here.
    #[default]
    #[serde(rename = "To Do")]
    ToDo,
    /// Being worked on.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Finished.
    #[serde(rename = "Done")]
    Done,
}

impl TaskStatus {
    /// All statuses in column order (left to right).
    pub const ALL: [Self; 3] = [Self::ToDo, Self::InProgress, Self::Done];

    /// The label stored in documents and shown as the column title.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }

    /// Position of this status in [`TaskStatus::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::ToDo => 0,
            Self::InProgress => 1,
            Self::Done => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a string is not one of the three status labels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// The stored body of a task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    /// Task title.
    pub title: String,
    /// Task status.
    pub status: TaskStatus,
}

impl TaskFields {
    /// Fields for a freshly created task: the given title, status `To Do`.
    pub fn new_task(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TaskStatus::ToDo,
        }
    }

    /// Applies a single-field patch in place.
    pub fn apply(&mut self, patch: &TaskPatch) {
        match patch {
            TaskPatch::Title(title) => self.title.clone_from(title),
            TaskPatch::Status(status) => self.status = *status,
        }
    }

    /// Joins these fields with their identifier into a [`Task`].
    #[must_use]
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            title: self.title,
            status: self.status,
        }
    }
}

/// A task record as held in local state: identifier plus stored fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Task title.
    pub title: String,
    /// Task status (column).
    pub status: TaskStatus,
}

/// A partial update touching exactly one field of a task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPatch {
    /// Replace the title.
    Title(String),
    /// Replace the status.
    Status(TaskStatus),
}

/// Validates user input for a title.
///
/// Returns the input with surrounding whitespace removed, or `None` when
/// nothing is left.
#[must_use]
pub fn normalize_title(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
