//! Board synchronization with the remote store.
//!
//! The functions in this module are the remote half of every user action:
//! each issues one remote call and, if it succeeds, returns the
//! [`Mutation`] to apply to the local [`crate::board::Board`]. A failed call
//! is logged and yields `None`; nothing is retried or rolled back, and the
//! next snapshot from the store is authoritative either way.
//!
//! Two drivers sit on top:
//! - [`Synchronizer`]: owns the board and the subscription, for callers
//!   that can await each operation
//! - [`spawn_sync`]: runs operations on background tasks and reports
//!   outcomes as [`SyncEvent`]s, for the terminal loop

pub mod synchronizer;
pub mod worker;

pub use synchronizer::Synchronizer;
pub use worker::{SyncCommand, SyncEvent, spawn_sync};

use kanban_proto::task::{TaskFields, TaskId, TaskPatch, TaskStatus, normalize_title};

use crate::board::Mutation;
use crate::remote::RemoteStore;

/// Inserts a new task in the first column.
///
/// Whitespace-only titles are rejected before any remote call. The stored
/// title is the trimmed input.
pub async fn create<S: RemoteStore>(store: &S, title: &str) -> Option<Mutation> {
    let title = normalize_title(title)?;
    let fields = TaskFields::new_task(title);

    match store.insert(&fields).await {
        Ok(id) => {
            tracing::debug!(collection = store.collection(), task_id = %id, "task created");
            Some(Mutation::Created(fields.into_task(id)))
        }
        Err(e) => {
            tracing::error!(collection = store.collection(), error = %e, "create failed");
            None
        }
    }
}

/// Changes a task's title. Whitespace-only titles are rejected locally.
pub async fn rename<S: RemoteStore>(store: &S, id: &TaskId, title: &str) -> Option<Mutation> {
    let title = normalize_title(title)?;
    let patch = TaskPatch::Title(title.to_string());

    match store.update(id, &patch).await {
        Ok(()) => Some(Mutation::Renamed {
            id: id.clone(),
            title: title.to_string(),
        }),
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "rename failed");
            None
        }
    }
}

/// Removes a task.
pub async fn delete<S: RemoteStore>(store: &S, id: &TaskId) -> Option<Mutation> {
    match store.delete(id).await {
        Ok(()) => Some(Mutation::Deleted { id: id.clone() }),
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "delete failed");
            None
        }
    }
}

/// Puts a task in another column.
///
/// The caller is responsible for checking that the task is on the board;
/// moving a task to the column it is already in still issues the update.
pub async fn move_task<S: RemoteStore>(
    store: &S,
    id: &TaskId,
    status: TaskStatus,
) -> Option<Mutation> {
    match store.update(id, &TaskPatch::Status(status)).await {
        Ok(()) => Some(Mutation::Moved {
            id: id.clone(),
            status,
        }),
        Err(e) => {
            tracing::error!(task_id = %id, status = %status, error = %e, "move failed");
            None
        }
    }
}
