//! Store, subscription and board bundled together.

use std::sync::Arc;

use kanban_proto::task::{TaskId, TaskStatus};

use crate::board::{Board, Mutation};
use crate::remote::{RemoteError, RemoteStore, Subscription};

/// Keeps a [`Board`] consistent with one remote collection.
///
/// [`activate`](Self::activate) opens the live subscription and
/// [`deactivate`](Self::deactivate) releases it; dropping the synchronizer
/// releases it as well. Snapshots are applied when the owner asks for them
/// with [`next_snapshot`](Self::next_snapshot) or [`pump`](Self::pump), so
/// all board changes happen on the owner's task.
pub struct Synchronizer<S> {
    store: Arc<S>,
    subscription: Option<Subscription>,
    board: Board,
}

impl<S: RemoteStore> Synchronizer<S> {
    /// Creates an inactive synchronizer with an empty board.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            subscription: None,
            board: Board::new(),
        }
    }

    /// The local board.
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Mutable access to the board, for edit mode.
    pub const fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// The injected store handle.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether a subscription is held.
    pub const fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Opens the live subscription. Does nothing if one is already held.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the subscription cannot be opened.
    pub async fn activate(&mut self) -> Result<(), RemoteError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.store.subscribe().await?);
            tracing::info!(collection = self.store.collection(), "board activated");
        }
        Ok(())
    }

    /// Releases the subscription. No snapshot is applied afterwards.
    pub fn deactivate(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::info!(collection = self.store.collection(), "board deactivated");
        }
    }

    /// Waits for the next snapshot and replaces the board with it.
    ///
    /// Returns `false` when inactive or when the store has gone away, in
    /// which case the subscription is dropped.
    pub async fn next_snapshot(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        if let Some(tasks) = subscription.next().await {
            self.board.apply_snapshot(tasks);
            true
        } else {
            tracing::warn!(collection = self.store.collection(), "snapshot stream ended");
            self.subscription = None;
            false
        }
    }

    /// Applies every snapshot already delivered, without waiting.
    ///
    /// Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(subscription) = self.subscription.as_mut() {
            match subscription.try_next() {
                Ok(Some(tasks)) => {
                    self.board.apply_snapshot(tasks);
                    applied += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(collection = self.store.collection(), "snapshot stream ended");
                    self.subscription = None;
                }
            }
        }
        applied
    }

    /// Creates a task. Returns whether the board changed.
    pub async fn create(&mut self, title: &str) -> bool {
        let mutation = super::create(&*self.store, title).await;
        self.apply(mutation)
    }

    /// Renames a task. Returns whether the board changed.
    pub async fn rename(&mut self, id: &TaskId, title: &str) -> bool {
        let mutation = super::rename(&*self.store, id, title).await;
        self.apply(mutation)
    }

    /// Saves the draft of the task in edit mode.
    ///
    /// On failure edit mode stays active with the draft intact.
    pub async fn save_edit(&mut self) -> bool {
        let Some(edit) = self.board.editing().cloned() else {
            return false;
        };
        self.rename(&edit.id, &edit.draft).await
    }

    /// Deletes a task. Returns whether the board changed.
    pub async fn delete(&mut self, id: &TaskId) -> bool {
        let mutation = super::delete(&*self.store, id).await;
        self.apply(mutation)
    }

    /// Drops a dragged task onto a column.
    ///
    /// An id that is no longer on the board is ignored without a remote
    /// call.
    pub async fn move_task(&mut self, id: &TaskId, status: TaskStatus) -> bool {
        if self.board.get(id).is_none() {
            tracing::debug!(task_id = %id, "dropped task is not on the board");
            return false;
        }
        let mutation = super::move_task(&*self.store, id, status).await;
        self.apply(mutation)
    }

    fn apply(&mut self, mutation: Option<Mutation>) -> bool {
        mutation.is_some_and(|m| {
            self.board.apply(m);
            true
        })
    }
}
