//! Background synchronization for the terminal loop.
//!
//! The terminal loop cannot await remote calls without freezing the screen,
//! so [`spawn_sync`] moves them onto tokio tasks and talks to the loop over
//! two channels:
//!
//! ```text
//! terminal loop  ←── SyncEvent ───  snapshot forwarder / command handler
//!                ─── SyncCommand →  command handler
//! ```
//!
//! The loop owns the board and applies every event itself; the background
//! tasks never touch local state.

use std::sync::Arc;

use kanban_proto::task::{Task, TaskId, TaskStatus};
use tokio::sync::{mpsc, oneshot};

use crate::board::Mutation;
use crate::remote::{RemoteError, RemoteStore, Subscription};

/// Default capacity of the command and event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Requests from the terminal loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Create a task with this title.
    Create {
        /// Title as typed.
        title: String,
    },
    /// Rename a task.
    Rename {
        /// Task to rename.
        id: TaskId,
        /// Title as typed.
        title: String,
    },
    /// Delete a task.
    Delete {
        /// Task to delete.
        id: TaskId,
    },
    /// Move a task the loop has checked is on the board.
    Move {
        /// Task to move.
        id: TaskId,
        /// Target column.
        status: TaskStatus,
    },
    /// Release the subscription and stop.
    Shutdown,
}

/// Outcomes reported to the terminal loop.
///
/// Failed commands produce no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The store pushed a new listing.
    Snapshot(Vec<Task>),
    /// A command succeeded.
    Applied(Mutation),
    /// The snapshot stream ended.
    Disconnected,
}

/// Subscribes to the store and spawns the background tasks.
///
/// The subscription is released when [`SyncCommand::Shutdown`] arrives or
/// the command sender is dropped.
///
/// # Errors
///
/// Returns the store's error if the subscription cannot be opened. The
/// caller can fall back to an offline store.
pub async fn spawn_sync<S>(
    store: Arc<S>,
    capacity: usize,
) -> Result<(mpsc::Sender<SyncCommand>, mpsc::Receiver<SyncEvent>), RemoteError>
where
    S: RemoteStore + 'static,
{
    let subscription = store.subscribe().await?;
    tracing::info!(collection = store.collection(), "sync started");

    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (evt_tx, evt_rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(snapshot_forwarder(subscription, evt_tx.clone(), shutdown_rx));
    tokio::spawn(command_handler(store, cmd_rx, evt_tx, shutdown_tx));

    Ok((cmd_tx, evt_rx))
}

/// Forwards snapshots until shutdown or until the stream ends.
async fn snapshot_forwarder(
    mut subscription: Subscription,
    evt_tx: mpsc::Sender<SyncEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            snapshot = subscription.next() => {
                let event = match snapshot {
                    Some(tasks) => SyncEvent::Snapshot(tasks),
                    None => {
                        tracing::warn!("snapshot stream ended");
                        let _ = evt_tx.send(SyncEvent::Disconnected).await;
                        break;
                    }
                };
                if evt_tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
    subscription.unsubscribe();
    tracing::debug!("snapshot forwarder exiting");
}

/// Runs commands one at a time, in the order the loop sent them.
///
/// Each remote call finishes before the next one starts, so two quick moves
/// of the same task reach the store in the order the user made them.
async fn command_handler<S>(
    store: Arc<S>,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    evt_tx: mpsc::Sender<SyncEvent>,
    shutdown_tx: oneshot::Sender<()>,
) where
    S: RemoteStore + 'static,
{
    while let Some(cmd) = cmd_rx.recv().await {
        if cmd == SyncCommand::Shutdown {
            tracing::info!("sync shutting down");
            break;
        }
        if let Some(mutation) = run_command(&*store, cmd).await
            && evt_tx.send(SyncEvent::Applied(mutation)).await.is_err()
        {
            break;
        }
    }
    let _ = shutdown_tx.send(());
}

async fn run_command<S: RemoteStore>(store: &S, cmd: SyncCommand) -> Option<Mutation> {
    match cmd {
        SyncCommand::Create { title } => super::create(store, &title).await,
        SyncCommand::Rename { id, title } => super::rename(store, &id, &title).await,
        SyncCommand::Delete { id } => super::delete(store, &id).await,
        SyncCommand::Move { id, status } => super::move_task(store, &id, status).await,
        SyncCommand::Shutdown => None,
    }
}
