//! Remote document store abstraction.
//!
//! Defines the [`RemoteStore`] trait the board synchronizer talks to, and the
//! [`Subscription`] handle a live snapshot stream is delivered through.
//! Implementations:
//! - [`memory::MemoryStore`]: in-process store for tests and offline use
//! - [`ws::WsStore`]: WebSocket client of the `kanban-store` server
//!
//! A store handle is bound to one collection when it is constructed, so the
//! per-call arguments are only document ids and fields.

pub mod memory;
pub mod ws;

use std::fmt;

use kanban_proto::protocol::FailureReason;
use kanban_proto::task::{Task, TaskFields, TaskId, TaskPatch};
use tokio::sync::mpsc;

/// Errors returned by remote store operations.
///
/// The synchronizer does not distinguish between them: every variant is a
/// "remote operation failed" that gets logged and otherwise ignored.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The connection to the store is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connecting or the handshake did not finish in time.
    #[error("remote operation timed out")]
    Timeout,

    /// The store refused the connection during the handshake.
    #[error("handshake refused: {0}")]
    Handshake(String),

    /// The store refused the request.
    #[error("store rejected the request: {0}")]
    Rejected(#[from] FailureReason),

    /// The store answered with something the client did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An underlying I/O error occurred.
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A full listing of the collection, delivered on every change.
pub type Snapshot = Vec<Task>;

/// Live snapshot stream of one collection.
///
/// Holding a `Subscription` keeps the remote notification resource
/// acquired. It is released exactly once: by [`Subscription::unsubscribe`],
/// or when the handle is dropped.
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a snapshot channel and the hook that releases it remotely.
    pub fn new(
        snapshots: mpsc::UnboundedReceiver<Snapshot>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            snapshots,
            release: Some(Box::new(release)),
        }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    /// Returns an already delivered snapshot without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ConnectionClosed`] if no snapshot will ever
    /// arrive again.
    pub fn try_next(&mut self) -> Result<Option<Snapshot>, RemoteError> {
        match self.snapshots.try_recv() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(RemoteError::ConnectionClosed),
        }
    }

    /// Releases the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            self.snapshots.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// Async interface to a document store holding one task collection.
///
/// This is the injected dependency of the synchronizer: production code
/// passes a [`ws::WsStore`], tests pass a [`memory::MemoryStore`].
pub trait RemoteStore: Send + Sync {
    /// Name of the collection this handle is bound to.
    fn collection(&self) -> &str;

    /// Opens a live subscription to the collection.
    ///
    /// The first snapshot reflects the collection at subscription time;
    /// a new one follows every change made by any client.
    fn subscribe(
        &self,
    ) -> impl std::future::Future<Output = Result<Subscription, RemoteError>> + Send;

    /// Creates a document and returns the id the store assigned to it.
    fn insert(
        &self,
        fields: &TaskFields,
    ) -> impl std::future::Future<Output = Result<TaskId, RemoteError>> + Send;

    /// Patches one field of an existing document.
    fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Removes a document.
    fn delete(&self, id: &TaskId)
    -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;
}
