//! In-process remote store.
//!
//! [`MemoryStore`] behaves like the document store without a network: it
//! assigns ids, applies single-document mutations and pushes a snapshot to
//! every subscriber after each change. Clones share the same collection, so
//! two clones act like two clients of one store.
//!
//! It also records how many remote calls were made and can be told to fail
//! them, which is what the synchronizer tests are built on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kanban_proto::protocol::FailureReason;
use kanban_proto::task::{Task, TaskFields, TaskId, TaskPatch};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{RemoteError, RemoteStore, Snapshot, Subscription};

/// Number of calls made through a [`MemoryStore`], failed ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `subscribe` calls.
    pub subscribe: usize,
    /// `insert` calls.
    pub insert: usize,
    /// `update` calls.
    pub update: usize,
    /// `delete` calls.
    pub delete: usize,
}

impl CallCounts {
    /// Total mutation calls (insert + update + delete).
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.insert + self.update + self.delete
    }
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<TaskId, TaskFields>,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Snapshot>>,
    next_subscriber: u64,
    calls: CallCounts,
    fail_next: usize,
    offline: bool,
    hold_snapshots: bool,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        self.docs
            .iter()
            .map(|(id, fields)| fields.clone().into_task(id.clone()))
            .collect()
    }

    fn broadcast(&mut self) {
        if self.hold_snapshots {
            return;
        }
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Decides whether the current mutation call fails.
    fn check_failure(&mut self) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::ConnectionClosed);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(RemoteError::Rejected(FailureReason::PermissionDenied));
        }
        Ok(())
    }
}

/// In-memory [`RemoteStore`] with subscriber fan-out and failure injection.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    collection: String,
}

impl MemoryStore {
    /// Creates an empty store bound to the given collection name.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            collection: collection.into(),
        }
    }

    /// Current contents as the store sees them.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.inner.lock().calls
    }

    /// Makes the next `n` mutation calls fail with a rejection.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// While offline every call fails with [`RemoteError::ConnectionClosed`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// While held, mutations succeed but no snapshots are pushed. Releasing
    /// the hold pushes the current state once.
    pub fn hold_snapshots(&self, hold: bool) {
        let mut inner = self.inner.lock();
        inner.hold_snapshots = hold;
        if !hold {
            inner.broadcast();
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl RemoteStore for MemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn subscribe(&self) -> Result<Subscription, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.subscribe += 1;
        if inner.offline {
            return Err(RemoteError::ConnectionClosed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.snapshot());
        let key = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(key, tx);
        drop(inner);

        let shared = Arc::clone(&self.inner);
        Ok(Subscription::new(rx, move || {
            shared.lock().subscribers.remove(&key);
        }))
    }

    async fn insert(&self, fields: &TaskFields) -> Result<TaskId, RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.insert += 1;
        inner.check_failure()?;

        // Zero-padded so key order is creation order.
        let id = TaskId::new(format!("mem-{:08}", inner.next_id));
        inner.next_id += 1;
        inner.docs.insert(id.clone(), fields.clone());
        inner.broadcast();
        Ok(id)
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.update += 1;
        inner.check_failure()?;

        let fields = inner
            .docs
            .get_mut(id)
            .ok_or(RemoteError::Rejected(FailureReason::NotFound))?;
        fields.apply(patch);
        inner.broadcast();
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.calls.delete += 1;
        inner.check_failure()?;

        if inner.docs.remove(id).is_none() {
            return Err(RemoteError::Rejected(FailureReason::NotFound));
        }
        inner.broadcast();
        Ok(())
    }
}
