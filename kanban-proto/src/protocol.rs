//! Wire protocol between store clients and the document store.
//!
//! Every [`StoreMessage`] travels as one postcard-encoded WebSocket binary
//! frame (see [`crate::codec`]). A connection starts with `Hello` /
//! `Welcome`; after that the client may subscribe to collections and issue
//! single-document mutations. Mutations carry a client-chosen `request_id`
//! that the store echoes in its reply, so several calls can be in flight on
//! one connection.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskFields, TaskId, TaskPatch};

/// Why the store refused a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureReason {
    /// No document with the given id exists in the collection.
    #[error("document not found")]
    NotFound,
    /// The connection is not allowed to perform the operation.
    #[error("permission denied")]
    PermissionDenied,
    /// The collection reached its document limit.
    #[error("collection is full")]
    CollectionFull,
    /// The request was malformed.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Messages exchanged between a store client and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMessage {
    /// First client message: identifies the project and presents the key.
    Hello {
        /// Project the client wants to talk to.
        project_id: String,
        /// Access key, empty when the client has none.
        access_key: String,
    },

    /// Store accepted the `Hello`.
    Welcome {
        /// Project id echoed back.
        project_id: String,
    },

    /// Start receiving snapshots of a collection.
    ///
    /// The store answers with the current snapshot right away and then
    /// pushes a new one after every change.
    Subscribe {
        /// Collection name.
        collection: String,
    },

    /// Stop receiving snapshots of a collection.
    Unsubscribe {
        /// Collection name.
        collection: String,
    },

    /// Full listing of a collection, pushed to subscribers.
    Snapshot {
        /// Collection name.
        collection: String,
        /// Every document currently in the collection.
        tasks: Vec<Task>,
    },

    /// Create a document; answered by `Inserted` or `Failed`.
    Insert {
        /// Correlates the reply.
        request_id: u64,
        /// Target collection.
        collection: String,
        /// Document body.
        fields: TaskFields,
    },

    /// Patch one field of a document; answered by `Done` or `Failed`.
    Update {
        /// Correlates the reply.
        request_id: u64,
        /// Target collection.
        collection: String,
        /// Document id.
        id: TaskId,
        /// The single-field change.
        patch: TaskPatch,
    },

    /// Remove a document; answered by `Done` or `Failed`.
    Delete {
        /// Correlates the reply.
        request_id: u64,
        /// Target collection.
        collection: String,
        /// Document id.
        id: TaskId,
    },

    /// Reply to `Insert` carrying the new document id.
    Inserted {
        /// Request being answered.
        request_id: u64,
        /// Id assigned by the store.
        id: TaskId,
    },

    /// Reply to a successful `Update` or `Delete`.
    Done {
        /// Request being answered.
        request_id: u64,
    },

    /// Reply to a mutation the store refused.
    Failed {
        /// Request being answered.
        request_id: u64,
        /// What went wrong.
        reason: FailureReason,
    },

    /// Connection-level error not tied to a request.
    Error {
        /// Human-readable description.
        reason: String,
    },
}

impl StoreMessage {
    /// Request id of a reply message, if this is one.
    #[must_use]
    pub const fn reply_to(&self) -> Option<u64> {
        match self {
            Self::Inserted { request_id, .. }
            | Self::Done { request_id }
            | Self::Failed { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}
