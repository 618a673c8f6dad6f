//! Store server core: shared state, WebSocket handler, subscription registry,
//! and request handling.
//!
//! The server accepts WebSocket connections, checks the client's `Hello`
//! against the configured project id and access key, then serves
//! single-document mutations on in-memory [`Collections`]. After every
//! successful mutation the full collection is pushed as a `Snapshot` to all
//! connections subscribed to it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use kanban_proto::codec;
use kanban_proto::protocol::{FailureReason, StoreMessage};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::collection::Collections;

/// Default maximum accepted frame size in bytes (64 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Default project id when none is configured.
const DEFAULT_PROJECT_ID: &str = "kanban";

/// Identifies one accepted WebSocket connection.
pub type ConnId = u64;

/// Shared store server state.
pub struct StoreState {
    /// Maps connection id to a channel sender for its WebSocket writer.
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<Message>>>,
    /// Collection name -> subscribed connections.
    subscriptions: RwLock<HashMap<String, HashSet<ConnId>>>,
    /// Serializes snapshot-and-send so subscribers never end on a stale listing.
    fanout: Mutex<()>,
    next_conn_id: AtomicU64,
    /// Document storage.
    pub collections: Collections,
    project_id: String,
    access_key: Option<String>,
    /// Maximum accepted frame size in bytes.
    max_payload_size: usize,
}

impl Default for StoreState {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreState {
    /// Creates a store with default project id, no access key and default
    /// limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_PROJECT_ID.to_string(),
            None,
            DEFAULT_MAX_PAYLOAD_SIZE,
            Collections::new(),
        )
    }

    /// Creates a store with explicit project credentials, frame limit and
    /// collections.
    #[must_use]
    pub fn with_config(
        project_id: String,
        access_key: Option<String>,
        max_payload_size: usize,
        collections: Collections,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            fanout: Mutex::new(()),
            next_conn_id: AtomicU64::new(1),
            collections,
            project_id,
            access_key,
            max_payload_size,
        }
    }

    /// Checks the credentials presented in a `Hello`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the project id differs or the
    /// access key does not match the configured one.
    pub fn check_hello(&self, project_id: &str, access_key: &str) -> Result<(), String> {
        if project_id != self.project_id {
            return Err(format!("unknown project: {project_id}"));
        }
        match &self.access_key {
            Some(expected) if expected != access_key => Err("invalid access key".to_string()),
            _ => Ok(()),
        }
    }

    /// Registers a connection's writer channel and returns its id.
    pub async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> ConnId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let mut conns = self.connections.write().await;
        conns.insert(conn_id, sender);
        conn_id
    }

    /// Removes a connection and all of its subscriptions.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        {
            let mut subs = self.subscriptions.write().await;
            for subscribers in subs.values_mut() {
                subscribers.remove(&conn_id);
            }
            subs.retain(|_, subscribers| !subscribers.is_empty());
        }
        let mut conns = self.connections.write().await;
        conns.remove(&conn_id)
    }

    /// Subscribes a connection to a collection.
    pub async fn subscribe(&self, collection: &str, conn_id: ConnId) {
        let mut subs = self.subscriptions.write().await;
        subs.entry(collection.to_string())
            .or_default()
            .insert(conn_id);
    }

    /// Removes a connection's subscription to a collection.
    ///
    /// Returns whether the connection was subscribed.
    pub async fn unsubscribe(&self, collection: &str, conn_id: ConnId) -> bool {
        let mut subs = self.subscriptions.write().await;
        let Some(subscribers) = subs.get_mut(collection) else {
            return false;
        };
        let removed = subscribers.remove(&conn_id);
        if subscribers.is_empty() {
            subs.remove(collection);
        }
        removed
    }

    /// Number of connections subscribed to a collection.
    pub async fn subscriber_count(&self, collection: &str) -> usize {
        let subs = self.subscriptions.read().await;
        subs.get(collection).map_or(0, HashSet::len)
    }

    /// Returns a clone of the sender for the given connection, if registered.
    pub async fn get_sender(&self, conn_id: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(&conn_id).cloned()
    }

    /// Send a WebSocket Close frame to all connections.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (conn_id, sender) in conns.iter() {
            tracing::info!(conn_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` message and check its credentials.
/// 2. Register the connection and send `Welcome` back.
/// 3. Enter the request loop.
/// 4. On disconnect, unregister the connection and its subscriptions.
pub async fn handle_socket(socket: WebSocket, state: Arc<StoreState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some((project_id, access_key)) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!("connection closed before hello");
        return;
    };

    if let Err(reason) = state.check_hello(&project_id, &access_key) {
        tracing::warn!(project_id = %project_id, reason = %reason, "rejecting client");
        let _ = send_store_msg(&mut ws_sender, &StoreMessage::Error { reason }).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.register(tx).await;

    let welcome = StoreMessage::Welcome {
        project_id: project_id.clone(),
    };
    if let Err(e) = send_store_msg(&mut ws_sender, &welcome).await {
        tracing::error!(conn_id, error = %e, "failed to send Welcome");
        state.unregister(conn_id).await;
        return;
    }

    tracing::info!(conn_id, project_id = %project_id, "client connected");

    // Writer task: forwards queued frames to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming requests from this client.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(conn_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(conn_id).await;
    tracing::info!(conn_id, "client disconnected");
}

/// Waits for the first message on the WebSocket, expecting `Hello`.
///
/// Returns the presented project id and access key, or `None` if the
/// connection closes or an unexpected message arrives.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<(String, String)> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match codec::decode(&data) {
                Ok(StoreMessage::Hello {
                    project_id,
                    access_key,
                }) => return Some((project_id, access_key)),
                Ok(other) => {
                    tracing::warn!(msg = ?other, "expected Hello, got different message");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode hello message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during the handshake.
            }
        }
    }
    None
}

/// Handles a binary WebSocket message from a connected client.
async fn handle_binary_message(conn_id: ConnId, data: &[u8], state: &Arc<StoreState>) {
    if data.len() > state.max_payload_size {
        tracing::warn!(
            conn_id,
            size = data.len(),
            max = state.max_payload_size,
            "frame exceeds size limit"
        );
        let err = StoreMessage::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_payload_size
            ),
        };
        send_to_conn(state, conn_id, &err).await;
        return;
    }

    let msg = match codec::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "failed to decode message");
            return;
        }
    };

    match msg {
        StoreMessage::Subscribe { collection } => {
            subscribe_with_snapshot(state, conn_id, collection).await;
        }
        StoreMessage::Unsubscribe { collection } => {
            let existed = state.unsubscribe(&collection, conn_id).await;
            tracing::debug!(conn_id, collection = %collection, existed, "unsubscribed");
        }
        StoreMessage::Insert {
            request_id,
            collection,
            fields,
        } => {
            let reply = match state.collections.insert(&collection, fields).await {
                Ok(id) => {
                    tracing::debug!(conn_id, collection = %collection, id = %id, "inserted");
                    StoreMessage::Inserted { request_id, id }
                }
                Err(e) => {
                    tracing::warn!(conn_id, collection = %collection, error = %e, "insert failed");
                    StoreMessage::Failed {
                        request_id,
                        reason: e.into(),
                    }
                }
            };
            finish_mutation(state, conn_id, &collection, &reply).await;
        }
        StoreMessage::Update {
            request_id,
            collection,
            id,
            patch,
        } => {
            let result = state.collections.update(&collection, &id, &patch).await;
            let reply = mutation_reply(request_id, result.map_err(FailureReason::from));
            tracing::debug!(conn_id, collection = %collection, id = %id, reply = ?reply, "update");
            finish_mutation(state, conn_id, &collection, &reply).await;
        }
        StoreMessage::Delete {
            request_id,
            collection,
            id,
        } => {
            let result = state.collections.delete(&collection, &id).await;
            let reply = mutation_reply(request_id, result.map_err(FailureReason::from));
            tracing::debug!(conn_id, collection = %collection, id = %id, reply = ?reply, "delete");
            finish_mutation(state, conn_id, &collection, &reply).await;
        }
        StoreMessage::Hello { .. } => {
            tracing::warn!(conn_id, "received duplicate Hello from connected client");
        }
        other => {
            tracing::warn!(conn_id, msg = ?other, "unexpected message type from client");
        }
    }
}

/// Subscribes a connection and queues the current listing for it.
///
/// Holds `fanout` so a concurrent broadcast is queued either entirely before
/// or entirely after the initial snapshot.
async fn subscribe_with_snapshot(state: &Arc<StoreState>, conn_id: ConnId, collection: String) {
    let _guard = state.fanout.lock().await;
    state.subscribe(&collection, conn_id).await;
    tracing::debug!(conn_id, collection = %collection, "subscribed");
    let snapshot = StoreMessage::Snapshot {
        tasks: state.collections.snapshot(&collection).await,
        collection,
    };
    send_to_conn(state, conn_id, &snapshot).await;
}

/// Builds the reply for an update or delete.
fn mutation_reply(request_id: u64, result: Result<(), FailureReason>) -> StoreMessage {
    match result {
        Ok(()) => StoreMessage::Done { request_id },
        Err(reason) => StoreMessage::Failed { request_id, reason },
    }
}

/// Sends the reply to the requester, then fans a fresh snapshot out if the
/// mutation succeeded.
async fn finish_mutation(
    state: &Arc<StoreState>,
    conn_id: ConnId,
    collection: &str,
    reply: &StoreMessage,
) {
    send_to_conn(state, conn_id, reply).await;
    if !matches!(reply, StoreMessage::Failed { .. }) {
        broadcast_snapshot(state, collection).await;
    }
}

/// Pushes the current listing of a collection to all of its subscribers.
async fn broadcast_snapshot(state: &Arc<StoreState>, collection: &str) {
    let _guard = state.fanout.lock().await;
    let snapshot = StoreMessage::Snapshot {
        collection: collection.to_string(),
        tasks: state.collections.snapshot(collection).await,
    };
    let bytes = match codec::encode(&snapshot) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(collection = %collection, error = %e, "failed to encode snapshot");
            return;
        }
    };

    let subscribers: Vec<ConnId> = {
        let subs = state.subscriptions.read().await;
        subs.get(collection)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    };
    tracing::debug!(
        collection = %collection,
        subscribers = subscribers.len(),
        "broadcasting snapshot"
    );
    for conn_id in subscribers {
        if let Some(sender) = state.get_sender(conn_id).await {
            let _ = sender.send(Message::Binary(bytes.clone().into()));
        }
    }
}

/// Encodes and sends a store message to a specific connection.
async fn send_to_conn(state: &Arc<StoreState>, conn_id: ConnId, msg: &StoreMessage) {
    let bytes = match codec::encode(msg) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(conn_id, error = %e, "failed to encode message");
            return;
        }
    };
    if let Some(sender) = state.get_sender(conn_id).await {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

/// Encodes and sends a store message directly on a WebSocket sender.
async fn send_store_msg(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &StoreMessage,
) -> Result<(), String> {
    let bytes = codec::encode(msg).map_err(|e| e.to_string())?;
    sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the store server on the given address with default state.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StoreState::new())).await
}

/// Starts the store server with a pre-configured [`StoreState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StoreState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "store server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the store server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port).
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<StoreState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
