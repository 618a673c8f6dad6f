//! WebSocket client of the `kanban-store` document store.
//!
//! Implements [`RemoteStore`] over one WebSocket connection. After the
//! `Hello`/`Welcome` handshake two background tasks own the socket: a writer
//! draining an outgoing queue, and a reader that routes replies to waiting
//! calls by request id and pushes snapshots to the live subscription.
//!
//! Only connecting and the handshake are bounded by timeouts. A mutation
//! waits for its reply until the connection goes away.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kanban_proto::codec;
use kanban_proto::protocol::StoreMessage;
use kanban_proto::task::{TaskFields, TaskId, TaskPatch};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{RemoteError, RemoteStore, Snapshot, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Default timeout for opening the WebSocket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the `Welcome` reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`WsStore::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsStoreConfig {
    /// Store endpoint, `ws://` or `wss://`.
    pub url: String,
    /// Project the collection belongs to.
    pub project_id: String,
    /// Access key presented in the handshake.
    pub access_key: Option<String>,
    /// Collection every call on the handle targets.
    pub collection: String,
    /// Timeout for opening the connection.
    pub connect_timeout: Duration,
    /// Timeout for the handshake reply.
    pub handshake_timeout: Duration,
}

impl WsStoreConfig {
    /// Settings with no access key and the default timeouts.
    pub fn new(
        url: impl Into<String>,
        project_id: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            project_id: project_id.into(),
            access_key: None,
            collection: collection.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the access key.
    #[must_use]
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }
}

/// State shared between the handle and the reader task.
struct Shared {
    connected: AtomicBool,
    pending: Mutex<HashMap<u64, oneshot::Sender<StoreMessage>>>,
    /// Live subscription, tagged with the generation that installed it.
    subscriber: Mutex<Option<(u64, mpsc::UnboundedSender<Snapshot>)>>,
    next_generation: AtomicU64,
}

impl Shared {
    /// Marks the connection dead and fails every waiting call.
    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.lock().clear();
        self.subscriber.lock().take();
    }
}

/// [`RemoteStore`] backed by a connection to a `kanban-store` server.
pub struct WsStore {
    url: String,
    project_id: String,
    collection: String,
    outgoing: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    next_request: AtomicU64,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl WsStore {
    /// Connects to the store and performs the handshake.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::Timeout`] if connecting or the handshake takes too long.
    /// - [`RemoteError::Handshake`] if the store refuses the project or key.
    /// - [`RemoteError::Io`] if the endpoint cannot be reached.
    /// - [`RemoteError::Protocol`] if the store answers with anything else.
    pub async fn connect(config: WsStoreConfig) -> Result<Self, RemoteError> {
        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %config.url, "store connect timed out");
                    RemoteError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %config.url, err = %e, "store connect failed");
                    map_ws_connect_error(e)
                })?;

        let (mut ws_sink, mut ws_reader) = ws_stream.split();
        handshake(&config, &mut ws_sink, &mut ws_reader).await?;

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            subscriber: Mutex::new(None),
            next_generation: AtomicU64::new(0),
        });
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let writer_handle = tokio::spawn(writer_loop(ws_sink, outgoing_rx, Arc::clone(&shared)));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            config.collection.clone(),
            Arc::clone(&shared),
        ));

        Ok(Self {
            url: config.url,
            project_id: config.project_id,
            collection: config.collection,
            outgoing,
            shared,
            next_request: AtomicU64::new(1),
            reader_handle,
            writer_handle,
        })
    }

    /// Store endpoint this handle is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Project the handle was admitted to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn send(&self, msg: &StoreMessage) -> Result<(), RemoteError> {
        send_on(&self.outgoing, msg)
    }

    /// Sends a request and waits for the reply carrying its id.
    async fn request(
        &self,
        build: impl FnOnce(u64) -> StoreMessage,
    ) -> Result<StoreMessage, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::ConnectionClosed);
        }

        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);

        // The reader clears `pending` after flipping `connected`, so a request
        // registered after that point has to take itself back out.
        if !self.is_connected() {
            self.shared.pending.lock().remove(&request_id);
            return Err(RemoteError::ConnectionClosed);
        }
        if let Err(e) = self.send(&build(request_id)) {
            self.shared.pending.lock().remove(&request_id);
            return Err(e);
        }

        rx.await.map_err(|_| RemoteError::ConnectionClosed)
    }
}

impl Drop for WsStore {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
        self.shared.close();
    }
}

impl RemoteStore for WsStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    /// Subscribes to the bound collection.
    ///
    /// A handle carries at most one live subscription.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::ConnectionClosed`] if the connection is down.
    /// - [`RemoteError::Protocol`] if a subscription is already live.
    async fn subscribe(&self) -> Result<Subscription, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::ConnectionClosed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut slot = self.shared.subscriber.lock();
            if slot.as_ref().is_some_and(|(_, live)| !live.is_closed()) {
                return Err(RemoteError::Protocol(
                    "collection is already subscribed on this connection".to_string(),
                ));
            }
            *slot = Some((generation, tx));
        }

        if let Err(e) = self.send(&StoreMessage::Subscribe {
            collection: self.collection.clone(),
        }) {
            self.shared.subscriber.lock().take();
            return Err(e);
        }
        tracing::debug!(collection = %self.collection, "subscribed");

        let shared = Arc::clone(&self.shared);
        let outgoing = self.outgoing.clone();
        let collection = self.collection.clone();
        Ok(Subscription::new(rx, move || {
            let mut slot = shared.subscriber.lock();
            if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
                slot.take();
                drop(slot);
                let _ = send_on(&outgoing, &StoreMessage::Unsubscribe { collection });
            }
        }))
    }

    async fn insert(&self, fields: &TaskFields) -> Result<TaskId, RemoteError> {
        let reply = self
            .request(|request_id| StoreMessage::Insert {
                request_id,
                collection: self.collection.clone(),
                fields: fields.clone(),
            })
            .await?;
        match reply {
            StoreMessage::Inserted { id, .. } => Ok(id),
            StoreMessage::Failed { reason, .. } => Err(RemoteError::Rejected(reason)),
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let reply = self
            .request(|request_id| StoreMessage::Update {
                request_id,
                collection: self.collection.clone(),
                id: id.clone(),
                patch: patch.clone(),
            })
            .await?;
        expect_done(reply)
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let reply = self
            .request(|request_id| StoreMessage::Delete {
                request_id,
                collection: self.collection.clone(),
                id: id.clone(),
            })
            .await?;
        expect_done(reply)
    }
}

fn expect_done(reply: StoreMessage) -> Result<(), RemoteError> {
    match reply {
        StoreMessage::Done { .. } => Ok(()),
        StoreMessage::Failed { reason, .. } => Err(RemoteError::Rejected(reason)),
        other => Err(unexpected_reply(&other)),
    }
}

fn unexpected_reply(msg: &StoreMessage) -> RemoteError {
    RemoteError::Protocol(format!("unexpected reply: {msg:?}"))
}

fn encode_frame(msg: &StoreMessage) -> Result<Message, RemoteError> {
    let bytes = codec::encode(msg).map_err(|e| RemoteError::Protocol(e.to_string()))?;
    Ok(Message::Binary(bytes.into()))
}

fn send_on(outgoing: &mpsc::UnboundedSender<Message>, msg: &StoreMessage) -> Result<(), RemoteError> {
    outgoing
        .send(encode_frame(msg)?)
        .map_err(|_| RemoteError::ConnectionClosed)
}

/// Sends `Hello` and waits for `Welcome`.
async fn handshake(
    config: &WsStoreConfig,
    ws_sink: &mut WsSink,
    ws_reader: &mut WsReader,
) -> Result<(), RemoteError> {
    let hello = StoreMessage::Hello {
        project_id: config.project_id.clone(),
        access_key: config.access_key.clone().unwrap_or_default(),
    };
    ws_sink.send(encode_frame(&hello)?).await.map_err(|e| {
        tracing::warn!(err = %e, "failed to send Hello");
        RemoteError::Io(std::io::Error::other(format!("failed to send Hello: {e}")))
    })?;

    let reply = tokio::time::timeout(config.handshake_timeout, ws_reader.next())
        .await
        .map_err(|_| {
            tracing::warn!(url = %config.url, "store handshake timed out");
            RemoteError::Timeout
        })?;

    match reply {
        Some(Ok(Message::Binary(data))) => match codec::decode(&data) {
            Ok(StoreMessage::Welcome { project_id }) => {
                tracing::info!(project_id = %project_id, url = %config.url, "connected to store");
                Ok(())
            }
            Ok(StoreMessage::Error { reason }) => {
                tracing::warn!(reason = %reason, "store refused handshake");
                Err(RemoteError::Handshake(reason))
            }
            Ok(other) => Err(RemoteError::Protocol(format!(
                "unexpected handshake reply: {other:?}"
            ))),
            Err(e) => Err(RemoteError::Protocol(format!(
                "malformed handshake reply: {e}"
            ))),
        },
        Some(Ok(Message::Close(_))) | None => {
            tracing::warn!("store closed connection during handshake");
            Err(RemoteError::ConnectionClosed)
        }
        Some(Ok(_)) => Err(RemoteError::Protocol(
            "unexpected non-binary frame during handshake".to_string(),
        )),
        Some(Err(e)) => Err(RemoteError::Io(std::io::Error::other(format!(
            "WebSocket error during handshake: {e}"
        )))),
    }
}

/// Drains the outgoing queue into the socket.
async fn writer_loop(
    mut ws_sink: WsSink,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) {
    while let Some(msg) = outgoing.recv().await {
        if let Err(e) = ws_sink.send(msg).await {
            tracing::warn!(err = %e, "store send failed");
            shared.close();
            return;
        }
    }
    let _ = ws_sink.close().await;
}

/// Routes incoming frames until the socket closes.
///
/// Malformed frames are logged and skipped.
async fn reader_loop(mut ws_reader: WsReader, collection: String, shared: Arc<Shared>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match codec::decode(&data) {
                Ok(StoreMessage::Snapshot {
                    collection: name,
                    tasks,
                }) if name == collection => {
                    if let Some((_, tx)) = shared.subscriber.lock().as_ref() {
                        let _ = tx.send(tasks);
                    }
                }
                Ok(StoreMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "store error");
                }
                Ok(msg) => {
                    if let Some(request_id) = msg.reply_to() {
                        if let Some(waiter) = shared.pending.lock().remove(&request_id) {
                            let _ = waiter.send(msg);
                        } else {
                            tracing::debug!(request_id, "reply for unknown request");
                        }
                    } else {
                        tracing::debug!(?msg, "unexpected store message");
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed store frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "store read error");
                break;
            }
        }
    }
    shared.close();
    tracing::info!("store reader task exiting");
}

fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> RemoteError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => RemoteError::Io(io_err),
        WsError::Http(response) => RemoteError::Io(std::io::Error::other(format!(
            "store HTTP error: status {}",
            response.status()
        ))),
        other => RemoteError::Io(std::io::Error::other(format!(
            "store connection error: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kanban_proto::protocol::FailureReason;
    use kanban_proto::task::TaskStatus;
    use kanban_store::collection::Collections;
    use kanban_store::server::{self, StoreState};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start_store(access_key: Option<&str>) -> (String, tokio::task::JoinHandle<()>) {
        let state = Arc::new(StoreState::with_config(
            "proj".to_string(),
            access_key.map(ToString::to_string),
            64 * 1024,
            Collections::new(),
        ));
        let (addr, handle) = server::start_server_with_state("127.0.0.1:0", state)
            .await
            .unwrap();
        (format!("ws://{addr}/ws"), handle)
    }

    async fn connect(url: &str) -> WsStore {
        WsStore::connect(WsStoreConfig::new(url, "proj", "Tasks"))
            .await
            .unwrap()
    }

    async fn next(sub: &mut Subscription) -> Snapshot {
        tokio::time::timeout(WAIT, sub.next())
            .await
            .expect("snapshot timed out")
            .expect("subscription closed")
    }

    /// Accepts one connection, completes the handshake, then closes it.
    async fn start_closing_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            if let Some(Ok(Message::Binary(data))) = ws.next().await {
                if let Ok(StoreMessage::Hello { project_id, .. }) = codec::decode(&data) {
                    let welcome = codec::encode(&StoreMessage::Welcome { project_id }).unwrap();
                    let _ = ws.send(Message::Binary(welcome.into())).await;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = ws.close(None).await;
        });
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn connect_completes_handshake() {
        let (url, _handle) = start_store(None).await;
        let store = connect(&url).await;
        assert!(store.is_connected());
        assert_eq!(store.collection(), "Tasks");
        assert_eq!(store.project_id(), "proj");
        assert!(store.url().starts_with("ws://127.0.0.1:"));
    }

    #[tokio::test]
    async fn wrong_access_key_is_refused() {
        let (url, _handle) = start_store(Some("secret")).await;
        let result =
            WsStore::connect(WsStoreConfig::new(&url, "proj", "Tasks").with_access_key("nope"))
                .await;
        assert!(matches!(result, Err(RemoteError::Handshake(_))));

        let ok = WsStore::connect(WsStoreConfig::new(&url, "proj", "Tasks").with_access_key("secret"))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_io_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = WsStore::connect(WsStoreConfig::new(format!("ws://{addr}/ws"), "p", "c")).await;
        assert!(matches!(result, Err(RemoteError::Io(_))));
    }

    #[tokio::test]
    async fn mutations_arrive_as_snapshots() {
        let (url, _handle) = start_store(None).await;
        let store = connect(&url).await;
        let mut sub = store.subscribe().await.unwrap();
        assert!(next(&mut sub).await.is_empty());

        let id = store.insert(&TaskFields::new_task("write docs")).await.unwrap();
        let snapshot = next(&mut sub).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].status, TaskStatus::ToDo);

        store
            .update(&id, &TaskPatch::Status(TaskStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(next(&mut sub).await[0].status, TaskStatus::InProgress);

        store.delete(&id).await.unwrap();
        assert!(next(&mut sub).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_rejected() {
        let (url, _handle) = start_store(None).await;
        let store = connect(&url).await;
        let err = store.delete(&TaskId::new("missing")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(FailureReason::NotFound)));
    }

    #[tokio::test]
    async fn second_live_subscription_is_refused() {
        let (url, _handle) = start_store(None).await;
        let store = connect(&url).await;
        let first = store.subscribe().await.unwrap();
        assert!(matches!(
            store.subscribe().await,
            Err(RemoteError::Protocol(_))
        ));

        first.unsubscribe();
        assert!(store.subscribe().await.is_ok());
    }

    #[tokio::test]
    async fn other_clients_changes_are_pushed() {
        let (url, _handle) = start_store(None).await;
        let alice = connect(&url).await;
        let bob = connect(&url).await;
        let mut bob_sub = bob.subscribe().await.unwrap();
        next(&mut bob_sub).await;

        alice.insert(&TaskFields::new_task("from alice")).await.unwrap();
        assert_eq!(next(&mut bob_sub).await[0].title, "from alice");
    }

    #[tokio::test]
    async fn server_close_is_detected() {
        let url = start_closing_server().await;
        let store = connect(&url).await;

        let deadline = tokio::time::Instant::now() + WAIT;
        while store.is_connected() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!store.is_connected());
        assert!(matches!(
            store.insert(&TaskFields::new_task("late")).await,
            Err(RemoteError::ConnectionClosed)
        ));
    }
}
