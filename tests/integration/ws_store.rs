//! Integration tests for the board synchronizer against a live
//! `kanban-store` server over WebSocket.

use std::sync::Arc;
use std::time::Duration;

use kanban::board::Mutation;
use kanban::remote::ws::{WsStore, WsStoreConfig};
use kanban::remote::{RemoteError, RemoteStore};
use kanban::sync::{SyncCommand, SyncEvent, Synchronizer, spawn_sync};
use kanban_proto::task::{TaskFields, TaskId, TaskStatus};
use kanban_store::collection::Collections;
use kanban_store::server::{self, StoreState};

const WAIT: Duration = Duration::from_secs(5);

/// Start the store in-process and return a ws:// URL.
async fn start_store(
    access_key: Option<&str>,
    max_documents: usize,
) -> (String, tokio::task::JoinHandle<()>) {
    let state = Arc::new(StoreState::with_config(
        "real-time".to_string(),
        access_key.map(ToString::to_string),
        64 * 1024,
        Collections::with_max_documents(max_documents),
    ));
    let (addr, handle) = server::start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start store server");
    (format!("ws://{addr}/ws"), handle)
}

async fn client(url: &str) -> Synchronizer<WsStore> {
    let store = WsStore::connect(WsStoreConfig::new(url, "real-time", "Tasks"))
        .await
        .unwrap();
    let mut sync = Synchronizer::new(Arc::new(store));
    sync.activate().await.unwrap();
    next(&mut sync).await;
    sync
}

async fn next(sync: &mut Synchronizer<WsStore>) {
    let applied = tokio::time::timeout(WAIT, sync.next_snapshot())
        .await
        .expect("snapshot timed out");
    assert!(applied, "snapshot stream ended");
}

#[tokio::test]
async fn scenario_over_websocket() {
    let (url, _handle) = start_store(None, 100).await;
    let mut sync = client(&url).await;

    assert!(sync.create("Buy milk").await);
    let id = sync.board().tasks()[0].id.clone();
    assert!(!id.as_str().is_empty());

    assert!(sync.move_task(&id, TaskStatus::InProgress).await);
    assert!(sync.rename(&id, "Buy oat milk").await);
    let task = sync.board().get(&id).unwrap();
    assert_eq!(task.title, "Buy oat milk");
    assert_eq!(task.status, TaskStatus::InProgress);

    assert!(sync.delete(&id).await);
    assert!(sync.board().is_empty());

    // Four mutations, four echoes; the last one is empty.
    for _ in 0..4 {
        next(&mut sync).await;
    }
    assert!(sync.board().is_empty());
}

#[tokio::test]
async fn two_clients_converge() {
    let (url, _handle) = start_store(None, 100).await;
    let mut alice = client(&url).await;
    let mut bob = client(&url).await;

    alice.create("shared").await;
    next(&mut bob).await;
    assert_eq!(bob.board().tasks()[0].title, "shared");

    let id = bob.board().tasks()[0].id.clone();
    bob.move_task(&id, TaskStatus::Done).await;
    next(&mut alice).await;
    next(&mut alice).await;
    assert_eq!(alice.board().get(&id).unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn rejected_calls_leave_board_untouched() {
    let (url, _handle) = start_store(None, 1).await;
    let mut sync = client(&url).await;

    assert!(sync.create("only one fits").await);
    next(&mut sync).await;

    // The collection is full.
    assert!(!sync.create("overflow").await);
    assert_eq!(sync.board().len(), 1);

    // Unknown ids are NotFound on the store; the board does not change.
    let before = sync.board().clone();
    assert!(!sync.delete(&TaskId::new("missing")).await);
    assert_eq!(sync.board(), &before);
}

#[tokio::test]
async fn access_key_is_enforced() {
    let (url, _handle) = start_store(Some("s3cret"), 100).await;

    let refused = WsStore::connect(WsStoreConfig::new(&url, "real-time", "Tasks")).await;
    assert!(matches!(refused, Err(RemoteError::Handshake(_))));

    let wrong_project =
        WsStore::connect(WsStoreConfig::new(&url, "other", "Tasks").with_access_key("s3cret")).await;
    assert!(matches!(wrong_project, Err(RemoteError::Handshake(_))));

    let admitted =
        WsStore::connect(WsStoreConfig::new(&url, "real-time", "Tasks").with_access_key("s3cret"))
            .await;
    assert!(admitted.is_ok());
}

#[tokio::test]
async fn store_closing_connections_ends_snapshots_and_fails_calls() {
    let state = Arc::new(StoreState::with_config(
        "real-time".to_string(),
        None,
        64 * 1024,
        Collections::new(),
    ));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    let mut sync = client(&format!("ws://{addr}/ws")).await;

    state.close_all_connections().await;

    let applied = tokio::time::timeout(WAIT, sync.next_snapshot())
        .await
        .expect("stream did not end");
    assert!(!applied);
    assert!(!sync.is_active());
    assert!(!sync.create("after close").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_keeps_quick_moves_in_order() {
    let state = Arc::new(StoreState::with_config(
        "real-time".to_string(),
        None,
        64 * 1024,
        Collections::new(),
    ));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start store server");
    let store = WsStore::connect(WsStoreConfig::new(
        format!("ws://{addr}/ws"),
        "real-time",
        "Tasks",
    ))
    .await
    .unwrap();
    let id = store.insert(&TaskFields::new_task("drag me")).await.unwrap();
    let (cmd, mut events) = spawn_sync(Arc::new(store), 16).await.unwrap();

    for round in 0..20 {
        let (first, second) = if round % 2 == 0 {
            (TaskStatus::InProgress, TaskStatus::Done)
        } else {
            (TaskStatus::Done, TaskStatus::InProgress)
        };
        for status in [first, second] {
            cmd.try_send(SyncCommand::Move {
                id: id.clone(),
                status,
            })
            .unwrap();
        }

        let mut applied = Vec::new();
        while applied.len() < 2 {
            let event = tokio::time::timeout(WAIT, events.recv())
                .await
                .expect("event timed out")
                .expect("event channel closed");
            if let SyncEvent::Applied(Mutation::Moved { status, .. }) = event {
                applied.push(status);
            }
        }
        assert_eq!(applied, [first, second]);
        assert_eq!(state.collections.snapshot("Tasks").await[0].status, second);
    }
}
