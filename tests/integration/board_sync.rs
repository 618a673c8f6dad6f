//! Integration tests for the board synchronizer over the in-memory store.
//!
//! Covers the full user scenario (create, drag, rename, delete), failure
//! handling, subscription release, and two clients sharing one collection.

use std::sync::Arc;
use std::time::Duration;

use kanban::board::Mutation;
use kanban::remote::RemoteStore;
use kanban::remote::memory::MemoryStore;
use kanban::sync::{SyncCommand, SyncEvent, Synchronizer, spawn_sync};
use kanban_proto::task::{TaskFields, TaskStatus};
use tokio::sync::mpsc;

async fn active(store: &Arc<MemoryStore>) -> Synchronizer<MemoryStore> {
    let mut sync = Synchronizer::new(Arc::clone(store));
    sync.activate().await.unwrap();
    assert!(sync.next_snapshot().await);
    sync
}

async fn next(events: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timed out")
        .expect("event channel closed")
}

#[tokio::test]
async fn buy_milk_scenario() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let mut sync = active(&store).await;

    // Create: lands in "To Do" with a store-assigned id.
    assert!(sync.create("Buy milk").await);
    let id = sync.board().tasks()[0].id.clone();
    assert_eq!(sync.board().column(TaskStatus::ToDo).len(), 1);

    // Drag to "In Progress".
    assert!(sync.move_task(&id, TaskStatus::InProgress).await);
    assert!(sync.board().column(TaskStatus::ToDo).is_empty());
    assert_eq!(sync.board().column(TaskStatus::InProgress)[0].id, id);

    // Rename keeps the column.
    sync.board_mut().begin_edit(&id);
    assert!(sync.rename(&id, "Buy oat milk").await);
    let task = sync.board().get(&id).unwrap();
    assert_eq!(task.title, "Buy oat milk");
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(sync.board().editing().is_none());

    // Delete removes it everywhere.
    assert!(sync.delete(&id).await);
    assert!(sync.board().is_empty());
    assert!(store.snapshot().is_empty());

    // The echoed snapshots agree with the optimistic state.
    sync.pump();
    assert!(sync.board().is_empty());
}

#[tokio::test]
async fn snapshot_replaces_optimistic_state() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let mut sync = active(&store).await;
    store.hold_snapshots(true);

    sync.create("one").await;
    sync.create("two").await;
    assert_eq!(sync.board().len(), 2);

    // Someone else wipes the collection while snapshots are held.
    let other = MemoryStore::clone(&store);
    for task in other.snapshot() {
        other.delete(&task.id).await.unwrap();
    }
    store.hold_snapshots(false);

    assert_eq!(sync.pump(), 1);
    assert!(sync.board().is_empty());
}

#[tokio::test]
async fn failures_leave_board_untouched() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let mut sync = active(&store).await;
    sync.create("keep me").await;
    sync.pump();
    let id = sync.board().tasks()[0].id.clone();
    let before = sync.board().clone();

    store.set_offline(true);
    assert!(!sync.create("new").await);
    assert!(!sync.rename(&id, "renamed").await);
    assert!(!sync.move_task(&id, TaskStatus::Done).await);
    assert!(!sync.delete(&id).await);

    assert_eq!(sync.board(), &before);
}

#[tokio::test]
async fn two_clients_see_each_other() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let mut alice = active(&store).await;
    let mut bob = active(&store).await;

    alice.create("from alice").await;
    assert!(bob.next_snapshot().await);
    assert_eq!(bob.board().tasks()[0].title, "from alice");

    let id = bob.board().tasks()[0].id.clone();
    bob.move_task(&id, TaskStatus::Done).await;
    alice.pump();
    assert_eq!(alice.board().get(&id).unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn deactivation_releases_subscription_once() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let mut sync = active(&store).await;
    assert_eq!(store.subscriber_count(), 1);

    sync.deactivate();
    assert_eq!(store.subscriber_count(), 0);

    store.insert(&TaskFields::new_task("unseen")).await.unwrap();
    assert_eq!(sync.pump(), 0);
    assert!(sync.board().is_empty());

    drop(sync);
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn worker_round_trip() {
    let store = Arc::new(MemoryStore::new("Tasks"));
    let (cmd, mut events) = spawn_sync(Arc::clone(&store), 16).await.unwrap();

    assert_eq!(next(&mut events).await, SyncEvent::Snapshot(Vec::new()));

    cmd.send(SyncCommand::Create {
        title: "worker task".to_string(),
    })
    .await
    .unwrap();

    // The store's snapshot and the applied mutation both arrive; order is
    // not fixed between the two tasks.
    let mut created = None;
    let mut snapshot_seen = false;
    while created.is_none() || !snapshot_seen {
        match next(&mut events).await {
            SyncEvent::Applied(Mutation::Created(task)) => created = Some(task),
            SyncEvent::Snapshot(tasks) => snapshot_seen = tasks.len() == 1,
            other => panic!("unexpected event {other:?}"),
        }
    }
    let created = created.unwrap();
    assert_eq!(created.title, "worker task");
    assert_eq!(store.snapshot(), vec![created]);

    cmd.send(SyncCommand::Shutdown).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.subscriber_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.subscriber_count(), 0);
}
