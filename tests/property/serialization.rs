//! Property-based tests for the task model and store wire format.
//!
//! Uses proptest to verify:
//! 1. Any valid `StoreMessage` survives encode → decode.
//! 2. Random bytes never cause a panic in `decode`.
//! 3. Status labels parse back to the status they came from.
//! 4. `normalize_title` accepts exactly the inputs with visible content.

use kanban_proto::codec;
use kanban_proto::protocol::{FailureReason, StoreMessage};
use kanban_proto::task::{Task, TaskFields, TaskId, TaskPatch, TaskStatus, normalize_title};
use proptest::prelude::*;

// --- Strategies for protocol types ---

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    "[0-9a-f-]{1,36}".prop_map(TaskId::new)
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (arb_task_id(), ".{0,64}", arb_status()).prop_map(|(id, title, status)| Task {
        id,
        title,
        status,
    })
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    prop_oneof![
        ".{0,64}".prop_map(TaskPatch::Title),
        arb_status().prop_map(TaskPatch::Status),
    ]
}

fn arb_reason() -> impl Strategy<Value = FailureReason> {
    prop_oneof![
        Just(FailureReason::NotFound),
        Just(FailureReason::PermissionDenied),
        Just(FailureReason::CollectionFull),
        ".*".prop_map(FailureReason::Invalid),
    ]
}

fn arb_store_message() -> impl Strategy<Value = StoreMessage> {
    prop_oneof![
        ("[a-z-]{0,16}", ".{0,32}").prop_map(|(project_id, access_key)| StoreMessage::Hello {
            project_id,
            access_key,
        }),
        "[A-Za-z]{1,16}".prop_map(|collection| StoreMessage::Subscribe { collection }),
        ("[A-Za-z]{1,16}", prop::collection::vec(arb_task(), 0..16))
            .prop_map(|(collection, tasks)| StoreMessage::Snapshot { collection, tasks }),
        (any::<u64>(), "[A-Za-z]{1,16}", ".{0,64}").prop_map(|(request_id, collection, title)| {
            StoreMessage::Insert {
                request_id,
                collection,
                fields: TaskFields::new_task(title),
            }
        }),
        (any::<u64>(), "[A-Za-z]{1,16}", arb_task_id(), arb_patch()).prop_map(
            |(request_id, collection, id, patch)| StoreMessage::Update {
                request_id,
                collection,
                id,
                patch,
            }
        ),
        (any::<u64>(), arb_task_id()).prop_map(|(request_id, id)| StoreMessage::Inserted {
            request_id,
            id,
        }),
        (any::<u64>(), arb_reason())
            .prop_map(|(request_id, reason)| StoreMessage::Failed { request_id, reason }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid StoreMessage survives an encode → decode round-trip.
    #[test]
    fn store_message_round_trip(msg in arb_store_message()) {
        let bytes = codec::encode(&msg).expect("encode should succeed");
        let decoded = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Random bytes never cause a panic when decoded and return Err instead.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&bytes);
    }

    /// The label of every status parses back to that status.
    #[test]
    fn status_label_parses_back(status in arb_status()) {
        prop_assert_eq!(status.label().parse::<TaskStatus>(), Ok(status));
    }

    /// A title is accepted iff it has non-whitespace content, and the
    /// accepted value carries no surrounding whitespace.
    #[test]
    fn normalize_title_accepts_visible_content(input in "\\PC{0,32}") {
        match normalize_title(&input) {
            Some(title) => {
                prop_assert!(!title.is_empty());
                prop_assert_eq!(title, title.trim());
                prop_assert!(input.contains(title));
            }
            None => prop_assert!(input.trim().is_empty()),
        }
    }
}
