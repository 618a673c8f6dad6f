//! Property-based tests for the local board.
//!
//! Uses proptest to verify:
//! 1. The column partition is total, disjoint and keeps board order.
//! 2. A snapshot fully replaces local state.
//! 3. Each mutation touches exactly the record it names.
//! 4. Task ids stay unique under any sequence of mutations.

use std::collections::HashSet;

use kanban::board::{Board, Mutation};
use kanban_proto::task::{Task, TaskId, TaskStatus};
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Done),
    ]
}

/// Tasks with unique ids drawn from a small pool so mutations hit them.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::btree_map(0u8..16, (".{1,16}", arb_status()), 0..12).prop_map(|tasks| {
        tasks
            .into_iter()
            .map(|(id, (title, status))| Task {
                id: TaskId::new(format!("t{id}")),
                title,
                status,
            })
            .collect()
    })
}

fn arb_id() -> impl Strategy<Value = TaskId> {
    (0u8..16).prop_map(|id| TaskId::new(format!("t{id}")))
}

fn arb_mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (arb_id(), ".{1,16}", arb_status())
            .prop_map(|(id, title, status)| Mutation::Created(Task { id, title, status })),
        (arb_id(), ".{1,16}").prop_map(|(id, title)| Mutation::Renamed { id, title }),
        arb_id().prop_map(|id| Mutation::Deleted { id }),
        (arb_id(), arb_status()).prop_map(|(id, status)| Mutation::Moved { id, status }),
    ]
}

fn board_with(tasks: Vec<Task>) -> Board {
    let mut board = Board::new();
    board.apply_snapshot(tasks);
    board
}

proptest! {
    #[test]
    fn columns_partition_the_board(tasks in arb_tasks()) {
        let board = board_with(tasks.clone());
        let columns = board.columns();

        let mut total = 0;
        for (status, column) in columns.iter() {
            prop_assert!(column.iter().all(|t| t.status == status));
            let expected: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
            prop_assert_eq!(column, expected.as_slice());
            prop_assert_eq!(board.column(status), expected);
            total += column.len();
        }
        prop_assert_eq!(total, tasks.len());
    }

    #[test]
    fn snapshot_replaces_everything(
        first in arb_tasks(),
        mutations in prop::collection::vec(arb_mutation(), 0..8),
        second in arb_tasks(),
    ) {
        let mut board = board_with(first);
        for m in mutations {
            board.apply(m);
        }
        board.apply_snapshot(second.clone());
        prop_assert_eq!(board.tasks(), second.as_slice());
    }

    #[test]
    fn mutation_touches_only_its_target(tasks in arb_tasks(), mutation in arb_mutation()) {
        let mut board = board_with(tasks.clone());
        let target = mutation.task_id().clone();
        board.apply(mutation.clone());

        for before in tasks.iter().filter(|t| t.id != target) {
            prop_assert_eq!(board.get(&before.id), Some(before));
        }

        let original = tasks.iter().find(|t| t.id == target);
        let after = board.get(&target);
        match (&mutation, original) {
            (Mutation::Created(task), _) => prop_assert_eq!(after, Some(task)),
            (Mutation::Deleted { .. }, _) => prop_assert!(after.is_none()),
            (Mutation::Renamed { title, .. }, Some(orig)) => {
                let after = after.unwrap();
                prop_assert_eq!(&after.title, title);
                prop_assert_eq!(after.status, orig.status);
            }
            (Mutation::Moved { status, .. }, Some(orig)) => {
                let after = after.unwrap();
                prop_assert_eq!(after.status, *status);
                prop_assert_eq!(&after.title, &orig.title);
            }
            (_, None) => prop_assert!(after.is_none()),
        }
    }

    #[test]
    fn ids_stay_unique(
        tasks in arb_tasks(),
        mutations in prop::collection::vec(arb_mutation(), 0..32),
    ) {
        let mut board = board_with(tasks);
        for m in mutations {
            board.apply(m);
            let ids: HashSet<&TaskId> = board.tasks().iter().map(|t| &t.id).collect();
            prop_assert_eq!(ids.len(), board.len());
        }
    }
}
