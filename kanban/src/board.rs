//! Local board state.
//!
//! [`Board`] is the in-memory mirror of the remote collection. It is rebuilt
//! wholesale from every snapshot and patched with the [`Mutation`] produced
//! by each confirmed remote call. Columns are never stored; they are a filter
//! over the task list computed on demand.

use kanban_proto::task::{Task, TaskId, TaskStatus};

/// Confirmed outcome of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A task was inserted and the store assigned it an id.
    Created(Task),
    /// A task's title changed.
    Renamed {
        /// Task that was renamed.
        id: TaskId,
        /// New title.
        title: String,
    },
    /// A task was removed.
    Deleted {
        /// Task that was removed.
        id: TaskId,
    },
    /// A task moved to another column.
    Moved {
        /// Task that was moved.
        id: TaskId,
        /// Column it now belongs to.
        status: TaskStatus,
    },
}

impl Mutation {
    /// Id of the task the mutation touched.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Created(task) => &task.id,
            Self::Renamed { id, .. } | Self::Deleted { id } | Self::Moved { id, .. } => id,
        }
    }
}

/// A task being edited and its draft title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditState {
    /// Task under edit.
    pub id: TaskId,
    /// Title typed so far.
    pub draft: String,
}

/// Tasks partitioned by status, in [`TaskStatus::ALL`] order.
#[derive(Debug, Default)]
pub struct Columns<'a> {
    columns: [Vec<&'a Task>; 3],
}

impl<'a> Columns<'a> {
    /// Tasks in one column, in board order.
    #[must_use]
    pub fn get(&self, status: TaskStatus) -> &[&'a Task] {
        &self.columns[status.index()]
    }

    /// Iterates `(status, tasks)` pairs left to right.
    pub fn iter(&self) -> impl Iterator<Item = (TaskStatus, &[&'a Task])> + '_ {
        TaskStatus::ALL
            .into_iter()
            .map(move |status| (status, self.get(status)))
    }
}

/// Ordered task list plus edit mode.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Board {
    tasks: Vec<Task>,
    editing: Option<EditState>,
}

impl Board {
    /// An empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All tasks in board order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks a task up by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    /// Replaces the whole task list with a snapshot.
    ///
    /// Edit mode survives only if the edited task is still present.
    pub fn apply_snapshot(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.drop_stale_edit();
    }

    /// Patches local state with a confirmed mutation.
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Created(task) => {
                // The snapshot carrying this task may have landed first.
                if let Some(existing) = self.get_mut(&task.id) {
                    *existing = task;
                } else {
                    self.tasks.push(task);
                }
            }
            Mutation::Renamed { id, title } => {
                if let Some(task) = self.get_mut(&id) {
                    task.title = title;
                }
                if self.editing.as_ref().is_some_and(|e| e.id == id) {
                    self.editing = None;
                }
            }
            Mutation::Deleted { id } => {
                self.tasks.retain(|t| t.id != id);
                self.drop_stale_edit();
            }
            Mutation::Moved { id, status } => {
                if let Some(task) = self.get_mut(&id) {
                    task.status = status;
                }
            }
        }
    }

    /// Tasks split into the three columns.
    #[must_use]
    pub fn columns(&self) -> Columns<'_> {
        let mut columns = Columns::default();
        for task in &self.tasks {
            columns.columns[task.status.index()].push(task);
        }
        columns
    }

    /// Tasks in a single column.
    #[must_use]
    pub fn column(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Current edit mode, if any.
    #[must_use]
    pub const fn editing(&self) -> Option<&EditState> {
        self.editing.as_ref()
    }

    /// Enters edit mode for a task, with the draft set to its title.
    ///
    /// Returns `false` if the task is not on the board.
    pub fn begin_edit(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.get(id) else {
            return false;
        };
        self.editing = Some(EditState {
            id: id.clone(),
            draft: task.title.clone(),
        });
        true
    }

    /// Mutable access to the draft title while editing.
    pub fn edit_draft_mut(&mut self) -> Option<&mut String> {
        self.editing.as_mut().map(|e| &mut e.draft)
    }

    /// Leaves edit mode without saving.
    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    fn drop_stale_edit(&mut self) {
        let stale = self
            .editing
            .as_ref()
            .is_some_and(|e| !self.tasks.iter().any(|t| t.id == e.id));
        if stale {
            self.editing = None;
        }
    }
}
