//! Pending mutation intents queued by an offline-capable client.
//!
//! A [`PendingOp`] records one user mutation that the task service has not
//! confirmed yet. Operations may refer to tasks by a temporary id; once the
//! create that produced such an id is confirmed, every later reference is
//! rewritten with [`PendingOp::remap_id`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::{NewTask, ReorderEntry, TaskId, TaskPatch};

/// What a pending operation does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Create a task that currently exists locally under `temp_id`.
    Create {
        /// Client-generated id of the optimistic task.
        temp_id: TaskId,
        /// Creation payload sent to the service.
        payload: NewTask,
    },
    /// Apply a partial update.
    Update {
        /// Target task (temporary or real id).
        task_id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Delete a task.
    Delete {
        /// Target task (temporary or real id).
        task_id: TaskId,
    },
    /// Replace the manual order of a set of tasks.
    Reorder {
        /// Full list of `{id, order}` pairs.
        entries: Vec<ReorderEntry>,
    },
}

impl OpKind {
    /// Short lowercase name of the operation kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Reorder { .. } => "reorder",
        }
    }

    /// Ids of every task this operation touches.
    #[must_use]
    pub fn task_ids(&self) -> Vec<&TaskId> {
        match self {
            Self::Create { temp_id, .. } => vec![temp_id],
            Self::Update { task_id, .. } | Self::Delete { task_id } => vec![task_id],
            Self::Reorder { entries } => entries.iter().map(|e| &e.id).collect(),
        }
    }

    /// Returns `true` if this operation touches the given task.
    #[must_use]
    pub fn references(&self, id: &TaskId) -> bool {
        match self {
            Self::Create { temp_id, .. } => temp_id == id,
            Self::Update { task_id, .. } | Self::Delete { task_id } => task_id == id,
            Self::Reorder { entries } => entries.iter().any(|e| e.id == *id),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One queued mutation plus its soft-failure count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOp {
    /// The mutation.
    pub kind: OpKind,
    /// Number of non-network failures observed so far.
    pub retries: u32,
}

impl PendingOp {
    /// Wraps a mutation with a zero retry count.
    #[must_use]
    pub const fn new(kind: OpKind) -> Self {
        Self { kind, retries: 0 }
    }

    /// Queues the creation of an optimistic task.
    #[must_use]
    pub const fn create(temp_id: TaskId, payload: NewTask) -> Self {
        Self::new(OpKind::Create { temp_id, payload })
    }

    /// Queues a partial update.
    #[must_use]
    pub const fn update(task_id: TaskId, patch: TaskPatch) -> Self {
        Self::new(OpKind::Update { task_id, patch })
    }

    /// Queues a delete.
    #[must_use]
    pub const fn delete(task_id: TaskId) -> Self {
        Self::new(OpKind::Delete { task_id })
    }

    /// Queues a reorder.
    #[must_use]
    pub const fn reorder(entries: Vec<ReorderEntry>) -> Self {
        Self::new(OpKind::Reorder { entries })
    }

    /// Rewrites every reference to `from` as `to`.
    ///
    /// Covers direct task-id references and entries inside a reorder
    /// payload. A create's own `temp_id` is never rewritten. Returns `true`
    /// if anything changed.
    pub fn remap_id(&mut self, from: &TaskId, to: &TaskId) -> bool {
        match &mut self.kind {
            OpKind::Create { .. } => false,
            OpKind::Update { task_id, .. } | OpKind::Delete { task_id } => {
                if task_id == from {
                    task_id.clone_from(to);
                    true
                } else {
                    false
                }
            }
            OpKind::Reorder { entries } => {
                let mut changed = false;
                for entry in entries.iter_mut().filter(|e| e.id == *from) {
                    entry.id.clone_from(to);
                    changed = true;
                }
                changed
            }
        }
    }
}
