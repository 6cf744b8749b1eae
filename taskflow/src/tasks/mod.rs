//! Client-side task state: the merged view projection and the store facade
//! that user actions go through.
//!
//! Every user mutation is applied optimistically to the [`TaskView`],
//! queued in the pending-operation log, and then reconciled with the task
//! service by the sync engine.

pub mod projection;
pub mod store;

pub use projection::TaskView;
pub use store::{SyncEvent, TaskStore, ViewStatus};

use serde::{Deserialize, Serialize};
use taskflow_proto::task::{Task, TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned by user actions on the [`TaskStore`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No session is configured; nothing can be sent to the service.
    #[error("not signed in")]
    NotAuthenticated,
    /// The action needs an admin session.
    #[error("admin access required")]
    NotAdmin,
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
    /// Task with the given ID is not in the local view.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Reconciliation state of a task in the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Matches the server.
    #[default]
    Synced,
    /// Has local changes the server has not confirmed yet.
    Pending,
    /// A queued change was rejected or gave up after retries.
    Error,
}

/// Credentials used for every call to the task service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token.
    pub token: String,
    /// Id of the signed-in user; becomes the owner of created tasks.
    pub user_id: String,
    /// Whether the user may list every task.
    pub is_admin: bool,
}

impl Session {
    /// Creates a non-admin session.
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    /// Marks the session as an admin session.
    #[must_use]
    pub const fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// A task as shown to the user: server fields plus local sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTask {
    /// Current id (temporary until the create is confirmed).
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Completion flag, kept consistent with `status`.
    pub completed: bool,
    /// Normalized workflow status.
    pub status: TaskStatus,
    /// Owning user id.
    pub owner: String,
    /// Optional due date.
    pub due_date: Option<String>,
    /// Manual sort key.
    pub order: i64,
    /// Reconciliation state.
    pub sync_status: SyncStatus,
    /// `true` while `id` is a client-generated temporary id.
    pub is_temp: bool,
}

impl LocalTask {
    /// Builds a synced entry from a server record, normalizing its status.
    #[must_use]
    pub fn from_server(task: Task) -> Self {
        let status = task.normalized_status();
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            completed: task.completed,
            status,
            owner: task.owner,
            due_date: task.due_date,
            order: task.order,
            sync_status: SyncStatus::Synced,
            is_temp: false,
        }
    }

    /// Returns `true` if the entry has unconfirmed local changes.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }
}
