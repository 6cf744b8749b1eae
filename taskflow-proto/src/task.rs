//! Task model shared by the client and the task service.
//!
//! JSON field names follow the REST service (`_id`, `createBy`, `dueDate`),
//! so the same types are used for request/response bodies and for the
//! client's cached records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Prefix carried by client-generated ids that the server has not confirmed.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Opaque task identifier.
///
/// Server-issued ids are time-ordered hex strings, so comparing two ids
/// compares their creation time. Client-generated temporary ids carry the
/// [`TEMP_ID_PREFIX`] and sort after every server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a time-ordered id as issued by the task service (UUID v7).
    #[must_use]
    pub fn issue() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Generates a temporary client-side id for a task not yet created remotely.
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Returns `true` if this id was generated by [`TaskId::temporary`].
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Pending,
    /// Actively being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Derives a status from the legacy completion flag.
    #[must_use]
    pub const fn from_completed(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        })
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!(
                "unknown status '{other}' (expected pending, in_progress or completed)"
            )),
        }
    }
}

/// Ordering applied to task lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// User-defined order (the `order` field).
    #[default]
    Manual,
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl SortOrder {
    /// Next mode in the toggle cycle: manual → desc → asc → manual.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Manual => Self::Desc,
            Self::Desc => Self::Asc,
            Self::Asc => Self::Manual,
        }
    }

    /// Query-string form used by the REST service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!(
                "unknown sort order '{other}' (expected manual, asc or desc)"
            )),
        }
    }
}

/// A task as stored by the task service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Legacy completion flag, kept alongside `status`.
    #[serde(default)]
    pub completed: bool,
    /// Workflow status. Older records may omit it.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Id of the owning user.
    #[serde(rename = "createBy", default)]
    pub owner: String,
    /// Optional due date (ISO-8601 date or date-time).
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<String>,
    /// Manual sort key.
    #[serde(default)]
    pub order: i64,
}

impl Task {
    /// Returns the task's status, falling back to the completion flag.
    #[must_use]
    pub fn normalized_status(&self) -> TaskStatus {
        self.status
            .unwrap_or_else(|| TaskStatus::from_completed(self.completed))
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    /// Title of the new task.
    #[serde(default)]
    pub title: String,
    /// Description of the new task.
    #[serde(default)]
    pub description: String,
    /// Optional due date.
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<String>,
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New completion flag.
    #[serde(default)]
    pub completed: Option<bool>,
    /// New workflow status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// New due date.
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<String>,
}

impl TaskPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the status and keeps the completion flag consistent with it.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self.completed = Some(status == TaskStatus::Completed);
        self
    }

    /// Sets the due date.
    #[must_use]
    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }

    /// Applies this patch to a server-side task record.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(status) = self.status {
            task.status = Some(status);
        }
        if let Some(due_date) = &self.due_date {
            task.due_date = Some(due_date.clone());
        }
    }
}

/// One `{id, order}` pair of a reorder request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderEntry {
    /// Task being moved.
    #[serde(rename = "_id")]
    pub id: TaskId,
    /// Its new manual sort key.
    pub order: i64,
}
