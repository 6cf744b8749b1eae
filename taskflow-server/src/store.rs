//! In-memory task repository.
//!
//! Tasks are scoped to their owner: update, delete, and reorder only touch
//! tasks created by the caller, and a foreign task looks exactly like a
//! missing one.

use taskflow_proto::task::{NewTask, ReorderEntry, SortOrder, Task, TaskId, TaskPatch, TaskStatus};
use tokio::sync::RwLock;

/// Description stored when a create request leaves it blank.
pub const DEFAULT_DESCRIPTION: &str = "No description";

/// Thread-safe task storage shared by all request handlers.
#[derive(Debug, Default)]
pub struct TaskRepository {
    tasks: RwLock<Vec<Task>>,
}

impl TaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new task for `owner` and returns it.
    ///
    /// A blank title is replaced by `Task <local timestamp>`, a blank
    /// description by [`DEFAULT_DESCRIPTION`]. The task goes after the
    /// owner's existing tasks in manual order.
    pub async fn create(&self, owner: &str, new: NewTask) -> Task {
        let title = match new.title.trim() {
            "" => generated_title(),
            t => t.to_string(),
        };
        let description = match new.description.trim() {
            "" => DEFAULT_DESCRIPTION.to_string(),
            d => d.to_string(),
        };

        let mut tasks = self.tasks.write().await;
        let order = tasks
            .iter()
            .filter(|t| t.owner == owner)
            .map(|t| t.order)
            .max()
            .unwrap_or(0)
            + 1;
        let task = Task {
            id: TaskId::issue(),
            title,
            description,
            completed: false,
            status: Some(TaskStatus::Pending),
            owner: owner.to_string(),
            due_date: new.due_date,
            order,
        };
        tasks.push(task.clone());
        drop(tasks);
        tracing::debug!(task_id = %task.id, owner, order, "task created");
        task
    }

    /// Returns one of `owner`'s tasks.
    pub async fn get(&self, owner: &str, id: &TaskId) -> Option<Task> {
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| t.id == *id && t.owner == owner)
            .cloned()
    }

    /// Applies a patch to one of `owner`'s tasks, returning the updated task.
    pub async fn update(&self, owner: &str, id: &TaskId, patch: &TaskPatch) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == *id && t.owner == owner)?;
        patch.apply_to(task);
        Some(task.clone())
    }

    /// Deletes one of `owner`'s tasks. Returns `false` if there was none.
    pub async fn delete(&self, owner: &str, id: &TaskId) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(pos) = tasks.iter().position(|t| t.id == *id && t.owner == owner) else {
            return false;
        };
        tasks.remove(pos);
        true
    }

    /// Sets the manual order of `owner`'s listed tasks. Entries naming
    /// unknown or foreign tasks are skipped. Returns how many were updated.
    pub async fn reorder(&self, owner: &str, entries: &[ReorderEntry]) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut updated = 0;
        for entry in entries {
            if let Some(task) = tasks
                .iter_mut()
                .find(|t| t.id == entry.id && t.owner == owner)
            {
                task.order = entry.order;
                updated += 1;
            }
        }
        updated
    }

    /// Lists `owner`'s tasks in the requested order.
    pub async fn list_for(&self, owner: &str, sort: SortOrder) -> Vec<Task> {
        let tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        sorted(tasks, sort)
    }

    /// Lists every task.
    pub async fn list_all(&self, sort: SortOrder) -> Vec<Task> {
        let tasks = self.tasks.read().await.clone();
        sorted(tasks, sort)
    }
}

/// Manual sorts by `order`; asc/desc sort by creation time, which issued
/// ids encode.
fn sorted(mut tasks: Vec<Task>, sort: SortOrder) -> Vec<Task> {
    match sort {
        SortOrder::Manual => tasks.sort_by_key(|t| t.order),
        SortOrder::Asc => tasks.sort_by(|a, b| a.id.cmp(&b.id)),
        SortOrder::Desc => tasks.sort_by(|a, b| b.id.cmp(&a.id)),
    }
    tasks
}

fn generated_title() -> String {
    format!("Task {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
}
