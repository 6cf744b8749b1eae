//! The merged view of server-confirmed and locally-pending tasks.
//!
//! [`TaskView`] keeps exactly one entry per logical task, keyed by its
//! current id. Entries are kept in display order; [`TaskView::sort`]
//! reorders them according to the user's [`SortOrder`] preference.

use std::collections::HashMap;

use taskflow_proto::task::{ReorderEntry, SortOrder, Task, TaskId, TaskPatch, TaskStatus};

use super::{LocalTask, SyncStatus};

/// Ordered collection of [`LocalTask`]s shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskView {
    tasks: Vec<LocalTask>,
}

impl TaskView {
    /// Creates an empty view.
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Creates a view from previously cached entries, keeping their order.
    #[must_use]
    pub const fn from_tasks(tasks: Vec<LocalTask>) -> Self {
        Self { tasks }
    }

    /// Entries in display order.
    #[must_use]
    pub fn tasks(&self) -> &[LocalTask] {
        &self.tasks
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the view has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up an entry by its current id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&LocalTask> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut LocalTask> {
        self.tasks.iter_mut().find(|t| t.id == *id)
    }

    /// Highest manual sort key in the view, or 0 when empty.
    #[must_use]
    pub fn max_order(&self) -> i64 {
        self.tasks.iter().map(|t| t.order).max().unwrap_or(0)
    }

    /// Appends a new entry.
    pub fn push(&mut self, task: LocalTask) {
        self.tasks.push(task);
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&mut self, id: &TaskId) -> Option<LocalTask> {
        let pos = self.tasks.iter().position(|t| t.id == *id)?;
        Some(self.tasks.remove(pos))
    }

    /// Sets the reconciliation state of an entry. Unknown ids are ignored.
    pub fn set_sync_status(&mut self, id: &TaskId, status: SyncStatus) {
        if let Some(task) = self.get_mut(id) {
            task.sync_status = status;
        }
    }

    /// Replaces a temporary entry's id with the one the server issued.
    ///
    /// Adopts the server's id and owner and clears `is_temp`. Local field
    /// values and the local sort key are kept. An entry already holding the
    /// server id (merged from a listing fetched while the create was in
    /// flight) is dropped in favour of the local one. Returns `false` if no
    /// entry has the temporary id (it was deleted locally in the meantime).
    pub fn replace_id(&mut self, temp_id: &TaskId, confirmed: &Task) -> bool {
        if self.get(temp_id).is_none() {
            return false;
        }
        self.tasks.retain(|t| t.id != confirmed.id);
        let Some(task) = self.get_mut(temp_id) else {
            return false;
        };
        task.id = confirmed.id.clone();
        task.owner.clone_from(&confirmed.owner);
        task.is_temp = false;
        true
    }

    /// Applies a user edit optimistically and marks the entry pending.
    ///
    /// Keeps `completed` and `status` consistent when only one of them is
    /// set. Returns `false` if the id is unknown.
    pub fn apply_patch(&mut self, id: &TaskId, patch: &TaskPatch) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        if let Some(title) = &patch.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            task.description.clone_from(description);
        }
        match (patch.status, patch.completed) {
            (Some(status), _) => {
                task.status = status;
                task.completed = status == TaskStatus::Completed;
            }
            (None, Some(completed)) => {
                task.completed = completed;
                task.status = TaskStatus::from_completed(completed);
            }
            (None, None) => {}
        }
        if let Some(due_date) = &patch.due_date {
            task.due_date = Some(due_date.clone());
        }
        task.sync_status = SyncStatus::Pending;
        true
    }

    /// Merges the fields of a confirmed update into an entry.
    ///
    /// The manual sort key is owned by reorder operations and is not taken
    /// from update responses.
    pub fn merge_confirmed(&mut self, confirmed: &Task) -> bool {
        let Some(task) = self.get_mut(&confirmed.id) else {
            return false;
        };
        task.title.clone_from(&confirmed.title);
        task.description.clone_from(&confirmed.description);
        task.completed = confirmed.completed;
        task.status = confirmed.normalized_status();
        task.owner.clone_from(&confirmed.owner);
        task.due_date.clone_from(&confirmed.due_date);
        true
    }

    /// Moves the listed tasks to the front in the given sequence.
    ///
    /// Unlisted tasks follow in their current order. Every entry is
    /// renumbered with `order = position + 1` and marked pending, and the
    /// full `{id, order}` list is returned for the reorder request. Ids not
    /// present in the view are ignored.
    pub fn reorder(&mut self, ids: &[TaskId]) -> Vec<ReorderEntry> {
        let mut rest = std::mem::take(&mut self.tasks);
        let mut ordered = Vec::with_capacity(rest.len());
        for id in ids {
            if let Some(pos) = rest.iter().position(|t| t.id == *id) {
                ordered.push(rest.remove(pos));
            }
        }
        ordered.append(&mut rest);

        let mut entries = Vec::with_capacity(ordered.len());
        for (pos, task) in (1_i64..).zip(ordered.iter_mut()) {
            task.order = pos;
            task.sync_status = SyncStatus::Pending;
            entries.push(ReorderEntry {
                id: task.id.clone(),
                order: pos,
            });
        }
        self.tasks = ordered;
        entries
    }

    /// Merges a fresh server listing with local pending state.
    ///
    /// Server tasks are inserted first (normalized and synced), in the
    /// order received. Every local entry still pending then replaces its
    /// server counterpart in place, or is appended if the server does not
    /// know it. Server tasks for which `is_deleted_locally` returns `true`
    /// are skipped so a queued delete is not undone by a stale read.
    pub fn merge_server<F>(&mut self, server: Vec<Task>, is_deleted_locally: F)
    where
        F: Fn(&TaskId) -> bool,
    {
        let mut merged: Vec<LocalTask> = server
            .into_iter()
            .filter(|t| !is_deleted_locally(&t.id))
            .map(LocalTask::from_server)
            .collect();
        let mut index: HashMap<TaskId, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        let local = std::mem::take(&mut self.tasks);
        for task in local.into_iter().filter(LocalTask::is_pending) {
            if let Some(&i) = index.get(&task.id) {
                merged[i] = task;
            } else {
                index.insert(task.id.clone(), merged.len());
                merged.push(task);
            }
        }
        self.tasks = merged;
    }

    /// Reorders entries for display.
    ///
    /// Manual sorts by `order` ascending, keeping ties in their current
    /// position. Asc/desc sort by id, which follows creation order.
    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::Manual => self.tasks.sort_by_key(|t| t.order),
            SortOrder::Asc => self.tasks.sort_by(|a, b| a.id.cmp(&b.id)),
            SortOrder::Desc => self.tasks.sort_by(|a, b| b.id.cmp(&a.id)),
        }
    }
}
