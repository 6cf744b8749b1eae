//! In-process [`TaskService`] for tests and offline demos.
//!
//! Mirrors the reference server's semantics (owner scoping, 404 for unknown
//! tasks, owner-local `order` numbering) without any networking. Failures
//! can be scripted per call, the whole service can be switched offline, and
//! calls can be held at a gate to exercise concurrency and timeouts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use taskflow_proto::task::{NewTask, ReorderEntry, SortOrder, Task, TaskId, TaskPatch};
use tokio::sync::watch;

use super::{RemoteError, TaskService};

#[derive(Debug, Default)]
struct ServiceState {
    tasks: Vec<Task>,
    scripted: VecDeque<(Option<&'static str>, RemoteError)>,
    offline: bool,
    calls: Vec<String>,
}

/// In-memory task service.
///
/// Any token is accepted and acts as the caller's user id.
#[derive(Debug)]
pub struct MemoryTaskService {
    state: Mutex<ServiceState>,
    gate: watch::Sender<bool>,
    in_flight: AtomicUsize,
}

impl Default for MemoryTaskService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskService {
    /// Creates an empty, online service.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Mutex::new(ServiceState::default()),
            gate,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Seeds a stored task directly, bypassing create semantics.
    pub fn insert(&self, task: Task) {
        self.state.lock().tasks.push(task);
    }

    /// Snapshot of every stored task, in insertion order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    /// Looks up a stored task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == *id).cloned()
    }

    /// Makes every call fail with [`RemoteError::Offline`] until reset.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Makes the next call fail with `error`. Scripted failures queue up.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().scripted.push_back((None, error));
    }

    /// Makes the next call named `call` (`"update"`, `"list_mine"`, ...)
    /// fail with `error`. Other calls pass it by.
    pub fn fail_next_call(&self, call: &'static str, error: RemoteError) {
        self.state.lock().scripted.push_back((Some(call), error));
    }

    /// Holds every subsequent call until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    /// Lets held calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Names of every call received, in arrival order (`"create"`, ...).
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of calls currently waiting at the gate or executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: &str) -> Result<(), RemoteError> {
        self.state.lock().calls.push(call.to_string());
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|held| !*held).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.offline {
            return Err(RemoteError::Offline("connection refused".to_string()));
        }
        let pos = state
            .scripted
            .iter()
            .position(|(target, _)| target.is_none_or(|name| name == call));
        match pos.and_then(|i| state.scripted.remove(i)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

fn not_found() -> RemoteError {
    RemoteError::status(404, "Task not found")
}

fn sorted(mut tasks: Vec<Task>, sort: SortOrder) -> Vec<Task> {
    match sort {
        SortOrder::Manual => tasks.sort_by_key(|t| t.order),
        SortOrder::Asc => tasks.sort_by(|a, b| a.id.cmp(&b.id)),
        SortOrder::Desc => tasks.sort_by(|a, b| b.id.cmp(&a.id)),
    }
    tasks
}

impl TaskService for MemoryTaskService {
    async fn create(&self, token: &str, task: &NewTask) -> Result<Task, RemoteError> {
        self.enter("create").await?;
        let mut state = self.state.lock();
        let order = state
            .tasks
            .iter()
            .filter(|t| t.owner == token)
            .map(|t| t.order)
            .max()
            .unwrap_or(0)
            + 1;
        let created = Task {
            id: TaskId::issue(),
            title: task.title.clone(),
            description: task.description.clone(),
            completed: false,
            status: None,
            owner: token.to_string(),
            due_date: task.due_date.clone(),
            order,
        };
        state.tasks.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        token: &str,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, RemoteError> {
        self.enter("update").await?;
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == *id && t.owner == token)
            .ok_or_else(not_found)?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), RemoteError> {
        self.enter("delete").await?;
        let mut state = self.state.lock();
        let pos = state
            .tasks
            .iter()
            .position(|t| t.id == *id && t.owner == token)
            .ok_or_else(not_found)?;
        state.tasks.remove(pos);
        Ok(())
    }

    async fn reorder(&self, token: &str, entries: &[ReorderEntry]) -> Result<(), RemoteError> {
        self.enter("reorder").await?;
        let mut state = self.state.lock();
        for entry in entries {
            if let Some(task) = state
                .tasks
                .iter_mut()
                .find(|t| t.id == entry.id && t.owner == token)
            {
                task.order = entry.order;
            }
        }
        Ok(())
    }

    async fn list_mine(&self, token: &str, sort: SortOrder) -> Result<Vec<Task>, RemoteError> {
        self.enter("list_mine").await?;
        let mine: Vec<Task> = self
            .state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.owner == token)
            .cloned()
            .collect();
        Ok(sorted(mine, sort))
    }

    async fn list_all(&self, _token: &str, sort: SortOrder) -> Result<Vec<Task>, RemoteError> {
        self.enter("list_all").await?;
        let all = self.state.lock().tasks.clone();
        Ok(sorted(all, sort))
    }

    async fn health(&self) -> Result<(), RemoteError> {
        if self.state.lock().offline {
            return Err(RemoteError::Offline("connection refused".to_string()));
        }
        Ok(())
    }
}
