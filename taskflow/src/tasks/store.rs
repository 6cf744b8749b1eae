//! User-facing task store.
//!
//! [`TaskStore`] owns the task view, the pending-operation log, the sort
//! preference, and the session. User actions mutate the view
//! optimistically, queue a [`PendingOp`], persist both to the cache, and
//! then run a drain (see [`crate::sync::engine`]) so the change reaches the
//! service as soon as it is reachable.
//!
//! The store is shared as `Arc<TaskStore<S, C>>`. Its state sits behind one
//! `parking_lot::Mutex` that is never held across an `.await`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::Mutex;
use taskflow_proto::op::PendingOp;
use taskflow_proto::task::{
    MAX_TASK_TITLE_LENGTH, NewTask, SortOrder, TaskId, TaskPatch, TaskStatus,
};
use tokio::sync::mpsc;

use super::projection::TaskView;
use super::{LocalTask, Session, StoreError, SyncStatus};
use crate::cache::{CacheStore, LocalCache};
use crate::remote::TaskService;
use crate::sync::{PendingLog, RetryPolicy, RetryTimer};

/// Notice shown when a fetch failed but cached tasks are displayed.
pub const OFFLINE_CACHED_NOTICE: &str = "offline, showing cached data";

/// Error shown when a fetch failed and nothing is cached.
pub const OFFLINE_EMPTY_ERROR: &str = "offline, no data available";

/// Outcome of a fetch, as far as the user is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// The view reflects a fresh server listing.
    Fresh,
    /// The service was unreachable; cached tasks are shown.
    OfflineCached,
    /// The service was unreachable and nothing is cached.
    OfflineEmpty,
}

/// Progress notifications from the sync engine.
///
/// Delivered best-effort: if the receiver lags, events are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The service confirmed an operation.
    Applied {
        /// Operation kind (`"create"`, `"update"`, ...).
        op: &'static str,
        /// Tasks the operation touched.
        task_ids: Vec<TaskId>,
    },
    /// A created task received its server id.
    IdRemapped {
        /// Client-generated id.
        temp_id: TaskId,
        /// Server-issued id.
        real_id: TaskId,
    },
    /// An operation was discarded.
    Dropped {
        /// Operation kind.
        op: &'static str,
        /// Tasks the operation touched; they are marked `Error`.
        task_ids: Vec<TaskId>,
        /// Last error from the service.
        reason: String,
    },
    /// The drain halted and will be retried.
    Deferred {
        /// Operations still queued.
        pending: usize,
        /// Delay until the retry.
        retry_in: Duration,
    },
}

/// Which listing a fetch requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchScope {
    Mine,
    All,
}

/// Mutable store state, guarded by [`TaskStore::state`].
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) view: TaskView,
    pub(crate) log: PendingLog,
    pub(crate) sort: SortOrder,
    pub(crate) session: Option<Session>,
    pub(crate) loading: bool,
    pub(crate) error: Option<String>,
    pub(crate) notice: Option<String>,
}

/// Offline-first task store.
pub struct TaskStore<S, C> {
    pub(crate) service: S,
    pub(crate) cache: LocalCache<C>,
    pub(crate) policy: RetryPolicy,
    pub(crate) state: Mutex<StoreState>,
    pub(crate) draining: AtomicBool,
    pub(crate) retry_timer: RetryTimer,
    pub(crate) events: mpsc::Sender<SyncEvent>,
}

impl<S, C> std::fmt::Debug for TaskStore<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("policy", &self.policy)
            .field("retry_timer", &self.retry_timer)
            .finish_non_exhaustive()
    }
}

impl<S, C> TaskStore<S, C>
where
    S: TaskService + 'static,
    C: CacheStore + 'static,
{
    /// Opens a store, restoring the view, log, and sort preference from `cache`.
    ///
    /// Returns the store and a receiver for [`SyncEvent`]s. The store starts
    /// without a session; see [`set_session`](Self::set_session).
    #[must_use]
    pub fn open(
        service: S,
        cache: C,
        policy: RetryPolicy,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let cache = LocalCache::new(cache);
        let sort = cache.load_sort();
        let mut view = TaskView::from_tasks(cache.load_tasks());
        view.sort(sort);
        let log = PendingLog::from_ops(cache.load_pending());
        tracing::debug!(
            tasks = view.len(),
            pending = log.len(),
            sort = %sort,
            "restored task store from cache"
        );

        let (tx, rx) = mpsc::channel(event_buffer.max(1));
        let store = Self {
            service,
            cache,
            policy,
            state: Mutex::new(StoreState {
                view,
                log,
                sort,
                ..StoreState::default()
            }),
            draining: AtomicBool::new(false),
            retry_timer: RetryTimer::new(),
            events: tx,
        };
        (store, rx)
    }

    /// Sets or clears the session used for service calls.
    pub fn set_session(&self, session: Option<Session>) {
        self.state.lock().session = session;
    }

    /// The current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// The underlying task service.
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Retry and timeout settings.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Snapshot of the view in display order.
    #[must_use]
    pub fn tasks(&self) -> Vec<LocalTask> {
        self.state.lock().view.tasks().to_vec()
    }

    /// Looks up a task in the view.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<LocalTask> {
        self.state.lock().view.get(id).cloned()
    }

    /// Snapshot of the pending-operation log, head first.
    #[must_use]
    pub fn pending_ops(&self) -> Vec<PendingOp> {
        self.state.lock().log.ops().iter().cloned().collect()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().log.len()
    }

    /// The current sort preference.
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.state.lock().sort
    }

    /// `true` while a fetch is in progress.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// User-visible error from the last fetch.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// User-visible notice from the last fetch.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.state.lock().notice.clone()
    }

    /// Creates a task optimistically under a temporary id and queues it.
    ///
    /// Returns the temporary id. It is replaced by the server id once the
    /// create is confirmed (see [`SyncEvent::IdRemapped`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session, and
    /// [`StoreError::TitleEmpty`] / [`StoreError::TitleTooLong`] for an
    /// invalid title.
    pub async fn create_task(
        self: &Arc<Self>,
        title: &str,
        description: &str,
        due_date: Option<String>,
    ) -> Result<TaskId, StoreError> {
        let title = validate_title(title)?;
        let temp_id = TaskId::temporary();
        {
            let mut state = self.state.lock();
            let session = state.session.clone().ok_or(StoreError::NotAuthenticated)?;
            let order = state.view.max_order() + 1;
            state.view.push(LocalTask {
                id: temp_id.clone(),
                title: title.clone(),
                description: description.to_string(),
                completed: false,
                status: TaskStatus::Pending,
                owner: session.user_id,
                due_date: due_date.clone(),
                order,
                sync_status: SyncStatus::Pending,
                is_temp: true,
            });
            let sort = state.sort;
            state.view.sort(sort);
            state.log.append(PendingOp::create(
                temp_id.clone(),
                NewTask {
                    title,
                    description: description.to_string(),
                    due_date,
                },
            ));
            self.persist(&state);
        }
        tracing::debug!(task_id = %temp_id, "queued create");
        self.drain().await;
        Ok(temp_id)
    }

    /// Applies a partial update optimistically and queues it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the id is not in the view,
    /// [`StoreError::NotAuthenticated`] without a session, and a title
    /// error if the patch sets an invalid title.
    pub async fn update_task(
        self: &Arc<Self>,
        id: &TaskId,
        mut patch: TaskPatch,
    ) -> Result<(), StoreError> {
        if let Some(title) = &patch.title {
            patch.title = Some(validate_title(title)?);
        }
        {
            let mut state = self.state.lock();
            if state.session.is_none() {
                return Err(StoreError::NotAuthenticated);
            }
            if !state.view.apply_patch(id, &patch) {
                return Err(StoreError::TaskNotFound(id.clone()));
            }
            state.log.append(PendingOp::update(id.clone(), patch));
            self.persist(&state);
        }
        tracing::debug!(task_id = %id, "queued update");
        self.drain().await;
        Ok(())
    }

    /// Removes a task from the view and queues its deletion.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the id is not in the view,
    /// or [`StoreError::NotAuthenticated`] without a session.
    pub async fn delete_task(self: &Arc<Self>, id: &TaskId) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock();
            if state.session.is_none() {
                return Err(StoreError::NotAuthenticated);
            }
            if state.view.remove(id).is_none() {
                return Err(StoreError::TaskNotFound(id.clone()));
            }
            state.log.append(PendingOp::delete(id.clone()));
            self.persist(&state);
        }
        tracing::debug!(task_id = %id, "queued delete");
        self.drain().await;
        Ok(())
    }

    /// Moves the listed tasks to the front, renumbers all tasks, and queues
    /// the new order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session, or
    /// [`StoreError::TaskNotFound`] for the first listed id not in the view.
    pub async fn reorder_tasks(self: &Arc<Self>, ids: &[TaskId]) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock();
            if state.session.is_none() {
                return Err(StoreError::NotAuthenticated);
            }
            if let Some(missing) = ids.iter().find(|id| state.view.get(id).is_none()) {
                return Err(StoreError::TaskNotFound(missing.clone()));
            }
            let entries = state.view.reorder(ids);
            let sort = state.sort;
            state.view.sort(sort);
            tracing::debug!(count = entries.len(), "queued reorder");
            state.log.append(PendingOp::reorder(entries));
            self.persist(&state);
        }
        self.drain().await;
        Ok(())
    }

    /// Fetches the user's own tasks and merges them into the view.
    ///
    /// On success the merged view is persisted and a drain runs. If the
    /// service cannot be reached the cached view is kept and re-sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session; the view
    /// is left untouched.
    pub async fn fetch_tasks(self: &Arc<Self>) -> Result<ViewStatus, StoreError> {
        self.fetch(FetchScope::Mine).await
    }

    /// Fetches every user's tasks (admin view). Behaves like
    /// [`fetch_tasks`](Self::fetch_tasks) otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session and
    /// [`StoreError::NotAdmin`] for a non-admin session; the service is
    /// not called and the view is left untouched.
    pub async fn fetch_all_tasks(self: &Arc<Self>) -> Result<ViewStatus, StoreError> {
        self.fetch(FetchScope::All).await
    }

    async fn fetch(self: &Arc<Self>, scope: FetchScope) -> Result<ViewStatus, StoreError> {
        let (token, sort) = {
            let mut state = self.state.lock();
            let session = state.session.as_ref().ok_or(StoreError::NotAuthenticated)?;
            if scope == FetchScope::All && !session.is_admin {
                return Err(StoreError::NotAdmin);
            }
            let token = session.token.clone();
            state.loading = true;
            (token, state.sort)
        };

        let result = match scope {
            FetchScope::Mine => self.timed(self.service.list_mine(&token, sort)).await,
            FetchScope::All => self.timed(self.service.list_all(&token, sort)).await,
        };

        let status = {
            let mut state = self.state.lock();
            state.loading = false;
            match result {
                Ok(tasks) => {
                    tracing::debug!(count = tasks.len(), ?scope, "fetched tasks");
                    let StoreState { view, log, .. } = &mut *state;
                    view.merge_server(tasks, |id| log.is_pending_delete(id));
                    view.sort(sort);
                    state.error = None;
                    state.notice = None;
                    self.persist(&state);
                    ViewStatus::Fresh
                }
                Err(e) if state.view.is_empty() => {
                    tracing::warn!(error = %e, "fetch failed and no cached tasks");
                    state.error = Some(OFFLINE_EMPTY_ERROR.to_string());
                    state.notice = None;
                    ViewStatus::OfflineEmpty
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fetch failed, showing cached tasks");
                    let sort = state.sort;
                    state.view.sort(sort);
                    state.error = None;
                    state.notice = Some(OFFLINE_CACHED_NOTICE.to_string());
                    ViewStatus::OfflineCached
                }
            }
        };

        if status == ViewStatus::Fresh {
            self.drain().await;
        }
        Ok(status)
    }

    /// Sets the sort preference, persists it, and re-sorts the view.
    pub fn set_sort_order(&self, order: SortOrder) {
        let mut state = self.state.lock();
        state.sort = order;
        state.view.sort(order);
        self.cache.save_sort(order);
        self.cache.save_tasks(state.view.tasks());
    }

    /// Advances the sort preference (manual → desc → asc → manual) and
    /// returns the new value.
    pub fn toggle_sort_order(&self) -> SortOrder {
        let next = self.sort_order().toggled();
        self.set_sort_order(next);
        next
    }

    /// Writes the view and the log through to the cache.
    pub(crate) fn persist(&self, state: &StoreState) {
        self.cache.save_tasks(state.view.tasks());
        self.cache.save_pending(state.log.ops());
    }

    /// Sends an event without waiting; dropped if the receiver lags.
    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.events.try_send(event);
    }
}

/// Trims a title and checks it is non-empty and within the length limit.
fn validate_title(title: &str) -> Result<String, StoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(StoreError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(StoreError::TitleTooLong);
    }
    Ok(trimmed.to_string())
}
