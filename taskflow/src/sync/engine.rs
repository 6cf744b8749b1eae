//! Replays the pending-operation log against the task service.
//!
//! [`TaskStore::drain`] takes operations from the head of the log one at a
//! time and dispatches them in strict FIFO order. Each failure is
//! classified by [`RemoteError::class`]:
//!
//! - permanent: the operation is dropped and its tasks marked `Error`
//! - retryable: the head's retry count is bumped; once it reaches
//!   [`RetryPolicy::max_retries`](super::RetryPolicy) the operation is
//!   dropped, otherwise the drain halts
//! - transient: the drain halts
//!
//! A halted drain leaves the failing operation at the head and schedules a
//! single whole-drain retry after [`RetryPolicy::retry_delay`](super::RetryPolicy).
//!
//! Only one drain runs at a time; a concurrent trigger returns
//! [`SkipReason::AlreadyRunning`] immediately.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use taskflow_proto::op::{OpKind, PendingOp};
use taskflow_proto::task::{Task, TaskId};

use super::{DrainOutcome, PendingLog, SkipReason};
use crate::cache::CacheStore;
use crate::remote::{FailureClass, RemoteError, TaskService};
use crate::tasks::projection::TaskView;
use crate::tasks::store::{StoreState, SyncEvent, TaskStore};
use crate::tasks::SyncStatus;

/// A service confirmation, tagged with what it confirms.
#[derive(Debug)]
enum Confirmed {
    Created { temp_id: TaskId, task: Task },
    Updated(Task),
    Deleted(TaskId),
    Reordered(Vec<TaskId>),
}

impl<S, C> TaskStore<S, C>
where
    S: TaskService + 'static,
    C: CacheStore + 'static,
{
    /// Replays queued operations until the log is empty or a failure halts it.
    ///
    /// Never fails; the outcome is informational. Cancels any pending retry
    /// timer on start and arms a new one if the drain halts.
    pub async fn drain(self: &Arc<Self>) -> DrainOutcome {
        let Some(session) = self.session() else {
            tracing::debug!("drain skipped: no session");
            return DrainOutcome::Skipped(SkipReason::NoSession);
        };
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("drain skipped: already running");
            return DrainOutcome::Skipped(SkipReason::AlreadyRunning);
        }
        self.retry_timer.cancel();

        let mut applied = 0;
        let mut dropped = 0;
        let outcome = loop {
            match self.drain_pass(&session.token).await {
                DrainOutcome::Deferred {
                    applied: a,
                    dropped: d,
                    retry_in,
                } => {
                    self.draining.store(false, Ordering::Release);
                    break DrainOutcome::Deferred {
                        applied: applied + a,
                        dropped: dropped + d,
                        retry_in,
                    };
                }
                DrainOutcome::Drained {
                    applied: a,
                    dropped: d,
                } => {
                    applied += a;
                    dropped += d;
                }
                DrainOutcome::Skipped(_) => {}
            }
            if !self.release_guard() {
                break if applied == 0 && dropped == 0 {
                    DrainOutcome::Skipped(SkipReason::EmptyLog)
                } else {
                    DrainOutcome::Drained { applied, dropped }
                };
            }
            tracing::debug!("operations queued during drain, continuing");
        };

        match outcome {
            DrainOutcome::Deferred { retry_in, .. } => {
                self.schedule_retry();
                tracing::info!(
                    pending = self.pending_count(),
                    retry_in_secs = retry_in.as_secs(),
                    "sync deferred"
                );
            }
            DrainOutcome::Drained { applied, dropped } => {
                tracing::info!(applied, dropped, "pending operations drained");
            }
            DrainOutcome::Skipped(_) => {}
        }
        outcome
    }

    /// Signals that connectivity came back and drains the log.
    pub async fn notify_online(self: &Arc<Self>) -> DrainOutcome {
        tracing::info!("back online");
        self.drain().await
    }

    /// Returns `true` while a drain pass is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Returns `true` while a deferred retry is scheduled.
    #[must_use]
    pub fn retry_scheduled(&self) -> bool {
        self.retry_timer.is_armed()
    }

    /// Clears the drain guard, then takes it back if operations are queued.
    ///
    /// An action that queued an operation while the guard was held got
    /// [`SkipReason::AlreadyRunning`] and relies on the running drain to
    /// pick it up. Returns `true` if the guard was retaken.
    pub(crate) fn release_guard(&self) -> bool {
        self.draining.store(false, Ordering::Release);
        if self.state.lock().log.is_empty() {
            return false;
        }
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs a service call bounded by the request timeout.
    pub(crate) async fn timed<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::time::timeout(self.policy.request_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    async fn drain_pass(self: &Arc<Self>, token: &str) -> DrainOutcome {
        let mut applied = 0;
        let mut dropped = 0;

        loop {
            let head = self.state.lock().log.front().cloned();
            let Some(op) = head else {
                if applied == 0 && dropped == 0 {
                    return DrainOutcome::Skipped(SkipReason::EmptyLog);
                }
                return DrainOutcome::Drained { applied, dropped };
            };

            tracing::debug!(op = %op.kind, retries = op.retries, "dispatching");
            let error = match self.timed(self.dispatch(token, &op.kind)).await {
                Ok(confirmed) => {
                    self.apply_confirmed(confirmed);
                    applied += 1;
                    continue;
                }
                Err(e) => e,
            };

            match error.class() {
                FailureClass::Permanent => {
                    tracing::warn!(op = %op.kind, error = %error, "operation rejected, dropping");
                    self.drop_head(&op, &error);
                    dropped += 1;
                }
                FailureClass::Retryable => {
                    let retries = self.bump_head_retries();
                    if self.policy.is_exhausted(retries) {
                        tracing::error!(
                            op = %op.kind,
                            retries,
                            error = %error,
                            "operation failed too many times, dropping"
                        );
                        self.drop_head(&op, &error);
                        dropped += 1;
                    } else {
                        tracing::warn!(op = %op.kind, retries, error = %error, "operation failed, will retry");
                        return self.defer(applied, dropped);
                    }
                }
                FailureClass::Transient => {
                    tracing::warn!(op = %op.kind, error = %error, "service unavailable, pausing sync");
                    return self.defer(applied, dropped);
                }
            }
        }
    }

    async fn dispatch(&self, token: &str, kind: &OpKind) -> Result<Confirmed, RemoteError> {
        match kind {
            OpKind::Create { temp_id, payload } => {
                let task = self.service.create(token, payload).await?;
                Ok(Confirmed::Created {
                    temp_id: temp_id.clone(),
                    task,
                })
            }
            OpKind::Update { task_id, patch } => {
                let task = self.service.update(token, task_id, patch).await?;
                Ok(Confirmed::Updated(task))
            }
            OpKind::Delete { task_id } => {
                self.service.delete(token, task_id).await?;
                Ok(Confirmed::Deleted(task_id.clone()))
            }
            OpKind::Reorder { entries } => {
                self.service.reorder(token, entries).await?;
                Ok(Confirmed::Reordered(
                    entries.iter().map(|e| e.id.clone()).collect(),
                ))
            }
        }
    }

    /// Pops the confirmed head and folds the result into the view.
    fn apply_confirmed(&self, confirmed: Confirmed) {
        let mut state = self.state.lock();
        let StoreState {
            view, log, sort, ..
        } = &mut *state;
        let popped = log.pop_front();
        let op = popped.as_ref().map_or("unknown", |op| op.kind.name());

        let task_ids = match confirmed {
            Confirmed::Created { temp_id, task } => {
                let rewritten = log.remap_id(&temp_id, &task.id);
                if !view.replace_id(&temp_id, &task) {
                    tracing::debug!(task_id = %temp_id, "created task no longer in view");
                }
                mark_synced(view, log, &task.id);
                tracing::debug!(
                    temp_id = %temp_id,
                    real_id = %task.id,
                    rewritten,
                    "temporary id replaced"
                );
                self.emit(SyncEvent::IdRemapped {
                    temp_id,
                    real_id: task.id.clone(),
                });
                vec![task.id]
            }
            Confirmed::Updated(task) => {
                if !log.references(&task.id) {
                    view.merge_confirmed(&task);
                }
                mark_synced(view, log, &task.id);
                vec![task.id]
            }
            Confirmed::Deleted(id) => vec![id],
            Confirmed::Reordered(ids) => {
                for id in &ids {
                    mark_synced(view, log, id);
                }
                ids
            }
        };
        view.sort(*sort);
        self.persist(&state);
        self.emit(SyncEvent::Applied { op, task_ids });
    }

    /// Removes the failed head and marks the tasks it touched as `Error`.
    fn drop_head(&self, op: &PendingOp, error: &RemoteError) {
        let mut state = self.state.lock();
        state.log.pop_front();
        let task_ids: Vec<TaskId> = op.kind.task_ids().into_iter().cloned().collect();
        for id in &task_ids {
            state.view.set_sync_status(id, SyncStatus::Error);
        }
        self.persist(&state);
        self.emit(SyncEvent::Dropped {
            op: op.kind.name(),
            task_ids,
            reason: error.to_string(),
        });
    }

    /// Increments and persists the head's retry count, returning the new value.
    fn bump_head_retries(&self) -> u32 {
        let mut state = self.state.lock();
        let retries = state.log.front_mut().map_or(0, |head| {
            head.retries += 1;
            head.retries
        });
        self.cache.save_pending(state.log.ops());
        retries
    }

    fn defer(&self, applied: usize, dropped: usize) -> DrainOutcome {
        let retry_in = self.policy.retry_delay;
        self.emit(SyncEvent::Deferred {
            pending: self.pending_count(),
            retry_in,
        });
        DrainOutcome::Deferred {
            applied,
            dropped,
            retry_in,
        }
    }

    /// Arms the retry timer, replacing any pending one.
    fn schedule_retry(self: &Arc<Self>) {
        let delay = self.policy.retry_delay;
        let store = Arc::downgrade(self);
        self.retry_timer.arm(move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let Some(store) = store.upgrade() else {
                    return;
                };
                store.retry_timer.disarm(generation);
                tracing::debug!("retry timer fired");
                store.drain().await;
            })
        });
    }
}

/// Marks a task synced unless a queued operation still references it.
fn mark_synced(view: &mut TaskView, log: &PendingLog, id: &TaskId) {
    let status = if log.references(id) {
        SyncStatus::Pending
    } else {
        SyncStatus::Synced
    };
    view.set_sync_status(id, status);
}
