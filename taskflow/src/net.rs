//! Connectivity monitor.
//!
//! Periodically probes the task service's health endpoint and publishes
//! the result on a [`watch`] channel. The first successful probe drains
//! whatever the store restored from its cache, and every later offline to
//! online transition triggers [`TaskStore::notify_online`], so queued
//! operations go out as soon as the service is reachable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::remote::TaskService;
use crate::tasks::TaskStore;

/// Last observed reachability of the task service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No probe has completed yet.
    #[default]
    Unknown,
    /// The last probe succeeded.
    Online,
    /// The last probe failed.
    Offline,
}

/// Spawns the probe loop.
///
/// The first probe runs immediately, then every `interval`. Each probe is
/// bounded by the store's request timeout. The loop stops when the
/// returned handle is aborted or every receiver is dropped.
///
/// # Panics
///
/// The spawned task panics if `interval` is zero; [`crate::config`]
/// rejects such settings.
pub fn spawn_connectivity_monitor<S, C>(
    store: Arc<TaskStore<S, C>>,
    interval: Duration,
) -> (watch::Receiver<Connectivity>, JoinHandle<()>)
where
    S: TaskService + 'static,
    C: CacheStore + 'static,
{
    let (tx, rx) = watch::channel(Connectivity::Unknown);
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let probe = store.timed(store.service().health()).await;
            let now = if probe.is_ok() {
                Connectivity::Online
            } else {
                Connectivity::Offline
            };
            let previous = tx.send_replace(now);
            if tx.is_closed() {
                break;
            }
            if previous == now {
                continue;
            }
            match (previous, now) {
                (Connectivity::Offline, Connectivity::Online) => {
                    store.notify_online().await;
                }
                (_, Connectivity::Offline) => {
                    if let Err(e) = probe {
                        tracing::info!(error = %e, "task service unreachable");
                    }
                }
                (Connectivity::Unknown, Connectivity::Online) => {
                    tracing::debug!("connectivity established");
                    store.drain().await;
                }
                _ => {}
            }
        }
    });
    (rx, handle)
}
