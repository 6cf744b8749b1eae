//! Retry limits, timeouts, and the single outstanding retry timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Retry and timeout settings for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Soft failures tolerated before an operation is dropped.
    pub max_retries: u32,
    /// Delay before a halted drain is attempted again.
    pub retry_delay: Duration,
    /// Upper bound on a single call to the task service.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Returns `true` once an operation has used up its soft retries.
    #[must_use]
    pub const fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Holds at most one pending retry task.
///
/// Arming replaces (and aborts) any earlier timer. Each armed task is
/// tagged with a generation so that, when it fires, it can clear its own
/// slot with [`RetryTimer::disarm`] without aborting itself.
#[derive(Default)]
pub struct RetryTimer {
    slot: Mutex<Option<Armed>>,
    generation: AtomicU64,
}

impl RetryTimer {
    /// Creates a timer with nothing armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new timer task via `spawn`, aborting any previous one.
    ///
    /// `spawn` receives the generation to pass to [`disarm`](Self::disarm)
    /// when the task fires. The slot is locked while spawning so the new
    /// task cannot observe a stale slot.
    pub fn arm<F>(&self, spawn: F)
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slot = self.slot.lock();
        let handle = spawn(generation);
        if let Some(previous) = slot.replace(Armed { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Clears the slot if it still holds `generation`, without aborting.
    ///
    /// Returns `true` if the slot was cleared.
    pub fn disarm(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|armed| armed.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Aborts the pending timer, if any. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        self.slot.lock().take().is_some_and(|armed| {
            armed.handle.abort();
            true
        })
    }

    /// Returns `true` while a timer is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl std::fmt::Debug for RetryTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTimer")
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
