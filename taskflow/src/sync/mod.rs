//! Reconciliation of the pending-operation log with the task service.
//!
//! - [`oplog`]: the FIFO log of unconfirmed mutations
//! - [`retry`]: retry limits, timeouts, and the deferred retry timer
//! - [`engine`]: `drain()`, which replays the log against the service

pub mod engine;
pub mod oplog;
pub mod retry;

pub use oplog::PendingLog;
pub use retry::{RetryPolicy, RetryTimer};

use std::time::Duration;

/// Why a drain did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No session is configured.
    NoSession,
    /// The log was empty.
    EmptyLog,
    /// Another drain is in progress.
    AlreadyRunning,
}

/// Result of one call to `drain()`. Informational only; draining never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was dispatched.
    Skipped(SkipReason),
    /// The log was emptied.
    Drained {
        /// Operations confirmed by the service.
        applied: usize,
        /// Operations dropped as rejected or exhausted.
        dropped: usize,
    },
    /// The drain halted at the head and a retry is scheduled.
    Deferred {
        /// Operations confirmed before halting.
        applied: usize,
        /// Operations dropped before halting.
        dropped: usize,
        /// Delay until the scheduled retry.
        retry_in: Duration,
    },
}

impl DrainOutcome {
    /// Returns `true` if the drain halted and scheduled a retry.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}
