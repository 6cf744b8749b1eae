//! Access to the remote task service.
//!
//! Defines the [`TaskService`] trait the sync engine talks to, and the
//! [`RemoteError`] taxonomy it classifies failures with. Implementations:
//! - [`http::HttpTaskService`]: REST client over reqwest
//! - [`memory::MemoryTaskService`]: in-process service with scriptable
//!   failures, for tests and offline demos

pub mod http;
pub mod memory;

use taskflow_proto::task::{NewTask, ReorderEntry, SortOrder, Task, TaskId, TaskPatch};

/// Errors returned by a [`TaskService`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, if any.
        message: String,
    },

    /// The service could not be reached at all.
    #[error("service unreachable: {0}")]
    Offline(String),

    /// The call did not complete within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// How the sync engine reacts to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retrying cannot help; drop the operation.
    Permanent,
    /// Count the failure against the operation's retry budget.
    Retryable,
    /// The network or service is down; pause and retry later.
    Transient,
}

impl RemoteError {
    /// Builds a status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Classifies this failure.
    ///
    /// 404 and 400 are permanent. Connection failures, timeouts, and 5xx
    /// responses are transient. Everything else (401, 403, 409, malformed
    /// bodies) is retryable.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Status {
                status: 400 | 404, ..
            } => FailureClass::Permanent,
            Self::Status { status, .. } if *status >= 500 => FailureClass::Transient,
            Self::Offline(_) | Self::Timeout => FailureClass::Transient,
            Self::Status { .. } | Self::Decode(_) => FailureClass::Retryable,
        }
    }
}

/// Async interface to the task service.
///
/// Every call carries the session's bearer token. Calls either succeed or
/// fail with a [`RemoteError`]; they never panic. Callers bound each call
/// with their own timeout.
pub trait TaskService: Send + Sync {
    /// Creates a task and returns the stored record with its real id.
    fn create(
        &self,
        token: &str,
        task: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send;

    /// Applies a partial update and returns the updated record.
    fn update(
        &self,
        token: &str,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send;

    /// Deletes a task.
    fn delete(
        &self,
        token: &str,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Replaces the manual order of the listed tasks.
    fn reorder(
        &self,
        token: &str,
        entries: &[ReorderEntry],
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Lists the caller's own tasks.
    fn list_mine(
        &self,
        token: &str,
        sort: SortOrder,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RemoteError>> + Send;

    /// Lists every user's tasks (admin only).
    fn list_all(
        &self,
        token: &str,
        sort: SortOrder,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RemoteError>> + Send;

    /// Checks that the service is reachable.
    fn health(&self) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_bad_request_are_permanent() {
        assert_eq!(
            RemoteError::status(404, "Task not found").class(),
            FailureClass::Permanent
        );
        assert_eq!(
            RemoteError::status(400, "bad").class(),
            FailureClass::Permanent
        );
    }

    #[test]
    fn network_failures_and_server_errors_are_transient() {
        assert_eq!(
            RemoteError::Offline("refused".into()).class(),
            FailureClass::Transient
        );
        assert_eq!(RemoteError::Timeout.class(), FailureClass::Transient);
        assert_eq!(
            RemoteError::status(503, "unavailable").class(),
            FailureClass::Transient
        );
    }

    #[test]
    fn other_failures_are_retryable() {
        for status in [401, 403, 409, 422] {
            assert_eq!(
                RemoteError::status(status, "").class(),
                FailureClass::Retryable,
                "status {status}"
            );
        }
        assert_eq!(
            RemoteError::Decode("eof".into()).class(),
            FailureClass::Retryable
        );
    }
}
