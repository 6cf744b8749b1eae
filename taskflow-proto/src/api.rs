//! REST request and response bodies that are not plain task records.

use serde::{Deserialize, Serialize};

use crate::task::{ReorderEntry, SortOrder};

/// Body of `PUT /api/task/reorder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    /// New `{id, order}` pairs.
    pub tasks: Vec<ReorderEntry>,
}

/// `{ "message": ... }` body used for errors and plain acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable message.
    pub message: String,
}

impl MessageResponse {
    /// Builds a message body.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the service answers.
    pub status: String,
    /// Service version string.
    pub version: String,
}

/// Query string of the list endpoints (`?sort=`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortQuery {
    /// Requested ordering; manual when absent.
    #[serde(default)]
    pub sort: Option<SortOrder>,
}
