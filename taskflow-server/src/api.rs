//! REST routes of the task service.
//!
//! | route                     | handler        | auth          |
//! |---------------------------|----------------|---------------|
//! | `GET /api/health`         | [`health`]     | none          |
//! | `GET /api/task?sort=`     | `list_mine`    | bearer        |
//! | `POST /api/task`          | `create_task`  | bearer        |
//! | `GET /api/task/all?sort=` | `list_all`     | bearer, admin |
//! | `PUT /api/task/reorder`   | `reorder`      | bearer        |
//! | `GET /api/task/{id}`      | `get_task`     | bearer        |
//! | `PUT /api/task/{id}`      | `update_task`  | bearer        |
//! | `DELETE /api/task/{id}`   | `delete_task`  | bearer        |
//!
//! Every error is answered with a `{ "message": ... }` body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use taskflow_proto::api::{HealthResponse, MessageResponse, ReorderRequest, SortQuery};
use taskflow_proto::task::{NewTask, Task, TaskId, TaskPatch};

use crate::config::UserEntry;
use crate::store::TaskRepository;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request body or query was malformed.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or unknown bearer token.
    #[error("{0}")]
    Unauthorized(&'static str),
    /// The caller is not an admin.
    #[error("Access denied")]
    Forbidden,
    /// The task does not exist or belongs to someone else.
    #[error("Task not found")]
    NotFound,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() && status != StatusCode::NOT_FOUND {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(format!("Invalid query: {}", rejection.body_text()))
    }
}

/// Shared server state: the repository and the token table.
#[derive(Debug, Default)]
pub struct AppState {
    /// Task storage.
    pub repo: TaskRepository,
    users: HashMap<String, UserEntry>,
}

impl AppState {
    /// Creates state accepting the given users' tokens.
    #[must_use]
    pub fn new(users: Vec<UserEntry>) -> Self {
        Self {
            repo: TaskRepository::new(),
            users: users.into_iter().map(|u| (u.token.clone(), u)).collect(),
        }
    }

    fn user(&self, token: &str) -> Option<&UserEntry> {
        self.users.get(token)
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User id.
    pub id: String,
    /// Admin flag.
    pub admin: bool,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Not authorized, no token"))?;
        let user = state
            .user(token.trim())
            .ok_or(ApiError::Unauthorized("Not authorized, user not found"))?;
        Ok(Self {
            id: user.id.clone(),
            admin: user.admin,
        })
    }
}

/// Builds the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/task", get(list_mine).post(create_task))
        .route("/api/task/all", get(list_all))
        .route("/api/task/reorder", put(reorder))
        .route(
            "/api/task/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .with_state(state)
}

/// `GET /api/health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_mine(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<SortQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query?;
    let tasks = state
        .repo
        .list_for(&user.id, query.sort.unwrap_or_default())
        .await;
    Ok(Json(tasks))
}

async fn list_all(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<SortQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    if !user.admin {
        return Err(ApiError::Forbidden);
    }
    let Query(query) = query?;
    Ok(Json(state.repo.list_all(query.sort.unwrap_or_default()).await))
}

async fn create_task(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(new) = body?;
    let task = state.repo.create(&user.id, new).await;
    tracing::info!(task_id = %task.id, owner = %user.id, "created task");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, ApiError> {
    state
        .repo
        .get(&user.id, &id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn update_task(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<TaskId>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(patch) = body?;
    let task = state
        .repo
        .update(&user.id, &id, &patch)
        .await
        .ok_or(ApiError::NotFound)?;
    tracing::info!(task_id = %id, owner = %user.id, "updated task");
    Ok(Json(task))
}

async fn delete_task(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<TaskId>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.repo.delete(&user.id, &id).await {
        return Err(ApiError::NotFound);
    }
    tracing::info!(task_id = %id, owner = %user.id, "deleted task");
    Ok(Json(MessageResponse::new("Task deleted successfully")))
}

async fn reorder(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let updated = state.repo.reorder(&user.id, &request.tasks).await;
    tracing::info!(owner = %user.id, requested = request.tasks.len(), updated, "reordered tasks");
    Ok(Json(MessageResponse::new("Tasks reordered successfully")))
}

/// Binds `addr` and serves the API in a background task.
///
/// Returns the bound address (useful with port 0) and the server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "task server error");
        }
    });

    Ok((bound_addr, handle))
}
