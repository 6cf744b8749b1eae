//! REST client for the task service.
//!
//! Speaks the JSON routes served by `taskflow-server`:
//!
//! | call        | route                          |
//! |-------------|--------------------------------|
//! | `health`    | `GET /api/health`              |
//! | `list_mine` | `GET /api/task?sort=`          |
//! | `list_all`  | `GET /api/task/all?sort=`      |
//! | `create`    | `POST /api/task`               |
//! | `update`    | `PUT /api/task/{id}`           |
//! | `delete`    | `DELETE /api/task/{id}`        |
//! | `reorder`   | `PUT /api/task/reorder`        |

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use taskflow_proto::api::{MessageResponse, ReorderRequest};
use taskflow_proto::task::{NewTask, ReorderEntry, SortOrder, Task, TaskId, TaskPatch};
use url::Url;

use super::{RemoteError, TaskService};

/// [`TaskService`] backed by HTTP calls to a task service base URL.
#[derive(Debug, Clone)]
pub struct HttpTaskService {
    client: Client,
    base: Url,
}

impl HttpTaskService {
    /// Creates a client for the service at `base_url` (e.g. `http://127.0.0.1:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// The service base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|e| RemoteError::Offline(format!("invalid endpoint {path}: {e}")))
    }

    fn list_url(&self, path: &str, sort: SortOrder) -> Result<Url, RemoteError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().append_pair("sort", sort.as_str());
        Ok(url)
    }

    fn task_url(&self, id: &TaskId) -> Result<Url, RemoteError> {
        let mut url = self.endpoint("api/task/")?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Offline("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }
}

/// Sends a request and maps transport failures and error statuses.
async fn send(request: RequestBuilder, token: &str) -> Result<Response, RemoteError> {
    let response = request
        .bearer_auth(token)
        .send()
        .await
        .map_err(map_transport_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<MessageResponse>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Offline(err.to_string())
    }
}

impl TaskService for HttpTaskService {
    async fn create(&self, token: &str, task: &NewTask) -> Result<Task, RemoteError> {
        let url = self.endpoint("api/task")?;
        let response = send(self.client.post(url).json(task), token).await?;
        decode(response).await
    }

    async fn update(
        &self,
        token: &str,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, RemoteError> {
        let url = self.task_url(id)?;
        let response = send(self.client.put(url).json(patch), token).await?;
        decode(response).await
    }

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), RemoteError> {
        let url = self.task_url(id)?;
        send(self.client.delete(url), token).await?;
        Ok(())
    }

    async fn reorder(&self, token: &str, entries: &[ReorderEntry]) -> Result<(), RemoteError> {
        let url = self.endpoint("api/task/reorder")?;
        let body = ReorderRequest {
            tasks: entries.to_vec(),
        };
        send(self.client.put(url).json(&body), token).await?;
        Ok(())
    }

    async fn list_mine(&self, token: &str, sort: SortOrder) -> Result<Vec<Task>, RemoteError> {
        let url = self.list_url("api/task", sort)?;
        let response = send(self.client.get(url), token).await?;
        decode(response).await
    }

    async fn list_all(&self, token: &str, sort: SortOrder) -> Result<Vec<Task>, RemoteError> {
        let url = self.list_url("api/task/all", sort)?;
        let response = send(self.client.get(url), token).await?;
        decode(response).await
    }

    async fn health(&self) -> Result<(), RemoteError> {
        let url = self.endpoint("api/health")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RemoteError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
            ))
        }
    }
}
