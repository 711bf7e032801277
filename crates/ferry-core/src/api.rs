use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::model::{Label, NewTask, Project, Section, Task, TaskPatch};

pub const DEFAULT_BASE_URL: &str = "https://api.todoist.com/rest/v2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("request not authorized (HTTP {0})")]
    Unauthorized(u16),

    #[error("request rejected (HTTP {status}): {body}")]
    Client { status: u16, body: String },

    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let code = status.as_u16();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => ApiError::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(code),
            StatusCode::REQUEST_TIMEOUT => ApiError::Timeout,
            _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                ApiError::Server { status: code, body }
            }
            _ => ApiError::Client { status: code, body },
        }
    }

    /// The target no longer exists; retrying can never succeed.
    pub fn is_resource_gone(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// Failures worth retrying as-is once the network cooperates.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Server { .. } | ApiError::Timeout | ApiError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The operations the remote task service exposes to this client.
#[async_trait]
pub trait RemoteTaskApi: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> ApiResult<Task>;

    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> ApiResult<()>;

    async fn delete_task(&self, task_id: &str) -> ApiResult<()>;

    async fn close_task(&self, task_id: &str) -> ApiResult<()>;

    async fn reopen_task(&self, task_id: &str) -> ApiResult<()>;

    async fn list_tasks(&self) -> ApiResult<Vec<Task>>;

    async fn list_projects(&self) -> ApiResult<Vec<Project>>;

    async fn list_labels(&self) -> ApiResult<Vec<Label>>;

    async fn list_sections(&self) -> ApiResult<Vec<Section>>;

    /// Cheap reachability check.
    async fn ping(&self) -> ApiResult<()>;
}

/// Bearer-token REST client.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTaskApi {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed building HTTP client for task API")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.url(path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!(%method, url = %url, error = %err, "task API request failed");
            ApiError::from(err)
        })?;

        let status = response.status();
        debug!(%method, url = %url, %status, "task API responded");
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(ApiError::from_status(status, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_empty(&self, path: &str) -> ApiResult<()> {
        self.send::<()>(Method::POST, path, None).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteTaskApi for HttpTaskApi {
    #[instrument(skip(self, task), fields(content_len = task.content.len()))]
    async fn create_task(&self, task: &NewTask) -> ApiResult<Task> {
        let response = self.send(Method::POST, "tasks", Some(task)).await?;
        Ok(response.json::<Task>().await?)
    }

    #[instrument(skip(self, patch))]
    async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> ApiResult<()> {
        self.send(Method::POST, &format!("tasks/{task_id}"), Some(patch))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, task_id: &str) -> ApiResult<()> {
        self.send::<()>(Method::DELETE, &format!("tasks/{task_id}"), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_task(&self, task_id: &str) -> ApiResult<()> {
        self.post_empty(&format!("tasks/{task_id}/close")).await
    }

    #[instrument(skip(self))]
    async fn reopen_task(&self, task_id: &str) -> ApiResult<()> {
        self.post_empty(&format!("tasks/{task_id}/reopen")).await
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self) -> ApiResult<Vec<Task>> {
        self.get_json("tasks").await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        self.get_json("projects").await
    }

    #[instrument(skip(self))]
    async fn list_labels(&self) -> ApiResult<Vec<Label>> {
        self.get_json("labels").await
    }

    #[instrument(skip(self))]
    async fn list_sections(&self) -> ApiResult<Vec<Section>> {
        self.get_json("sections").await
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> ApiResult<()> {
        self.send::<()>(Method::GET, "projects", None).await?;
        Ok(())
    }
}
