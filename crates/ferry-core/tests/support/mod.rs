#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ferry_core::api::{ApiError, ApiResult, RemoteTaskApi};
use ferry_core::model::{Label, NewTask, Project, Section, Task, TaskPatch};
use ferry_core::store::{KeyValueStore, StoreError};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Update(String),
    Delete(String),
    Close(String),
    Reopen(String),
    List,
    Ping,
}

/// Pauses the first mutation call until released.
pub struct Gate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Records every call and fails the ones it was told to.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, fn() -> ApiError>>,
    gate: Mutex<Option<Gate>>,
    next_id: AtomicU64,
    pub remote_tasks: Mutex<Vec<Task>>,
}

impl RecordingApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(100),
            ..Self::default()
        })
    }

    /// Fails calls targeting `target` (a task id, or a new task's content).
    pub fn fail(&self, target: &str, error: fn() -> ApiError) {
        self.failures.lock().insert(target.to_string(), error);
    }

    pub fn heal(&self, target: &str) {
        self.failures.lock().remove(target);
    }

    pub fn gate(&self) -> (Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock() = Some(Gate {
            started: started.clone(),
            release: release.clone(),
        });
        (started, release)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::List | Call::Ping))
            .collect()
    }

    async fn record(&self, call: Call, target: &str) -> ApiResult<()> {
        self.calls.lock().push(call);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        match self.failures.lock().get(target) {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteTaskApi for RecordingApi {
    async fn create_task(&self, task: &NewTask) -> ApiResult<Task> {
        self.record(Call::Create(task.content.clone()), &task.content)
            .await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let mut created = Task::provisional(id, task);
        created.created_at = Some("2026-01-01T00:00:00Z".to_string());
        self.remote_tasks.lock().push(created.clone());
        Ok(created)
    }

    async fn update_task(&self, task_id: &str, _patch: &TaskPatch) -> ApiResult<()> {
        self.record(Call::Update(task_id.to_string()), task_id).await
    }

    async fn delete_task(&self, task_id: &str) -> ApiResult<()> {
        self.record(Call::Delete(task_id.to_string()), task_id).await
    }

    async fn close_task(&self, task_id: &str) -> ApiResult<()> {
        self.record(Call::Close(task_id.to_string()), task_id).await
    }

    async fn reopen_task(&self, task_id: &str) -> ApiResult<()> {
        self.record(Call::Reopen(task_id.to_string()), task_id).await
    }

    async fn list_tasks(&self) -> ApiResult<Vec<Task>> {
        self.calls.lock().push(Call::List);
        Ok(self.remote_tasks.lock().clone())
    }

    async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        Ok(vec![Project {
            id: "p1".to_string(),
            name: "Inbox".to_string(),
            color: None,
            parent_id: None,
            order: 0,
            is_favorite: false,
            is_inbox_project: true,
        }])
    }

    async fn list_labels(&self) -> ApiResult<Vec<Label>> {
        Ok(vec![])
    }

    async fn list_sections(&self) -> ApiResult<Vec<Section>> {
        Ok(vec![])
    }

    async fn ping(&self) -> ApiResult<()> {
        self.calls.lock().push(Call::Ping);
        Ok(())
    }
}

pub fn server_error() -> ApiError {
    ApiError::Server {
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub fn not_found() -> ApiError {
    ApiError::NotFound
}

pub fn transport_error() -> ApiError {
    ApiError::Transport("connection refused".to_string())
}

/// A store whose writes can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    inner: ferry_core::store::MemoryStore,
    pub writes_fail: std::sync::atomic::AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}
