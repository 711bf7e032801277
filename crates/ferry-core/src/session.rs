use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::api::RemoteTaskApi;
use crate::auth::TokenStore;
use crate::cache::Cache;
use crate::change::{Mutation, PendingChange, new_local_id};
use crate::connectivity::Connectivity;
use crate::coordinator::{SyncCoordinator, SyncReport, apply_mutation};
use crate::model::{NewTask, Task, TaskPatch};
use crate::queue::PendingQueue;
use crate::store::KeyValueStore;

/// How a mutation left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server accepted it.
    Applied,
    /// Staged for the next drain and reflected in the cache already.
    Queued(PendingChange),
}

impl MutationOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }
}

/// Everything one signed-in user needs, wired together explicitly.
pub struct Session {
    queue: PendingQueue,
    cache: Cache,
    tokens: TokenStore,
    api: Arc<dyn RemoteTaskApi>,
    connectivity: Arc<dyn Connectivity>,
    coordinator: Arc<SyncCoordinator>,
}

impl Session {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteTaskApi>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let queue = PendingQueue::new(store.clone());
        let cache = Cache::new(store.clone());
        let tokens = TokenStore::new(store);
        let coordinator = Arc::new(SyncCoordinator::new(
            api.clone(),
            queue.clone(),
            cache.clone(),
            connectivity.clone(),
        ));

        Self {
            queue,
            cache,
            tokens,
            api,
            connectivity,
            coordinator,
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn connectivity(&self) -> Arc<dyn Connectivity> {
        self.connectivity.clone()
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        self.coordinator.clone()
    }

    pub fn pending_count(&self) -> anyhow::Result<usize> {
        self.queue.len().context("failed to read pending changes")
    }

    pub async fn sync(&self) -> SyncReport {
        self.coordinator.sync_pending_changes().await
    }

    /// Fetches every remote collection and overwrites the cache with it.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> anyhow::Result<()> {
        if !self.connectivity.is_online() {
            return Err(anyhow!("cannot refresh while offline"));
        }

        let (tasks, projects, labels, sections) = tokio::try_join!(
            self.api.list_tasks(),
            self.api.list_projects(),
            self.api.list_labels(),
            self.api.list_sections(),
        )
        .context("failed to fetch remote data")?;

        self.cache.replace_tasks(&tasks)?;
        self.cache.replace_projects(&projects)?;
        self.cache.replace_labels(&labels)?;
        self.cache.replace_sections(&sections)?;
        self.cache.set_last_sync(Utc::now())?;

        info!(
            tasks = tasks.len(),
            projects = projects.len(),
            labels = labels.len(),
            sections = sections.len(),
            "refreshed cache"
        );
        Ok(())
    }

    #[instrument(skip(self, task), fields(content_len = task.content.len()))]
    pub async fn create_task(&self, task: NewTask) -> anyhow::Result<(Task, MutationOutcome)> {
        let local_id = new_local_id();
        let provisional = Task::provisional(local_id.clone(), &task);
        let mutation = Mutation::CreateTask {
            task,
            local_id: Some(local_id),
        };

        let (outcome, created) = self.submit(mutation).await?;
        let task = created.unwrap_or(provisional);
        self.patch_cache(|tasks| tasks.push(task.clone()));
        Ok((task, outcome))
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> anyhow::Result<MutationOutcome> {
        if patch.is_empty() {
            return Err(anyhow!("nothing to change for task {task_id}"));
        }
        let (outcome, _) = self
            .submit(Mutation::UpdateTask {
                task_id: task_id.to_string(),
                patch: patch.clone(),
            })
            .await?;
        self.patch_cache(|tasks| {
            if let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) {
                task.apply_patch(&patch);
            }
        });
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn complete_task(&self, task_id: &str) -> anyhow::Result<MutationOutcome> {
        let (outcome, _) = self
            .submit(Mutation::CompleteTask {
                task_id: task_id.to_string(),
            })
            .await?;
        self.patch_cache(|tasks| set_completed(tasks, task_id, true));
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn reopen_task(&self, task_id: &str) -> anyhow::Result<MutationOutcome> {
        let (outcome, _) = self
            .submit(Mutation::ReopenTask {
                task_id: task_id.to_string(),
            })
            .await?;
        self.patch_cache(|tasks| set_completed(tasks, task_id, false));
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: &str) -> anyhow::Result<MutationOutcome> {
        let (outcome, _) = self
            .submit(Mutation::DeleteTask {
                task_id: task_id.to_string(),
            })
            .await?;
        self.patch_cache(|tasks| {
            tasks.retain(|task| task.id != task_id && task.parent_id.as_deref() != Some(task_id))
        });
        Ok(outcome)
    }

    /// Drops the queue, the cache and the saved token.
    #[instrument(skip(self))]
    pub fn sign_out(&self) -> anyhow::Result<()> {
        let pending = self.queue.len().unwrap_or(0);
        if pending > 0 {
            warn!(pending, "signing out with unsynced changes; they are discarded");
        }
        self.queue.clear().context("failed to clear pending changes")?;
        self.cache.clear_all().context("failed to clear cache")?;
        self.tokens.clear().context("failed to clear saved token")?;
        info!("signed out");
        Ok(())
    }

    /// Sends the mutation straight to the server when that is safe, and
    /// stages it otherwise.
    async fn submit(&self, mutation: Mutation) -> anyhow::Result<(MutationOutcome, Option<Task>)> {
        // Direct calls would overtake changes that are already queued.
        let queue_empty = self
            .queue
            .is_empty()
            .context("failed to read pending changes")?;

        if self.connectivity.is_online() && queue_empty && !local_target(&mutation) {
            match apply_mutation(self.api.as_ref(), &mutation).await {
                Ok(created) => return Ok((MutationOutcome::Applied, created)),
                Err(err) if err.is_transient() => {
                    warn!(kind = %mutation.kind(), error = %err, "remote call failed; queueing instead");
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("{} rejected by server", mutation.kind())));
                }
            }
        }

        let change = self
            .queue
            .enqueue(mutation)
            .context("failed to save change for later sync")?;
        Ok((MutationOutcome::Queued(change), None))
    }

    fn patch_cache<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<Task>),
    {
        if let Err(err) = self.cache.update_tasks(edit) {
            warn!(error = %err, "failed to update cached tasks");
        }
    }
}

/// Mutations of a task that only exists locally must wait for its create.
fn local_target(mutation: &Mutation) -> bool {
    mutation.task_id().is_some_and(crate::change::is_local_id)
}

fn set_completed(tasks: &mut [Task], task_id: &str, completed: bool) {
    if let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) {
        task.is_completed = completed;
    }
}
