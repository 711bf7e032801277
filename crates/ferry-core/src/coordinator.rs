use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ApiResult, RemoteTaskApi};
use crate::cache::Cache;
use crate::change::{Mutation, PendingChange};
use crate::connectivity::Connectivity;
use crate::model::Task;
use crate::queue::PendingQueue;
use crate::store::StoreError;

const NOTIFY_CAPACITY: usize = 16;

/// Outcome counts of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success_count: usize,
    pub failed_count: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.success_count == 0 && self.failed_count == 0
    }
}

/// Replays the pending-change queue against the remote API.
///
/// At most one drain runs at a time within the process. The guard is an
/// in-memory flag, not a durable lock.
pub struct SyncCoordinator {
    api: Arc<dyn RemoteTaskApi>,
    queue: PendingQueue,
    cache: Cache,
    connectivity: Arc<dyn Connectivity>,
    draining: AtomicBool,
    completed: broadcast::Sender<SyncReport>,
}

impl SyncCoordinator {
    pub fn new(
        api: Arc<dyn RemoteTaskApi>,
        queue: PendingQueue,
        cache: Cache,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (completed, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            api,
            queue,
            cache,
            connectivity,
            draining: AtomicBool::new(false),
            completed,
        }
    }

    /// Receives a report after every drain that applied at least one change.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.completed.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn queue_size(&self) -> Result<usize, StoreError> {
        self.queue.len()
    }

    /// Drains the queue oldest first. Never fails: per-entry errors are
    /// logged and counted.
    ///
    /// Returns an empty report without touching the queue when another drain
    /// is in flight or the network is down.
    #[instrument(skip(self))]
    pub async fn sync_pending_changes(&self) -> SyncReport {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("drain already in flight; skipping");
            return SyncReport::default();
        };

        if !self.connectivity.is_online() {
            debug!("offline; skipping drain");
            return SyncReport::default();
        }

        let mut entries = match self.queue.dequeue_all() {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "failed to read pending changes");
                return SyncReport::default();
            }
        };
        if entries.is_empty() {
            debug!("nothing to drain");
            return SyncReport::default();
        }

        // Stable, so equal timestamps keep insertion order.
        entries.sort_by_key(|entry| entry.timestamp);
        info!(count = entries.len(), "draining pending changes");

        let mut report = SyncReport::default();
        let mut adopted: Vec<(String, String)> = Vec::new();

        for mut entry in entries {
            for (local, remote) in &adopted {
                entry.mutation.rewrite_task_id(local, remote);
            }

            match apply_mutation(self.api.as_ref(), &entry.mutation).await {
                Ok(created) => {
                    report.success_count += 1;
                    debug!(change_id = %entry.id, kind = %entry.kind(), "applied pending change");
                    self.forget(&entry);
                    if let (Mutation::CreateTask { local_id: Some(local), .. }, Some(task)) =
                        (&entry.mutation, created)
                    {
                        self.adopt(local, &task);
                        adopted.push((local.clone(), task.id));
                    }
                }
                Err(err) if err.is_resource_gone() => {
                    report.failed_count += 1;
                    warn!(
                        change_id = %entry.id,
                        kind = %entry.kind(),
                        error = %err,
                        "target no longer exists; dropping pending change"
                    );
                    self.forget(&entry);
                }
                Err(err) => {
                    report.failed_count += 1;
                    warn!(
                        change_id = %entry.id,
                        kind = %entry.kind(),
                        transient = err.is_transient(),
                        error = %err,
                        "pending change failed; left queued"
                    );
                }
            }
        }

        if report.success_count > 0 {
            if let Err(err) = self.cache.set_last_sync(Utc::now()) {
                error!(error = %err, "failed to record last sync time");
            }
            // No receivers is fine.
            let _ = self.completed.send(report);
        }

        info!(
            success = report.success_count,
            failed = report.failed_count,
            "drain finished"
        );
        report
    }

    fn forget(&self, entry: &PendingChange) {
        // A crash or write failure here means the change replays again
        // later; replay is at-least-once.
        if let Err(err) = self.queue.remove(entry.id) {
            error!(change_id = %entry.id, error = %err, "failed to remove pending change");
        }
    }

    fn adopt(&self, local_id: &str, created: &Task) {
        info!(local_id, remote_id = %created.id, "task created remotely");
        if let Err(err) = self.queue.rewrite_task_id(local_id, &created.id) {
            error!(local_id, error = %err, "failed to re-key queued changes");
        }
        if let Err(err) = self.cache.adopt_created_task(local_id, created) {
            error!(local_id, error = %err, "failed to re-key cached task");
        }
    }
}

/// Maps each mutation kind onto exactly one API call. Creates hand back the
/// server's copy of the task.
pub(crate) async fn apply_mutation(
    api: &dyn RemoteTaskApi,
    mutation: &Mutation,
) -> ApiResult<Option<Task>> {
    match mutation {
        Mutation::CreateTask { task, .. } => api.create_task(task).await.map(Some),
        Mutation::UpdateTask { task_id, patch } => {
            api.update_task(task_id, patch).await.map(|()| None)
        }
        Mutation::DeleteTask { task_id } => api.delete_task(task_id).await.map(|()| None),
        Mutation::CompleteTask { task_id } => api.close_task(task_id).await.map(|()| None),
        Mutation::ReopenTask { task_id } => api.reopen_task(task_id).await.map(|()| None),
    }
}

struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = DrainGuard::acquire(&flag).expect("first acquire");
        assert!(DrainGuard::acquire(&flag).is_none());
        drop(first);
        assert!(DrainGuard::acquire(&flag).is_some());
    }
}
