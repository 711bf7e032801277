use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::change::{Mutation, PendingChange};
use crate::store::{KeyValueStore, StoreError, get_json, set_json};

pub const QUEUE_KEY: &str = "pending_changes";

/// Durable, ordered staging area for mutations not yet applied remotely.
///
/// Enqueue is called from mutation handlers. Removal belongs to the sync
/// coordinator's drain loop. Clones share one write lock, so every
/// load-modify-save cycle on the stored list is serialized across them.
#[derive(Clone)]
pub struct PendingQueue {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[tracing::instrument(skip(self, mutation), fields(kind = %mutation.kind()))]
    pub fn enqueue(&self, mutation: Mutation) -> Result<PendingChange, StoreError> {
        self.enqueue_at(mutation, Utc::now())
    }

    /// Appends with an explicit clock reading. Timestamps never go backwards
    /// within the queue, so a clock step back is clamped to the last entry.
    pub fn enqueue_at(
        &self,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<PendingChange, StoreError> {
        let result = self.append(mutation, now);

        match result {
            Ok((change, queued)) => {
                info!(change_id = %change.id, kind = %change.kind(), queued, "queued pending change");
                Ok(change)
            }
            Err(err) => {
                error!(error = %err, "failed to persist pending change");
                Err(err)
            }
        }
    }

    /// Ordered snapshot of every queued change. Does not mutate the queue.
    #[tracing::instrument(skip(self))]
    pub fn dequeue_all(&self) -> Result<Vec<PendingChange>, StoreError> {
        self.load()
    }

    /// Deletes one entry by id. Returns false when no such entry exists.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        let Some(idx) = entries.iter().position(|entry| entry.id == id) else {
            debug!(change_id = %id, "pending change already gone");
            return Ok(false);
        };
        entries.remove(idx);
        self.save(&entries)?;
        debug!(change_id = %id, remaining = entries.len(), "removed pending change");
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.store.remove(QUEUE_KEY)?;
        info!("cleared pending changes");
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Re-keys queued references from a locally minted task id to the id
    /// the server assigned. Returns how many entries changed.
    #[tracing::instrument(skip(self))]
    pub fn rewrite_task_id(&self, from: &str, to: &str) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        let mut changed = 0;
        for entry in &mut entries {
            if entry.mutation.rewrite_task_id(from, to) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.save(&entries)?;
            debug!(changed, "rewrote queued task references");
        }
        Ok(changed)
    }

    fn append(
        &self,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<(PendingChange, usize), StoreError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        let timestamp = entries
            .last()
            .map(|last| last.timestamp.max(now))
            .unwrap_or(now);
        let change = PendingChange::new(mutation, timestamp);
        entries.push(change.clone());
        self.save(&entries)?;
        Ok((change, entries.len()))
    }

    fn load(&self) -> Result<Vec<PendingChange>, StoreError> {
        Ok(get_json(self.store.as_ref(), QUEUE_KEY)?.unwrap_or_default())
    }

    fn save(&self, entries: &[PendingChange]) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), QUEUE_KEY, entries)
    }
}
