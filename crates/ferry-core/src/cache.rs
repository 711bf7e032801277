use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::model::{Label, Project, Section, Task};
use crate::store::{KeyValueStore, StoreError, get_json, set_json};

pub const TASKS_KEY: &str = "cache.tasks";
pub const PROJECTS_KEY: &str = "cache.projects";
pub const LABELS_KEY: &str = "cache.labels";
pub const SECTIONS_KEY: &str = "cache.sections";
pub const LAST_SYNC_KEY: &str = "cache.last_sync";

const ALL_KEYS: [&str; 5] = [TASKS_KEY, PROJECTS_KEY, LABELS_KEY, SECTIONS_KEY, LAST_SYNC_KEY];

/// Last-known-good copies of the remote collections.
///
/// Each collection is replaced wholesale; there is no merge and no
/// versioning.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    edit_lock: Arc<Mutex<()>>,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            edit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(get_json(self.store.as_ref(), TASKS_KEY)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn replace_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), TASKS_KEY, tasks)
    }

    pub fn projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(get_json(self.store.as_ref(), PROJECTS_KEY)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, projects), fields(count = projects.len()))]
    pub fn replace_projects(&self, projects: &[Project]) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), PROJECTS_KEY, projects)
    }

    pub fn labels(&self) -> Result<Vec<Label>, StoreError> {
        Ok(get_json(self.store.as_ref(), LABELS_KEY)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, labels), fields(count = labels.len()))]
    pub fn replace_labels(&self, labels: &[Label]) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), LABELS_KEY, labels)
    }

    pub fn sections(&self) -> Result<Vec<Section>, StoreError> {
        Ok(get_json(self.store.as_ref(), SECTIONS_KEY)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, sections), fields(count = sections.len()))]
    pub fn replace_sections(&self, sections: &[Section]) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), SECTIONS_KEY, sections)
    }

    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        get_json(self.store.as_ref(), LAST_SYNC_KEY)
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        debug!(%at, "recording last sync");
        set_json(self.store.as_ref(), LAST_SYNC_KEY, &at)
    }

    /// Applies `edit` to the cached task list and writes the result back.
    pub fn update_tasks<F>(&self, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<Task>),
    {
        let _guard = self.edit_lock.lock();
        let mut tasks = self.tasks()?;
        edit(&mut tasks);
        self.replace_tasks(&tasks)
    }

    /// Replaces the provisional copy of a task created offline with the
    /// server's copy, and re-points children at the server id.
    #[tracing::instrument(skip(self, created), fields(remote_id = %created.id))]
    pub fn adopt_created_task(&self, local_id: &str, created: &Task) -> Result<(), StoreError> {
        self.update_tasks(|tasks| {
            for task in tasks.iter_mut() {
                if task.id == local_id {
                    *task = created.clone();
                } else if task.parent_id.as_deref() == Some(local_id) {
                    task.parent_id = Some(created.id.clone());
                }
            }
        })
    }

    /// Drops every cached collection and the last-sync stamp.
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&self) -> Result<(), StoreError> {
        for key in ALL_KEYS {
            self.store.remove(key)?;
        }
        info!("cleared cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use crate::store::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, Cache) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Cache::new(store))
    }

    #[test]
    fn empty_cache_reads_as_empty_collections() {
        let (_, cache) = cache();
        assert!(cache.tasks().expect("tasks").is_empty());
        assert!(cache.projects().expect("projects").is_empty());
        assert_eq!(cache.last_sync().expect("last sync"), None);
    }

    #[test]
    fn replace_overwrites_wholesale() {
        let (_, cache) = cache();
        let a = Task::provisional("1".to_string(), &NewTask::new("a"));
        let b = Task::provisional("2".to_string(), &NewTask::new("b"));
        cache.replace_tasks(&[a, b.clone()]).expect("replace");
        cache.replace_tasks(std::slice::from_ref(&b)).expect("replace");
        assert_eq!(cache.tasks().expect("tasks"), vec![b]);
    }

    #[test]
    fn adopt_created_task_swaps_provisional_copy() {
        let (_, cache) = cache();
        let parent = Task::provisional("local-p".to_string(), &NewTask::new("parent"));
        let child = Task::provisional(
            "local-c".to_string(),
            &NewTask {
                parent_id: Some("local-p".to_string()),
                ..NewTask::new("child")
            },
        );
        cache.replace_tasks(&[parent, child]).expect("replace");

        let mut created = Task::provisional("100".to_string(), &NewTask::new("parent"));
        created.order = 3;
        cache.adopt_created_task("local-p", &created).expect("adopt");

        let tasks = cache.tasks().expect("tasks");
        assert_eq!(tasks[0], created);
        assert_eq!(tasks[1].parent_id.as_deref(), Some("100"));
    }

    #[test]
    fn concurrent_edits_from_clones_all_land() {
        let (_, cache) = cache();
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for n in 0..50 {
                        let id = format!("{worker}-{n}");
                        cache
                            .update_tasks(|tasks| tasks.push(Task::provisional(id, &NewTask::new("t"))))
                            .expect("update");
                    }
                });
            }
        });
        assert_eq!(cache.tasks().expect("tasks").len(), 200);
    }

    #[test]
    fn clear_all_removes_every_key() {
        let (store, cache) = cache();
        cache.replace_labels(&[]).expect("labels");
        cache.set_last_sync(Utc::now()).expect("last sync");
        cache.clear_all().expect("clear");
        assert!(store.keys().is_empty());
    }
}
