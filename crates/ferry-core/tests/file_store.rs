use std::sync::Arc;

use ferry_core::cache::Cache;
use ferry_core::change::Mutation;
use ferry_core::model::{NewTask, Task};
use ferry_core::queue::PendingQueue;
use ferry_core::store::{FileStore, KeyValueStore};
use tempfile::tempdir;

#[test]
fn queue_and_cache_survive_a_restart() {
    let temp = tempdir().expect("tempdir");

    let queued = {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::open(temp.path()).expect("open store"));
        let queue = PendingQueue::new(store.clone());
        let cache = Cache::new(store);

        cache
            .replace_tasks(&[Task::provisional("1".to_string(), &NewTask::new("persist me"))])
            .expect("cache tasks");
        let first = queue
            .enqueue(Mutation::CompleteTask {
                task_id: "1".to_string(),
            })
            .expect("enqueue");
        let second = queue
            .enqueue(Mutation::DeleteTask {
                task_id: "1".to_string(),
            })
            .expect("enqueue");
        vec![first, second]
    };

    let store: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(temp.path()).expect("reopen store"));
    let queue = PendingQueue::new(store.clone());
    let cache = Cache::new(store);

    assert_eq!(queue.dequeue_all().expect("dequeue"), queued);
    assert_eq!(cache.tasks().expect("tasks")[0].content, "persist me");

    assert!(queue.remove(queued[0].id).expect("remove"));
    let reopened = PendingQueue::new(Arc::new(FileStore::open(temp.path()).expect("open")));
    assert_eq!(reopened.len().expect("len"), 1);
}

#[test]
fn queue_file_is_plain_json() {
    let temp = tempdir().expect("tempdir");
    let queue = PendingQueue::new(Arc::new(FileStore::open(temp.path()).expect("open store")));
    queue
        .enqueue(Mutation::ReopenTask {
            task_id: "77".to_string(),
        })
        .expect("enqueue");

    let raw = std::fs::read_to_string(temp.path().join("pending_changes.json")).expect("read");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value[0]["mutation"]["type"], "reopen_task");
    assert_eq!(value[0]["mutation"]["payload"]["task_id"], "77");
    assert!(value[0]["timestamp"].is_string());
}
