mod support;

use std::sync::Arc;

use ferry_core::auth::TokenStore;
use ferry_core::connectivity::ConnectivityMonitor;
use ferry_core::model::{NewTask, Task, TaskPatch};
use ferry_core::session::{MutationOutcome, Session};
use ferry_core::store::MemoryStore;
use support::{Call, RecordingApi, not_found, server_error};

fn session(online: bool) -> (Arc<RecordingApi>, Arc<MemoryStore>, Arc<ConnectivityMonitor>, Session) {
    let api = RecordingApi::new();
    let store = Arc::new(MemoryStore::new());
    let monitor = Arc::new(ConnectivityMonitor::new(online));
    let session = Session::new(store.clone(), api.clone(), monitor.clone());
    (api, store, monitor, session)
}

fn seed(session: &Session, id: &str) {
    let task = Task::provisional(id.to_string(), &NewTask::new(format!("task {id}")));
    session
        .cache()
        .update_tasks(|tasks| tasks.push(task))
        .expect("seed cache");
}

#[tokio::test]
async fn offline_changes_are_queued_and_reflected_in_cache() {
    let (api, _, monitor, session) = session(false);

    let (task, outcome) = session
        .create_task(NewTask::new("buy milk"))
        .await
        .expect("create");
    assert!(outcome.is_queued());
    assert!(task.id.starts_with("local-"));

    let outcome = session.complete_task(&task.id).await.expect("complete");
    assert!(outcome.is_queued());
    assert!(api.calls().is_empty());
    assert_eq!(session.pending_count().expect("pending"), 2);

    let cached = session.cache().tasks().expect("tasks");
    assert_eq!(cached.len(), 1);
    assert!(cached[0].is_completed);

    monitor.set_online(true);
    let report = session.sync().await;
    assert_eq!(report.success_count, 2);
    assert_eq!(
        api.mutation_calls(),
        vec![Call::Create("buy milk".to_string()), Call::Close("100".to_string())]
    );
    assert_eq!(session.cache().tasks().expect("tasks")[0].id, "100");
    assert_eq!(session.pending_count().expect("pending"), 0);
}

#[tokio::test]
async fn online_with_empty_queue_calls_the_server_directly() {
    let (api, _, _, session) = session(true);
    seed(&session, "42");

    let outcome = session.complete_task("42").await.expect("complete");

    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(api.mutation_calls(), vec![Call::Close("42".to_string())]);
    assert!(session.cache().tasks().expect("tasks")[0].is_completed);
    assert_eq!(session.pending_count().expect("pending"), 0);

    let (task, outcome) = session.create_task(NewTask::new("call mom")).await.expect("create");
    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(task.id, "100");
    assert!(session.cache().tasks().expect("tasks").iter().any(|t| t.id == "100"));
}

#[tokio::test]
async fn queued_changes_are_not_overtaken() {
    let (api, _, monitor, session) = session(false);
    seed(&session, "1");
    session.complete_task("1").await.expect("complete offline");

    monitor.set_online(true);
    let outcome = session.delete_task("1").await.expect("delete");

    assert!(outcome.is_queued());
    assert!(api.calls().is_empty());
    assert!(session.cache().tasks().expect("tasks").is_empty());
    assert_eq!(session.pending_count().expect("pending"), 2);
}

#[tokio::test]
async fn transient_failure_falls_back_to_the_queue() {
    let (api, _, _, session) = session(true);
    seed(&session, "8");
    api.fail("8", server_error);

    let outcome = session
        .update_task(
            "8",
            TaskPatch {
                content: Some("renamed".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .expect("update");

    assert!(outcome.is_queued());
    assert_eq!(session.cache().tasks().expect("tasks")[0].content, "renamed");
    assert_eq!(session.pending_count().expect("pending"), 1);
}

#[tokio::test]
async fn permanent_rejection_is_returned_and_nothing_is_queued() {
    let (api, _, _, session) = session(true);
    seed(&session, "9");
    api.fail("9", not_found);

    let err = session.reopen_task("9").await.expect_err("rejected");

    assert!(err.to_string().contains("reopen_task"));
    assert_eq!(session.pending_count().expect("pending"), 0);
}

#[tokio::test]
async fn empty_patch_is_refused() {
    let (api, _, _, session) = session(true);
    assert!(session.update_task("1", TaskPatch::default()).await.is_err());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn refresh_replaces_cache_and_stamps_last_sync() {
    let (api, _, monitor, session) = session(false);
    assert!(session.refresh().await.is_err());

    monitor.set_online(true);
    api.remote_tasks
        .lock()
        .push(Task::provisional("55".to_string(), &NewTask::new("remote")));
    seed(&session, "stale");

    session.refresh().await.expect("refresh");

    let cache = session.cache();
    let tasks = cache.tasks().expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "55");
    assert_eq!(cache.projects().expect("projects")[0].name, "Inbox");
    assert!(cache.last_sync().expect("last sync").is_some());
}

#[tokio::test]
async fn sign_out_discards_everything() {
    let (_, store, _, session) = session(false);
    TokenStore::new(store.clone()).save("secret").expect("save token");
    seed(&session, "1");
    session.delete_task("1").await.expect("delete");

    session.sign_out().expect("sign out");

    assert!(store.keys().is_empty());
    assert_eq!(session.pending_count().expect("pending"), 0);
}
