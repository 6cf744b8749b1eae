//! End-to-end sync over HTTP against the in-process reference server.
//!
//! The client starts while nothing listens on the service port, queues
//! work offline, and reconciles once the server comes up on that port.
//!
//! Verification command: `cargo test --test http_sync`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use taskflow::cache::FileCache;
use taskflow::remote::http::HttpTaskService;
use taskflow::sync::{DrainOutcome, RetryPolicy};
use taskflow::tasks::{Session, SyncStatus, TaskStore, ViewStatus};
use taskflow_proto::task::{SortOrder, TaskId, TaskPatch, TaskStatus};
use taskflow_server::api::{AppState, start_server_with_state};
use taskflow_server::config::UserEntry;

type Store = TaskStore<HttpTaskService, FileCache>;

// =============================================================================
// Helpers
// =============================================================================

fn users() -> Vec<UserEntry> {
    vec![UserEntry {
        token: "tok-alice".to_string(),
        id: "alice".to_string(),
        admin: false,
    }]
}

fn cache_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("taskflow-http-{name}-{}", TaskId::issue()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Returns an address nothing is listening on.
fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn open(addr: SocketAddr, dir: &PathBuf, token: &str) -> Arc<Store> {
    let service = HttpTaskService::new(&format!("http://{addr}")).unwrap();
    let (store, _events) = TaskStore::open(service, FileCache::new(dir), RetryPolicy::default(), 64);
    store.set_session(Some(Session::new(token, "alice")));
    Arc::new(store)
}

async fn start_server() -> (SocketAddr, Arc<AppState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(AppState::new(users()));
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state, handle)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn offline_work_reaches_server_after_reconnect() {
    let addr = dead_addr();
    let dir = cache_dir("reconnect");
    let store = open(addr, &dir, "tok-alice");

    let temp = store
        .create_task("Write report", "quarterly", Some("2026-06-30".into()))
        .await
        .unwrap();
    assert_eq!(store.pending_count(), 1);
    assert_eq!(store.fetch_tasks().await.unwrap(), ViewStatus::OfflineCached);
    assert!(store.task(&temp).unwrap().is_pending());

    let state = Arc::new(AppState::new(users()));
    let (_, handle) = start_server_with_state(&addr.to_string(), Arc::clone(&state))
        .await
        .unwrap();

    let outcome = store.notify_online().await;
    assert_eq!(outcome, DrainOutcome::Drained { applied: 1, dropped: 0 });
    assert_eq!(store.fetch_tasks().await.unwrap(), ViewStatus::Fresh);

    let view = store.tasks();
    assert_eq!(view.len(), 1);
    assert!(!view[0].is_temp);
    assert_eq!(view[0].owner, "alice");
    assert_eq!(view[0].due_date.as_deref(), Some("2026-06-30"));
    assert_eq!(view[0].sync_status, SyncStatus::Synced);

    let server = state.repo.list_all(SortOrder::Manual).await;
    assert_eq!(server.len(), 1);
    assert_eq!(server[0].id, view[0].id);
    assert_eq!(server[0].description, "quarterly");

    handle.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn online_edits_round_trip() {
    let (addr, state, handle) = start_server().await;
    let dir = cache_dir("online");
    let store = open(addr, &dir, "tok-alice");

    store.create_task("a", "", None).await.unwrap();
    store.create_task("b", "", None).await.unwrap();
    let ids: Vec<TaskId> = store.tasks().into_iter().map(|t| t.id).collect();
    assert!(ids.iter().all(|id| !id.is_temporary()));

    store
        .update_task(&ids[0], TaskPatch::default().with_status(TaskStatus::Completed))
        .await
        .unwrap();
    store.reorder_tasks(&[ids[1].clone()]).await.unwrap();
    assert_eq!(store.pending_count(), 0);

    let server = state.repo.list_for("alice", SortOrder::Manual).await;
    assert_eq!(server[0].id, ids[1]);
    assert!(server[1].completed);

    store.delete_task(&ids[1]).await.unwrap();
    assert_eq!(state.repo.list_all(SortOrder::Manual).await.len(), 1);

    handle.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn server_side_deletion_drops_local_update() {
    let (addr, state, handle) = start_server().await;
    let dir = cache_dir("vanished");
    let store = open(addr, &dir, "tok-alice");

    store.create_task("vanishing", "", None).await.unwrap();
    let id = store.tasks()[0].id.clone();
    assert!(state.repo.delete("alice", &id).await);

    store
        .update_task(&id, TaskPatch::default().with_title("too late"))
        .await
        .unwrap();
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.task(&id).unwrap().sync_status, SyncStatus::Error);

    handle.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unknown_token_counts_as_soft_failure() {
    let (addr, _state, handle) = start_server().await;
    let dir = cache_dir("unauthorized");
    let store = open(addr, &dir, "tok-mallory");

    store.create_task("sneaky", "", None).await.unwrap();
    let ops = store.pending_ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].retries, 1);
    assert!(store.retry_scheduled());

    handle.abort();
    let _ = std::fs::remove_dir_all(&dir);
}
