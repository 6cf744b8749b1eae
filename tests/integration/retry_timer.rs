//! Integration tests for deferred retries.
//!
//! Runs on a paused tokio clock so the 10 s retry delay and 15 s request
//! timeout elapse instantly.
//!
//! Verification command: `cargo test --test retry_timer`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use taskflow::cache::MemoryCache;
use taskflow::remote::RemoteError;
use taskflow::remote::memory::MemoryTaskService;
use taskflow::sync::RetryPolicy;
use taskflow::tasks::{Session, SyncStatus, TaskStore};

type Store = TaskStore<MemoryTaskService, MemoryCache>;

fn open(service: MemoryTaskService) -> Arc<Store> {
    let (store, _events) = TaskStore::open(service, MemoryCache::new(), RetryPolicy::default(), 64);
    store.set_session(Some(Session::new("alice", "alice")));
    Arc::new(store)
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn soft_failures_exhaust_after_three_attempts() {
    let service = MemoryTaskService::new();
    for _ in 0..3 {
        service.fail_next(RemoteError::status(409, "conflict"));
    }
    let store = open(service);
    let id = store.create_task("contested", "", None).await.unwrap();
    assert_eq!(store.pending_ops()[0].retries, 1);

    advance(11).await;
    assert_eq!(store.pending_ops()[0].retries, 2);
    assert!(store.retry_scheduled());

    advance(10).await;
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.service().call_count(), 3);
    assert_eq!(store.task(&id).unwrap().sync_status, SyncStatus::Error);
    assert!(!store.retry_scheduled());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_every_ten_seconds() {
    let service = MemoryTaskService::new();
    service.set_offline(true);
    let store = open(service);
    store.create_task("patient", "", None).await.unwrap();
    assert_eq!(store.service().call_count(), 1);

    advance(35).await;
    assert_eq!(store.service().call_count(), 4);
    assert_eq!(store.pending_ops()[0].retries, 0);
    assert!(store.retry_scheduled());

    store.service().set_offline(false);
    advance(10).await;
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.service().tasks().len(), 1);
    assert!(!store.retry_scheduled());
}

#[tokio::test(start_paused = true)]
async fn new_action_replaces_pending_timer() {
    let service = MemoryTaskService::new();
    service.set_offline(true);
    let store = open(service);
    store.create_task("first", "", None).await.unwrap();

    advance(5).await;
    store.create_task("second", "", None).await.unwrap();
    assert_eq!(store.service().call_count(), 2);

    // The first timer would have fired at 10 s.
    advance(6).await;
    assert_eq!(store.service().call_count(), 2);

    advance(5).await;
    assert_eq!(store.service().call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_service_times_out_and_retries() {
    let service = MemoryTaskService::new();
    service.hold();
    let store = open(service);

    let creating = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.create_task("slow", "", None).await }
    });
    advance(16).await;
    assert!(creating.is_finished());
    creating.await.unwrap().unwrap();
    assert_eq!(store.pending_count(), 1);
    assert_eq!(store.pending_ops()[0].retries, 0);
    assert!(store.retry_scheduled());

    store.service().release();
    advance(10).await;
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.service().tasks().len(), 1);
}
