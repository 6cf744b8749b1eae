//! Integration tests for offline edits and reconciliation.
//!
//! Drives a `TaskStore` against the in-process `MemoryTaskService`, going
//! offline and online to exercise temporary-id remapping, single-drain
//! exclusion, permanent-failure handling, cache restarts, and merges.
//!
//! Verification command: `cargo test --test offline_sync`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use taskflow::cache::{CacheKey, LocalCache, MemoryCache};
use taskflow::remote::RemoteError;
use taskflow::remote::memory::MemoryTaskService;
use taskflow::sync::{DrainOutcome, RetryPolicy, SkipReason};
use taskflow::tasks::{Session, StoreError, SyncEvent, SyncStatus, TaskStore, ViewStatus};
use taskflow_proto::op::OpKind;
use taskflow_proto::task::{SortOrder, Task, TaskId, TaskPatch, TaskStatus};
use tokio::sync::mpsc;

type Store = TaskStore<MemoryTaskService, MemoryCache>;

// =============================================================================
// Helpers
// =============================================================================

fn open_with(service: MemoryTaskService, cache: MemoryCache) -> (Arc<Store>, mpsc::Receiver<SyncEvent>) {
    let (store, events) = TaskStore::open(service, cache, RetryPolicy::default(), 256);
    store.set_session(Some(Session::new("alice", "alice")));
    (Arc::new(store), events)
}

fn offline_store() -> Arc<Store> {
    let service = MemoryTaskService::new();
    service.set_offline(true);
    open_with(service, MemoryCache::new()).0
}

fn server_task(id: &str, title: &str, order: i64) -> Task {
    Task {
        id: TaskId::new(id),
        title: title.to_string(),
        description: String::new(),
        completed: false,
        status: Some(TaskStatus::Pending),
        owner: "alice".to_string(),
        due_date: None,
        order,
    }
}

fn drain_events(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Temporary ids
// =============================================================================

#[tokio::test]
async fn later_ops_follow_the_server_id() {
    let store = offline_store();
    let a = store.create_task("A", "", None).await.unwrap();
    let b = store.create_task("B", "", None).await.unwrap();
    store
        .update_task(&a, TaskPatch::default().with_title("A2"))
        .await
        .unwrap();
    store.reorder_tasks(&[b.clone(), a.clone()]).await.unwrap();
    assert_eq!(store.pending_count(), 4);
    assert!(a.is_temporary() && b.is_temporary());

    store.service().set_offline(false);
    let outcome = store.notify_online().await;
    assert_eq!(outcome, DrainOutcome::Drained { applied: 4, dropped: 0 });

    let view = store.tasks();
    assert_eq!(view.len(), 2);
    assert!(view.iter().all(|t| !t.is_temp && !t.id.is_temporary()));
    assert!(view.iter().all(|t| t.sync_status == SyncStatus::Synced));

    let mut server = store.service().tasks();
    server.sort_by_key(|t| t.order);
    let titles: Vec<&str> = server.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["B", "A2"]);
    assert_eq!(
        view.iter().map(|t| &t.id).collect::<Vec<_>>(),
        server.iter().map(|t| &t.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn id_remap_rewrites_queued_ops_and_reports_it() {
    let service = MemoryTaskService::new();
    service.set_offline(true);
    let (store, mut events) = open_with(service, MemoryCache::new());
    let temp = store.create_task("draft", "", None).await.unwrap();
    store.delete_task(&temp).await.unwrap();
    drain_events(&mut events);

    store.service().set_offline(false);
    store.drain().await;

    let events = drain_events(&mut events);
    let real = events
        .iter()
        .find_map(|e| match e {
            SyncEvent::IdRemapped { temp_id, real_id } if *temp_id == temp => Some(real_id.clone()),
            _ => None,
        })
        .expect("remap event");
    assert!(events.contains(&SyncEvent::Applied {
        op: "delete",
        task_ids: vec![real],
    }));
    assert!(store.service().tasks().is_empty());
    assert!(store.tasks().is_empty());
}

// =============================================================================
// Drain exclusion and failure handling
// =============================================================================

#[tokio::test]
async fn concurrent_drain_is_skipped() {
    let service = MemoryTaskService::new();
    service.hold();
    let (store, _events) = open_with(service, MemoryCache::new());

    let creating = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.create_task("held", "", None).await }
    });
    while store.service().in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(store.is_draining());

    assert_eq!(
        store.drain().await,
        DrainOutcome::Skipped(SkipReason::AlreadyRunning)
    );
    assert_eq!(
        store.notify_online().await,
        DrainOutcome::Skipped(SkipReason::AlreadyRunning)
    );

    store.service().release();
    creating.await.unwrap().unwrap();
    assert_eq!(store.service().calls(), ["create"]);
    assert_eq!(store.pending_count(), 0);
    assert!(!store.is_draining());
}

#[tokio::test]
async fn permanent_failure_drops_after_one_attempt() {
    let store = offline_store();
    let doomed = store.create_task("doomed", "", None).await.unwrap();
    let fine = store.create_task("fine", "", None).await.unwrap();

    store.service().set_offline(false);
    store
        .service()
        .fail_next(RemoteError::status(404, "Task not found"));
    let before = store.service().call_count();
    let outcome = store.drain().await;

    assert_eq!(outcome, DrainOutcome::Drained { applied: 1, dropped: 1 });
    assert_eq!(store.service().call_count() - before, 2);
    assert_eq!(store.task(&doomed).unwrap().sync_status, SyncStatus::Error);
    assert!(store.task(&fine).is_none());
    assert_eq!(store.service().tasks().len(), 1);
    assert_eq!(store.pending_count(), 0);
    assert!(!store.retry_scheduled());
}

#[tokio::test]
async fn bad_request_is_permanent_too() {
    let store = offline_store();
    let id = store.create_task("x", "", None).await.unwrap();
    store.service().set_offline(false);
    store
        .service()
        .fail_next(RemoteError::status(400, "Failed to create task"));

    assert_eq!(
        store.drain().await,
        DrainOutcome::Drained { applied: 0, dropped: 1 }
    );
    assert_eq!(store.task(&id).unwrap().sync_status, SyncStatus::Error);
}

#[tokio::test]
async fn soft_failure_counts_retries_and_halts() {
    let store = offline_store();
    store.create_task("conflicted", "", None).await.unwrap();
    store.service().set_offline(false);
    store
        .service()
        .fail_next(RemoteError::status(409, "conflict"));

    let outcome = store.drain().await;
    assert!(outcome.is_deferred());
    assert_eq!(store.pending_ops()[0].retries, 1);
    assert!(store.retry_scheduled());
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn queued_work_survives_restart() {
    let cache = MemoryCache::new();
    {
        let service = MemoryTaskService::new();
        service.set_offline(true);
        let (store, _events) = open_with(service, cache.clone());
        store.create_task("one", "", Some("2026-05-01".into())).await.unwrap();
        store.create_task("two", "", None).await.unwrap();
        store.set_sort_order(SortOrder::Desc);
    }
    assert!(cache.contains(CacheKey::Tasks));
    assert!(cache.contains(CacheKey::PendingOps));

    let (store, _events) = open_with(MemoryTaskService::new(), cache.clone());
    assert_eq!(store.tasks().len(), 2);
    assert_eq!(store.pending_count(), 2);
    assert_eq!(store.sort_order(), SortOrder::Desc);
    assert!(matches!(
        store.pending_ops()[0].kind,
        OpKind::Create { .. }
    ));

    store.drain().await;
    assert_eq!(store.service().tasks().len(), 2);
    assert!(LocalCache::new(cache).load_pending().is_empty());
}

#[tokio::test]
async fn offline_fetch_keeps_cached_view() {
    let service = MemoryTaskService::new();
    service.insert(server_task("t3", "third", 3));
    service.insert(server_task("t1", "first", 1));
    service.insert(server_task("t2", "second", 2));
    let cache = MemoryCache::new();
    {
        let (store, _events) = open_with(service, cache.clone());
        assert_eq!(store.fetch_tasks().await.unwrap(), ViewStatus::Fresh);
    }

    let down = MemoryTaskService::new();
    down.set_offline(true);
    let (store, _events) = open_with(down, cache);
    assert_eq!(store.fetch_tasks().await.unwrap(), ViewStatus::OfflineCached);
    let orders: Vec<i64> = store.tasks().iter().map(|t| t.order).collect();
    assert_eq!(orders, [1, 2, 3]);
    assert!(store.error().is_none());
}

// =============================================================================
// Merge
// =============================================================================

#[tokio::test]
async fn fetch_does_not_clobber_pending_edits() {
    let service = MemoryTaskService::new();
    service.insert(server_task("t1", "server title", 1));
    service.insert(server_task("t2", "to delete", 2));
    let (store, _events) = open_with(service, MemoryCache::new());
    store.fetch_tasks().await.unwrap();

    store.service().set_offline(true);
    store
        .update_task(&TaskId::new("t1"), TaskPatch::default().with_title("local title"))
        .await
        .unwrap();
    store.delete_task(&TaskId::new("t2")).await.unwrap();
    let temp = store.create_task("brand new", "", None).await.unwrap();

    // The listing succeeds but the queued update keeps failing.
    store.service().set_offline(false);
    store
        .service()
        .fail_next_call("update", RemoteError::status(503, "unavailable"));
    assert_eq!(store.fetch_tasks().await.unwrap(), ViewStatus::Fresh);

    let t1 = store.task(&TaskId::new("t1")).unwrap();
    assert_eq!(t1.title, "local title");
    assert_eq!(t1.sync_status, SyncStatus::Pending);
    assert!(store.task(&TaskId::new("t2")).is_none());
    assert!(store.task(&temp).is_some());
    assert_eq!(store.pending_count(), 3);
    assert_eq!(
        store.service().task(&TaskId::new("t1")).unwrap().title,
        "server title"
    );
}

#[tokio::test]
async fn admin_fetch_lists_every_owner() {
    let service = MemoryTaskService::new();
    service.insert(server_task("a1", "alice's", 1));
    let mut foreign = server_task("b1", "bob's", 1);
    foreign.owner = "bob".to_string();
    service.insert(foreign);
    let (store, _events) = open_with(service, MemoryCache::new());

    store.fetch_tasks().await.unwrap();
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(
        store.fetch_all_tasks().await,
        Err(StoreError::NotAdmin)
    );

    store.set_session(Some(Session::new("alice", "alice").admin()));
    store.fetch_all_tasks().await.unwrap();
    assert_eq!(store.tasks().len(), 2);
}
