//! Property-based convergence tests for offline sync.
//!
//! Uses proptest to verify that for any sequence of user actions
//! interleaved with connectivity changes and fetches:
//! 1. Once the service stays reachable, a drain empties the log.
//! 2. The local view and the service then hold the same tasks with the
//!    same content, and every task is marked synced.
//! 3. A fresh fetch and a second drain change nothing.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use taskflow::cache::MemoryCache;
use taskflow::remote::memory::MemoryTaskService;
use taskflow::sync::{DrainOutcome, RetryPolicy, SkipReason};
use taskflow::tasks::{Session, SyncStatus, TaskStore};
use taskflow_proto::task::{TaskId, TaskPatch, TaskStatus};

type Store = TaskStore<MemoryTaskService, MemoryCache>;

/// One step of a generated scenario. Indices pick a task from the current
/// view, modulo its length.
#[derive(Debug, Clone)]
enum Action {
    Create(String),
    Rename(usize, String),
    SetStatus(usize, TaskStatus),
    Delete(usize),
    Reorder(Vec<usize>),
    Offline,
    Online,
    Fetch,
}

fn arb_title() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,11}"
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => arb_title().prop_map(Action::Create),
        2 => (any::<usize>(), arb_title()).prop_map(|(i, t)| Action::Rename(i, t)),
        2 => (any::<usize>(), arb_status()).prop_map(|(i, s)| Action::SetStatus(i, s)),
        1 => any::<usize>().prop_map(Action::Delete),
        1 => prop::collection::vec(any::<usize>(), 1..4).prop_map(Action::Reorder),
        1 => Just(Action::Offline),
        1 => Just(Action::Online),
        1 => Just(Action::Fetch),
    ]
}

fn pick(store: &Store, index: usize) -> Option<TaskId> {
    let tasks = store.tasks();
    if tasks.is_empty() {
        return None;
    }
    Some(tasks[index % tasks.len()].id.clone())
}

async fn apply(store: &Arc<Store>, action: Action) {
    match action {
        Action::Create(title) => {
            store.create_task(&title, "", None).await.unwrap();
        }
        Action::Rename(i, title) => {
            if let Some(id) = pick(store, i) {
                store
                    .update_task(&id, TaskPatch::default().with_title(title))
                    .await
                    .unwrap();
            }
        }
        Action::SetStatus(i, status) => {
            if let Some(id) = pick(store, i) {
                store
                    .update_task(&id, TaskPatch::default().with_status(status))
                    .await
                    .unwrap();
            }
        }
        Action::Delete(i) => {
            if let Some(id) = pick(store, i) {
                store.delete_task(&id).await.unwrap();
            }
        }
        Action::Reorder(picks) => {
            let ids: Vec<TaskId> = picks.iter().filter_map(|&i| pick(store, i)).collect();
            if !ids.is_empty() {
                store.reorder_tasks(&ids).await.unwrap();
            }
        }
        Action::Offline => store.service().set_offline(true),
        Action::Online => store.service().set_offline(false),
        Action::Fetch => {
            store.fetch_tasks().await.unwrap();
        }
    }
}

/// Comparable content of a task: title, description, completed, status.
type Content = (String, String, bool, TaskStatus);

async fn run_scenario(actions: Vec<Action>) -> Arc<Store> {
    let (store, _events) = TaskStore::open(
        MemoryTaskService::new(),
        MemoryCache::new(),
        RetryPolicy::default(),
        1024,
    );
    store.set_session(Some(Session::new("alice", "alice")));
    let store = Arc::new(store);

    for action in actions {
        apply(&store, action).await;
    }

    store.service().set_offline(false);
    store.drain().await;
    store
}

fn local_content(store: &Store) -> BTreeMap<TaskId, Content> {
    store
        .tasks()
        .into_iter()
        .map(|t| (t.id, (t.title, t.description, t.completed, t.status)))
        .collect()
}

fn remote_content(store: &Store) -> BTreeMap<TaskId, Content> {
    store
        .service()
        .tasks()
        .into_iter()
        .map(|t| {
            let status = t.normalized_status();
            (t.id, (t.title, t.description, t.completed, status))
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn view_converges_with_service(actions in prop::collection::vec(arb_action(), 0..24)) {
        let rt = runtime();
        let store = rt.block_on(run_scenario(actions));

        prop_assert_eq!(store.pending_count(), 0);
        let remote = remote_content(&store);
        prop_assert_eq!(&local_content(&store), &remote);
        prop_assert!(store.tasks().iter().all(|t| t.sync_status == SyncStatus::Synced));
        prop_assert!(store.tasks().iter().all(|t| !t.is_temp));

        rt.block_on(store.fetch_tasks()).unwrap();
        prop_assert_eq!(&local_content(&store), &remote);
        let again = rt.block_on(store.drain());
        prop_assert_eq!(again, DrainOutcome::Skipped(SkipReason::EmptyLog));
    }
}
