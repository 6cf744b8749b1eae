//! `taskflow`: offline-first task manager CLI.
//!
//! Every command works offline: changes are applied to the local cache
//! immediately and sent to the task service when it is reachable.
//!
//! ```bash
//! taskflow --token alice add "Buy milk" --due 2026-05-01
//! taskflow --token alice list
//! taskflow --token alice watch      # sync as connectivity comes and goes
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskflow::cache::FileCache;
use taskflow::config::{CliArgs, ClientConfig, Command, default_config_path};
use taskflow::net::{Connectivity, spawn_connectivity_monitor};
use taskflow::remote::http::HttpTaskService;
use taskflow::sync::DrainOutcome;
use taskflow::tasks::{LocalTask, SyncEvent, SyncStatus, TaskStore, ViewStatus};
use taskflow_proto::task::{TaskId, TaskPatch, TaskStatus};

type Store = TaskStore<HttpTaskService, FileCache>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            if let Ok(path) = default_config_path() {
                eprintln!("(default config location: {})", path.display());
            }
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(api_url = %config.api_url, "taskflow starting");

    let service = match HttpTaskService::new(&config.api_url) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: invalid api url {}: {e}", config.api_url);
            return ExitCode::FAILURE;
        }
    };
    let (store, events) = TaskStore::open(
        service,
        FileCache::new(&config.cache_dir),
        config.retry_policy(),
        64,
    );
    store.set_session(config.session());
    let store = Arc::new(store);

    let command = cli.command.unwrap_or(Command::List { all: false });
    let result = run(&store, &config, command, events).await;
    tracing::info!("taskflow exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so stdout carries only command output. The returned
/// [`WorkerGuard`] must be held until shutdown to flush buffered entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskflow.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(
    store: &Arc<Store>,
    config: &ClientConfig,
    command: Command,
    mut events: tokio::sync::mpsc::Receiver<SyncEvent>,
) -> Result<(), String> {
    match command {
        Command::List { all } => {
            let status = if all {
                store.fetch_all_tasks().await
            } else {
                store.fetch_tasks().await
            }
            .map_err(|e| e.to_string())?;
            match status {
                ViewStatus::Fresh => {}
                ViewStatus::OfflineCached => {
                    if let Some(notice) = store.notice() {
                        println!("({notice})");
                    }
                }
                ViewStatus::OfflineEmpty => {
                    return Err(store.error().unwrap_or_default());
                }
            }
            print_tasks(&store.tasks());
        }
        Command::Add {
            title,
            description,
            due,
        } => {
            let id = store
                .create_task(&title, &description, due)
                .await
                .map_err(|e| e.to_string())?;
            let mut shown = id.clone();
            while let Ok(event) = events.try_recv() {
                if let SyncEvent::IdRemapped { temp_id, real_id } = event
                    && temp_id == id
                {
                    shown = real_id;
                }
            }
            println!("added {shown}");
        }
        Command::Edit {
            id,
            title,
            description,
            status,
            due,
        } => {
            let mut patch = TaskPatch {
                title,
                description,
                due_date: due,
                ..TaskPatch::default()
            };
            if let Some(status) = status {
                patch = patch.with_status(status);
            }
            if patch.is_empty() {
                return Err("nothing to change".to_string());
            }
            store
                .update_task(&TaskId::new(id), patch)
                .await
                .map_err(|e| e.to_string())?;
        }
        Command::Done { id } => {
            let patch = TaskPatch::default().with_status(TaskStatus::Completed);
            store
                .update_task(&TaskId::new(id), patch)
                .await
                .map_err(|e| e.to_string())?;
        }
        Command::Rm { id } => {
            store
                .delete_task(&TaskId::new(id))
                .await
                .map_err(|e| e.to_string())?;
        }
        Command::Reorder { ids } => {
            let ids: Vec<TaskId> = ids.into_iter().map(TaskId::new).collect();
            store.reorder_tasks(&ids).await.map_err(|e| e.to_string())?;
            print_tasks(&store.tasks());
        }
        Command::Sort { order } => {
            let order = match order {
                Some(order) => {
                    store.set_sort_order(order);
                    order
                }
                None => store.toggle_sort_order(),
            };
            println!("sort order: {order}");
        }
        Command::Pending => {
            let ops = store.pending_ops();
            if ops.is_empty() {
                println!("nothing pending");
            }
            for op in ops {
                let ids: Vec<&str> = op.kind.task_ids().iter().map(|id| id.as_str()).collect();
                println!("{:<8} {:<3} {}", op.kind, op.retries, ids.join(","));
            }
        }
        Command::Sync => match store.drain().await {
            DrainOutcome::Skipped(reason) => println!("nothing synced ({reason:?})"),
            DrainOutcome::Drained { applied, dropped } => {
                println!("synced: {applied} applied, {dropped} dropped");
            }
            DrainOutcome::Deferred {
                applied,
                dropped,
                retry_in,
            } => println!(
                "partially synced: {applied} applied, {dropped} dropped, {} still pending (service unavailable, retry in {}s)",
                store.pending_count(),
                retry_in.as_secs()
            ),
        },
        Command::Watch => {
            let (mut connectivity, monitor) =
                spawn_connectivity_monitor(Arc::clone(store), config.probe_interval);
            println!("watching {} (Ctrl-C to stop)", config.api_url);
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *connectivity.borrow_and_update();
                        if state != Connectivity::Unknown {
                            println!("connectivity: {state:?}");
                        }
                    }
                    Some(event) = events.recv() => print_event(&event),
                }
            }
            monitor.abort();
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[LocalTask]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let marker = match task.sync_status {
            SyncStatus::Synced => ' ',
            SyncStatus::Pending => '*',
            SyncStatus::Error => '!',
        };
        let due = task.due_date.as_deref().unwrap_or("-");
        println!(
            "{marker} {:<3} {:<34} {:<11} {:<10} {}",
            task.order, task.id, task.status, due, task.title
        );
    }
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Applied { op, task_ids } => println!("synced {op} ({} tasks)", task_ids.len()),
        SyncEvent::IdRemapped { temp_id, real_id } => println!("{temp_id} is now {real_id}"),
        SyncEvent::Dropped { op, reason, .. } => println!("discarded {op}: {reason}"),
        SyncEvent::Deferred { pending, retry_in } => {
            println!("{pending} pending, retrying in {}s", retry_in.as_secs());
        }
    }
}
