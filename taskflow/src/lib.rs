//! `TaskFlow`: offline-first task manager client library.
//!
//! User actions go through [`tasks::TaskStore`], which applies them to a
//! local view at once and queues them for the task service. The sync
//! engine in [`sync`] replays the queue when the service is reachable.

pub mod cache;
pub mod config;
pub mod net;
pub mod remote;
pub mod sync;
pub mod tasks;
