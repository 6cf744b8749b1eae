//! `TaskFlow` reference task service library.
//!
//! An in-memory REST service with per-user ownership and an admin-only
//! listing of every task. Exposed as a library so integration tests can run
//! it in-process.

pub mod api;
pub mod config;
pub mod store;
