//! Shared data model for `TaskFlow` clients and the reference task service.

pub mod api;
pub mod codec;
pub mod op;
pub mod task;
