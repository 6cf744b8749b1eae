//! FIFO log of mutations the task service has not confirmed yet.

use std::collections::VecDeque;

use taskflow_proto::op::{OpKind, PendingOp};
use taskflow_proto::task::TaskId;

/// Ordered queue of [`PendingOp`]s.
///
/// User actions append at the tail; only the sync engine touches the head.
/// Entries are never reordered. The owner persists the log after every
/// mutation (see [`crate::cache::LocalCache::save_pending`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingLog {
    ops: VecDeque<PendingOp>,
}

impl PendingLog {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops: VecDeque::new(),
        }
    }

    /// Restores a log loaded from the cache.
    #[must_use]
    pub const fn from_ops(ops: VecDeque<PendingOp>) -> Self {
        Self { ops }
    }

    /// Queued operations, head first.
    #[must_use]
    pub const fn ops(&self) -> &VecDeque<PendingOp> {
        &self.ops
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Adds an operation at the tail.
    pub fn append(&mut self, op: PendingOp) {
        self.ops.push_back(op);
    }

    /// The next operation to dispatch.
    #[must_use]
    pub fn front(&self) -> Option<&PendingOp> {
        self.ops.front()
    }

    /// Mutable access to the head, used to bump its retry count.
    pub fn front_mut(&mut self) -> Option<&mut PendingOp> {
        self.ops.front_mut()
    }

    /// Removes and returns the head.
    pub fn pop_front(&mut self) -> Option<PendingOp> {
        self.ops.pop_front()
    }

    /// Rewrites references to `from` as `to` in every queued operation.
    ///
    /// Called right after the create that issued `to` has been popped, so
    /// the rewrite covers exactly the operations queued after it. Returns
    /// the number of operations changed.
    pub fn remap_id(&mut self, from: &TaskId, to: &TaskId) -> usize {
        self.ops
            .iter_mut()
            .map(|op| op.remap_id(from, to))
            .filter(|changed| *changed)
            .count()
    }

    /// Returns `true` if any queued operation touches the task.
    #[must_use]
    pub fn references(&self, id: &TaskId) -> bool {
        self.ops.iter().any(|op| op.kind.references(id))
    }

    /// Returns `true` if a delete of the task is queued.
    #[must_use]
    pub fn is_pending_delete(&self, id: &TaskId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(&op.kind, OpKind::Delete { task_id } if task_id == id))
    }
}
