//! Durable local cache for the client's task state.
//!
//! Three records survive restarts: the task snapshot, the pending-operation
//! log, and the sort preference. [`CacheStore`] is the raw key-value layer;
//! [`LocalCache`] encodes the typed records on top of it.
//!
//! Cache writes are a side-effect mirror: a failed write is logged and never
//! aborts the user action that caused it. A record that fails to decode at
//! startup is treated as absent.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use taskflow_proto::codec;
use taskflow_proto::op::PendingOp;
use taskflow_proto::task::SortOrder;

use crate::tasks::LocalTask;

/// Errors from the raw cache layer.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading or writing the backing storage failed.
    #[error("cache I/O error for {key}: {source}")]
    Io {
        /// Record being accessed.
        key: CacheKey,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("cache codec error for {key}: {source}")]
    Codec {
        /// Record being accessed.
        key: CacheKey,
        /// Underlying codec error.
        source: codec::CodecError,
    },
}

/// Name of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Snapshot of the task view.
    Tasks,
    /// The pending-operation log.
    PendingOps,
    /// The user's sort preference.
    SortOrder,
}

impl CacheKey {
    /// Storage key, also used as the file name by [`FileCache`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks_cache",
            Self::PendingOps => "tasks_pending_ops",
            Self::SortOrder => "tasks_sort_order",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw byte storage keyed by [`CacheKey`].
///
/// Calls are synchronous and short; implementations are expected to be
/// called with the store's state lock held.
pub trait CacheStore: Send + Sync {
    /// Reads a record, returning `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the backing storage cannot be read.
    fn load(&self, key: CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replaces a record.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the backing storage cannot be written.
    fn store(&self, key: CacheKey, bytes: &[u8]) -> Result<(), CacheError>;
}

/// One file per record in a directory.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// record, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Uses `dir` as the cache directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

impl CacheStore for FileCache {
    fn load(&self, key: CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io { key, source }),
        }
    }

    fn store(&self, key: CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let io = |source| CacheError::Io { key, source };
        std::fs::create_dir_all(&self.dir).map_err(io)?;
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(io)?;
        std::fs::rename(&tmp, &path).map_err(io)
    }
}

/// In-memory cache for tests.
///
/// Clones share the same storage, so a second store opened over a clone
/// sees what the first one persisted (simulating a restart).
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    records: Arc<Mutex<HashMap<CacheKey, Vec<u8>>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the record has been written.
    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        self.records.lock().contains_key(&key)
    }
}

impl CacheStore for MemoryCache {
    fn load(&self, key: CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.records.lock().get(&key).cloned())
    }

    fn store(&self, key: CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        self.records.lock().insert(key, bytes.to_vec());
        Ok(())
    }
}

/// Typed access to the three cached records.
#[derive(Debug, Clone)]
pub struct LocalCache<C> {
    inner: C,
}

impl<C: CacheStore> LocalCache<C> {
    /// Wraps a raw cache store.
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    /// The underlying raw store.
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    /// Loads the task snapshot; missing or unreadable records yield an empty list.
    pub fn load_tasks(&self) -> Vec<LocalTask> {
        self.read(CacheKey::Tasks).unwrap_or_default()
    }

    /// Loads the pending-operation log.
    pub fn load_pending(&self) -> VecDeque<PendingOp> {
        self.read(CacheKey::PendingOps).unwrap_or_default()
    }

    /// Loads the sort preference, defaulting to manual.
    pub fn load_sort(&self) -> SortOrder {
        self.read(CacheKey::SortOrder).unwrap_or_default()
    }

    /// Persists the task snapshot.
    pub fn save_tasks(&self, tasks: &[LocalTask]) {
        self.write(CacheKey::Tasks, &tasks);
    }

    /// Persists the pending-operation log.
    pub fn save_pending(&self, ops: &VecDeque<PendingOp>) {
        self.write(CacheKey::PendingOps, ops);
    }

    /// Persists the sort preference.
    pub fn save_sort(&self, sort: SortOrder) {
        self.write(CacheKey::SortOrder, &sort);
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let bytes = match self.inner.load(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                return None;
            }
        };
        match codec::decode(&bytes) {
            Ok(value) => Some(value),
            Err(source) => {
                let err = CacheError::Codec { key, source };
                tracing::warn!(error = %err, "discarding unreadable cache record");
                None
            }
        }
    }

    fn write<T: serde::Serialize>(&self, key: CacheKey, value: &T) {
        let result = codec::encode(value)
            .map_err(|source| CacheError::Codec { key, source })
            .and_then(|bytes| self.inner.store(key, &bytes));
        if let Err(e) = result {
            tracing::warn!(key = %key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use taskflow_proto::task::{Task, TaskId};

    use super::*;
    use crate::tasks::SyncStatus;

    fn sample_task(id: &str) -> LocalTask {
        let mut task = LocalTask::from_server(Task {
            id: TaskId::new(id),
            title: "Water plants".to_string(),
            description: "balcony".to_string(),
            completed: false,
            status: None,
            owner: "u1".to_string(),
            due_date: Some("2026-05-01".to_string()),
            order: 2,
        });
        task.sync_status = SyncStatus::Pending;
        task
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "taskflow-cache-{name}-{}",
            TaskId::temporary()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn memory_cache_clones_share_records() {
        let cache = MemoryCache::new();
        let typed = LocalCache::new(cache.clone());
        typed.save_sort(SortOrder::Asc);
        assert!(cache.contains(CacheKey::SortOrder));
        assert_eq!(LocalCache::new(cache).load_sort(), SortOrder::Asc);
    }

    #[test]
    fn missing_records_load_as_defaults() {
        let cache = LocalCache::new(MemoryCache::new());
        assert!(cache.load_tasks().is_empty());
        assert!(cache.load_pending().is_empty());
        assert_eq!(cache.load_sort(), SortOrder::Manual);
    }

    #[test]
    fn corrupted_record_loads_as_default() {
        let raw = MemoryCache::new();
        raw.store(CacheKey::Tasks, &[0xff, 0xff, 0xff]).unwrap();
        assert!(LocalCache::new(raw).load_tasks().is_empty());
    }

    #[test]
    fn file_cache_persists_across_instances() {
        let dir = temp_dir("persist");
        let cache = LocalCache::new(FileCache::new(&dir));
        cache.save_tasks(&[sample_task("a")]);
        let mut ops = VecDeque::new();
        ops.push_back(PendingOp::delete(TaskId::new("b")));
        cache.save_pending(&ops);

        let reopened = LocalCache::new(FileCache::new(&dir));
        assert_eq!(reopened.load_tasks(), vec![sample_task("a")]);
        assert_eq!(reopened.load_pending(), ops);
        assert!(dir.join("tasks_cache").exists());
        assert!(!dir.join("tasks_cache.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_cache_missing_dir_loads_none() {
        let dir = temp_dir("missing");
        let cache = FileCache::new(&dir);
        assert!(cache.load(CacheKey::PendingOps).unwrap().is_none());
    }

    #[test]
    fn failed_write_does_not_panic() {
        let blocker = temp_dir("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let cache = LocalCache::new(FileCache::new(blocker.join("nested")));
        cache.save_sort(SortOrder::Desc);
        assert_eq!(cache.load_sort(), SortOrder::Manual);
        let _ = std::fs::remove_file(&blocker);
    }
}
