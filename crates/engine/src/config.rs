//! Tunable parameters for the storage engine.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration. Defaults match the production tuning; tests dial
/// the thresholds down to force flushes and compactions cheaply.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the WAL and the per-level SSTable directories.
    pub data_dir: PathBuf,

    /// Active memtable byte size that triggers a flush.
    pub memtable_max_bytes: usize,

    /// Read cache capacity in entries.
    pub cache_capacity: usize,

    /// Number of levels; the deepest level never compacts further.
    pub level_count: usize,

    /// L0 compacts when its table count exceeds this.
    pub l0_compaction_trigger: usize,

    /// Levels ≥ 1 compact when their table count exceeds this.
    pub level_size_ratio: usize,

    /// Sleep between compaction scheduler ticks.
    pub compaction_interval: Duration,

    /// Fsync the WAL on every append. Off by default; every append is still
    /// flushed to the OS buffer before the write is acknowledged.
    pub wal_sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("blinkdb_data"),
            memtable_max_bytes: 4 * 1024 * 1024,
            cache_capacity: 1024,
            level_count: 7,
            l0_compaction_trigger: 4,
            level_size_ratio: 10,
            compaction_interval: Duration::from_secs(2),
            wal_sync: false,
        }
    }
}

impl Config {
    /// Configuration rooted at `data_dir`, defaults elsewhere.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_memtable_max_bytes(mut self, bytes: usize) -> Self {
        self.memtable_max_bytes = bytes;
        self
    }

    pub fn with_cache_capacity(mut self, entries: usize) -> Self {
        self.cache_capacity = entries;
        self
    }

    pub fn with_compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    pub fn with_wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }
}
