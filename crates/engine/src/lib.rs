//! # Engine: the BlinkDB storage facade
//!
//! Ties the [`memtable`], [`wal`], and [`sstable`] crates into a complete
//! LSM-tree key-value store with a read cache and background compaction.
//!
//! ```text
//! set/del ─▶ WAL append ─▶ memtable insert
//!                              │  (4 MiB threshold)
//!                              ▼
//!              immutable memtable ─▶ flush ─▶ L0 run + WAL rotation
//!                                                │  (L0 > 4 tables)
//!                                                ▼
//!                               compaction ─▶ L1 … L6 (ratio 10)
//!
//! get ─▶ cache ─▶ active ─▶ immutable ─▶ L0..L6 (highest timestamp wins)
//! ```
//!
//! ## Concurrency
//!
//! Native threads throughout: callers block on mutexes, one dedicated
//! scheduler thread wakes every couple of seconds, and short-lived workers
//! carry out each flush and each compaction round. Every mutation gets a
//! unique timestamp from a relaxed atomic counter; the version with the
//! greatest timestamp wins everywhere, so readers never need more than one
//! lock at a time.
//!
//! Lock order (strict): flush gate ≺ memtable ≺ WAL; level locks ascending;
//! the cache lock is always taken alone.

mod cache;
mod compaction;
mod config;
mod flush;
mod levels;
mod read;
mod recovery;
mod write;

pub use config::Config;

use anyhow::{Context, Result};
use cache::LruCache;
use levels::Levels;
use memtable::Memtable;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};
use wal::Wal;

/// Maximum accepted key size (64 KiB).
pub const MAX_KEY_SIZE: usize = sstable::MAX_KEY_BYTES;
/// Maximum accepted value size (10 MiB).
pub const MAX_VALUE_SIZE: usize = sstable::MAX_VALUE_BYTES;

/// Journal file name inside the data directory.
pub(crate) const WAL_FILENAME: &str = "wal.log";

/// The storage engine.
///
/// Cheap to share behind an `Arc`; all operations take `&self`. Dropping
/// the engine stops the compaction scheduler, joins it, and flushes the
/// memtable so no acknowledged write is lost.
pub struct Engine {
    shared: Arc<Shared>,
    compactor: Option<JoinHandle<()>>,
}

/// Active and at-most-one immutable memtable, guarded together.
///
/// The immutable table sits behind an `Arc` so the flush worker can write
/// it out without holding the lock, and so a failed flush leaves it in
/// place for the next attempt.
pub(crate) struct MemtableState {
    pub(crate) active: Memtable,
    pub(crate) immutable: Option<Arc<Memtable>>,
}

/// State shared between the facade, flush workers, and the compactor.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) memtables: Mutex<MemtableState>,
    pub(crate) wal: Mutex<Wal>,
    pub(crate) cache: Mutex<LruCache>,
    pub(crate) levels: Levels,
    pub(crate) next_timestamp: AtomicU64,
    pub(crate) compaction_running: AtomicBool,
    /// Serializes flush attempts so two workers never write the same
    /// immutable memtable twice.
    pub(crate) flush_gate: Mutex<()>,
    /// Wakes the scheduler early on shutdown.
    pub(crate) wake_lock: Mutex<()>,
    pub(crate) wake: Condvar,
}

impl Shared {
    /// Fetch-and-increment timestamp; unique and strictly increasing for
    /// the life of the process.
    pub(crate) fn next_timestamp(&self) -> u64 {
        self.next_timestamp.fetch_add(1, Ordering::Relaxed)
    }
}

impl Engine {
    /// Opens (or creates) the database under `config.data_dir`.
    ///
    /// Recovery: sweep orphaned `.tmp` files, replay the WAL into a fresh
    /// active memtable, load every level's runs (skipping tables whose
    /// index fails to parse), seed the timestamp counter past everything on
    /// disk, then start the compaction scheduler.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        recovery::sweep_tmp_files(&config.data_dir, config.level_count);

        let recovered = recovery::recover(&config)?;
        let wal = Wal::open(config.data_dir.join(WAL_FILENAME), config.wal_sync)?;

        let shared = Arc::new(Shared {
            memtables: Mutex::new(MemtableState {
                active: recovered.active,
                immutable: None,
            }),
            wal: Mutex::new(wal),
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            levels: Levels::from_vec(recovered.levels),
            next_timestamp: AtomicU64::new(recovered.next_timestamp),
            compaction_running: AtomicBool::new(true),
            flush_gate: Mutex::new(()),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            config,
        });

        let compactor = compaction::spawn(Arc::clone(&shared))?;
        info!(
            dir = %shared.config.data_dir.display(),
            memtable_entries = shared.memtables.lock().active.len(),
            "engine ready"
        );

        Ok(Self {
            shared,
            compactor: Some(compactor),
        })
    }

    /// Number of configured levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.shared.levels.count()
    }

    /// Number of runs currently installed at `level`.
    #[must_use]
    pub fn tables_at(&self, level: usize) -> usize {
        self.shared.levels.table_count(level)
    }

    /// Byte footprint of the active memtable.
    #[must_use]
    pub fn memtable_size_bytes(&self) -> usize {
        self.shared.memtables.lock().active.size_bytes()
    }

    /// Manually compacts `level` into `level + 1`. The scheduler calls the
    /// same path when a level's table count exceeds its trigger.
    pub fn compact(&self, level: usize) -> Result<()> {
        self.shared.compact_level(level)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.memtables.lock();
        let mut d = f.debug_struct("Engine");
        d.field("data_dir", &self.shared.config.data_dir)
            .field("memtable_entries", &state.active.len())
            .field("memtable_bytes", &state.active.size_bytes())
            .field("immutable", &state.immutable.is_some());
        drop(state);
        for level in 0..self.shared.levels.count() {
            d.field(
                &format!("l{}_tables", level),
                &self.shared.levels.table_count(level),
            );
        }
        d.finish()
    }
}

/// Ordered shutdown: stop and join the scheduler, then flush. The worker
/// never outlives the engine.
impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.compaction_running.store(false, Ordering::Relaxed);
        {
            let _g = self.shared.wake_lock.lock();
            self.shared.wake.notify_all();
        }
        if let Some(worker) = self.compactor.take() {
            let _ = worker.join();
        }
        if let Err(e) = self.sync() {
            warn!("flush on shutdown failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests;
