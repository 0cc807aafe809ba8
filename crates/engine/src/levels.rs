//! Level container: one ordered run vector per level, each behind its own
//! lock.
//!
//! L0 runs come straight from memtable flushes and are kept in flush order
//! (they may overlap in key range). Deeper levels hold disjoint runs sorted
//! ascending by min key. Handles are reference counted so readers can pin a
//! run under the level lock and do their disk reads after releasing it.

use parking_lot::{Mutex, MutexGuard};
use sstable::SsTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) struct Levels {
    inner: Vec<Mutex<Vec<Arc<SsTable>>>>,
}

impl Levels {
    pub fn from_vec(levels: Vec<Vec<Arc<SsTable>>>) -> Self {
        Self {
            inner: levels.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn lock(&self, level: usize) -> MutexGuard<'_, Vec<Arc<SsTable>>> {
        self.inner[level].lock()
    }

    /// Table count without blocking; `None` when the level is busy.
    pub fn try_table_count(&self, level: usize) -> Option<usize> {
        self.inner[level].try_lock().map(|tables| tables.len())
    }

    pub fn table_count(&self, level: usize) -> usize {
        self.inner[level].lock().len()
    }

    pub fn push(&self, level: usize, table: Arc<SsTable>) {
        self.inner[level].lock().push(table);
    }

    /// Pins every run at `level` whose key range covers `key`.
    pub fn covering(&self, level: usize, key: &[u8]) -> Vec<Arc<SsTable>> {
        self.inner[level]
            .lock()
            .iter()
            .filter(|t| t.covers(key))
            .cloned()
            .collect()
    }
}

/// Directory holding level `level`'s runs: `<data_dir>/L<level>`.
pub(crate) fn level_dir(data_dir: &Path, level: usize) -> PathBuf {
    data_dir.join(format!("L{}", level))
}
