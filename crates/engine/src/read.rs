//! Read path: cache, memtables, then every level.
//!
//! Timestamps are globally monotonic, so the highest-timestamp version
//! found anywhere is the true latest write regardless of visit order. The
//! walk still has to touch every level whose runs cover the key, since an older
//! level may hold a newer version than a deeper one.

use crate::Engine;
use memtable::Record;
use tracing::warn;

enum MemHit {
    Tombstone,
    Value(Vec<u8>),
    Miss,
}

impl Engine {
    /// Looks up `key`, returning the latest live value.
    ///
    /// Absent covers both "never written" and "latest version is a
    /// tombstone". Unreadable runs are skipped with a warning rather than
    /// failing the lookup.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if key.is_empty() {
            return None;
        }

        if let Some(value) = self.shared.cache.lock().get(key) {
            return Some(value);
        }

        // Memtables, newest first. The lock is released before any disk
        // access below.
        let hit = {
            let state = self.shared.memtables.lock();
            let rec = state
                .active
                .get(key)
                .or_else(|| state.immutable.as_deref().and_then(|imm| imm.get(key)));
            match rec {
                Some(r) if r.tombstone => MemHit::Tombstone,
                Some(r) => MemHit::Value(r.value.clone()),
                None => MemHit::Miss,
            }
        };
        match hit {
            MemHit::Tombstone => return None,
            MemHit::Value(value) => {
                self.shared
                    .cache
                    .lock()
                    .insert(key.to_vec(), value.clone());
                return Some(value);
            }
            MemHit::Miss => {}
        }

        // Walk the levels, keeping the highest-timestamp version seen.
        // Candidate runs are pinned by cloning their handles under the
        // level lock; the reads themselves happen lock-free.
        let mut winner: Option<Record> = None;
        for level in 0..self.shared.levels.count() {
            for table in self.shared.levels.covering(level, key) {
                match table.get(key) {
                    Ok(Some(rec)) => {
                        if winner.as_ref().map_or(true, |w| rec.timestamp > w.timestamp) {
                            winner = Some(rec);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            table = %table.data_path().display(),
                            "sstable read failed, skipping run: {e:#}"
                        );
                    }
                }
            }
        }

        match winner {
            Some(rec) if !rec.tombstone => {
                self.shared
                    .cache
                    .lock()
                    .insert(key.to_vec(), rec.value.clone());
                Some(rec.value)
            }
            _ => None,
        }
    }
}
