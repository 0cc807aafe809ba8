//! Write path: `set`, `del`, and the `sync` durability barrier.
//!
//! Every mutation is journaled before it touches memory. The WAL append and
//! the memtable insert happen inside the same memtable critical section, so
//! the journal can never lag behind what a reader has observed, and
//! rotation (which re-logs the active memtable under the same lock) never
//! loses an entry.

use crate::{Engine, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use anyhow::{ensure, Result};
use memtable::Record;
use std::sync::Arc;

impl Engine {
    /// Inserts or overwrites `key`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        {
            let mut state = self.shared.memtables.lock();
            self.shared.wal.lock().log_set(key, value)?;
            let ts = self.shared.next_timestamp();
            state.active.put(Record::put(key.to_vec(), value.to_vec(), ts));
        }

        self.shared
            .cache
            .lock()
            .insert(key.to_vec(), value.to_vec());
        self.shared.maybe_flush()
    }

    /// Deletes `key` by writing a tombstone that shadows every older
    /// version across all levels.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );

        {
            let mut state = self.shared.memtables.lock();
            self.shared.wal.lock().log_del(key)?;
            let ts = self.shared.next_timestamp();
            state.active.put(Record::tombstone(key.to_vec(), ts));
        }

        self.shared.cache.lock().remove(key);
        self.shared.maybe_flush()
    }

    /// Durability barrier: on return, every acknowledged mutation is in an
    /// SSTable or recorded in a WAL that replays to the same state.
    ///
    /// Promotes a non-empty active memtable (flushing any pending immutable
    /// first) and flushes synchronously.
    pub fn sync(&self) -> Result<()> {
        enum Step {
            Flush,
            Backlog,
        }

        loop {
            let step = {
                let mut state = self.shared.memtables.lock();
                if state.active.is_empty() {
                    Step::Flush
                } else if state.immutable.is_some() {
                    Step::Backlog
                } else {
                    let sealed = std::mem::take(&mut state.active);
                    state.immutable = Some(Arc::new(sealed));
                    Step::Flush
                }
            };

            match step {
                Step::Flush => return self.shared.flush_immutable(),
                Step::Backlog => self.shared.flush_immutable()?,
            }
        }
    }
}
