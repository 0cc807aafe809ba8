//! Flush pipeline: promote a full memtable to immutable, persist it as an
//! L0 run, rotate the WAL.

use crate::levels::level_dir;
use crate::{MemtableState, Shared};
use anyhow::{Context, Result};
use sstable::TableWriter;
use std::sync::Arc;
use tracing::{debug, warn};

impl Shared {
    /// Seals the active memtable once it crosses the size threshold and
    /// hands it to a background flush worker.
    ///
    /// Invariant: at most one immutable memtable exists. If a previous one
    /// is still pending (its flush failed or is in flight), it is flushed
    /// synchronously before the swap; the caller blocks rather
    /// than growing an unbounded backlog.
    pub(crate) fn maybe_flush(self: &Arc<Self>) -> Result<()> {
        loop {
            let backlog = {
                let mut state = self.memtables.lock();
                if state.active.size_bytes() < self.config.memtable_max_bytes {
                    return Ok(());
                }
                if state.immutable.is_none() {
                    let sealed = std::mem::take(&mut state.active);
                    state.immutable = Some(Arc::new(sealed));
                    false
                } else {
                    true
                }
            };

            if backlog {
                self.flush_immutable()?;
                continue;
            }

            let shared = Arc::clone(self);
            std::thread::spawn(move || {
                if let Err(e) = shared.flush_immutable() {
                    warn!("background flush failed, will retry: {e:#}");
                }
            });
            return Ok(());
        }
    }

    /// Writes the immutable memtable (if any) as a new L0 run, installs the
    /// handle, clears the pointer, and rotates the WAL.
    ///
    /// Serialized by the flush gate so concurrent callers (worker threads,
    /// `sync`, the scheduler's retry) never persist the same memtable
    /// twice. On failure the immutable memtable stays in place and the
    /// scheduler retries on its next tick.
    pub(crate) fn flush_immutable(&self) -> Result<()> {
        let _gate = self.flush_gate.lock();

        let imm = { self.memtables.lock().immutable.clone() };
        let Some(imm) = imm else { return Ok(()) };

        if !imm.is_empty() {
            let id = self.next_timestamp();
            let dir = level_dir(&self.config.data_dir, 0);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating level dir {}", dir.display()))?;
            let path = dir.join(format!("table_{}.sst", id));

            let table = TableWriter::write(&path, 0, imm.len(), imm.iter())?;
            debug!(
                path = %path.display(),
                entries = table.len(),
                "memtable flushed to L0"
            );
            self.levels.push(0, Arc::new(table));
        }

        let mut state = self.memtables.lock();
        if state
            .immutable
            .as_ref()
            .map_or(false, |cur| Arc::ptr_eq(cur, &imm))
        {
            state.immutable = None;
        }
        self.rotate_wal(&state)?;
        Ok(())
    }

    /// Truncates the journal and re-logs the surviving active entries, so
    /// durability is preserved across the flush boundary. The caller holds
    /// the memtable lock, which keeps the rotation atomic with respect to
    /// concurrent writers.
    pub(crate) fn rotate_wal(&self, state: &MemtableState) -> Result<()> {
        let mut wal = self.wal.lock();
        wal.reset()?;
        for rec in state.active.iter() {
            if rec.tombstone {
                wal.log_del(&rec.key)?;
            } else {
                wal.log_set(&rec.key, &rec.value)?;
            }
        }
        Ok(())
    }
}
