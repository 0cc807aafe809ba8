//! Background compaction: the scheduler thread and the per-level merge.
//!
//! The scheduler wakes on an interval, retries any pending flush, and
//! inspects each level's table count with a try-lock so it never stalls
//! behind a running merge. A level over its trigger gets a fresh worker
//! thread running [`Shared::compact_level`].

use crate::levels::level_dir;
use crate::Shared;
use anyhow::{Context, Result};
use memtable::Record;
use sstable::{SsTable, TableWriter};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Starts the scheduler thread.
pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("blinkdb-compactor".into())
        .spawn(move || run(shared))
}

fn run(shared: Arc<Shared>) {
    while shared.compaction_running.load(Ordering::Relaxed) {
        {
            let mut guard = shared.wake_lock.lock();
            if !shared.compaction_running.load(Ordering::Relaxed) {
                break;
            }
            let _ = shared
                .wake
                .wait_for(&mut guard, shared.config.compaction_interval);
        }
        if !shared.compaction_running.load(Ordering::Relaxed) {
            break;
        }
        tick(&shared);
    }
    debug!("compaction scheduler stopped");
}

fn tick(shared: &Arc<Shared>) {
    // A flush that failed earlier leaves the immutable memtable behind;
    // retry it before looking at the levels.
    let flush_pending = shared.memtables.lock().immutable.is_some();
    if flush_pending {
        if let Err(e) = shared.flush_immutable() {
            warn!("flush retry failed: {e:#}");
        }
    }

    for level in 0..shared.levels.count() - 1 {
        let Some(count) = shared.levels.try_table_count(level) else {
            continue;
        };
        let trigger = if level == 0 {
            shared.config.l0_compaction_trigger
        } else {
            shared.config.level_size_ratio
        };
        if count > trigger {
            let worker = Arc::clone(shared);
            std::thread::spawn(move || {
                if let Err(e) = worker.compact_level(level) {
                    warn!(level, "compaction failed: {e:#}");
                }
            });
        }
    }
}

impl Shared {
    /// Merges every run at `level` (plus the overlapping runs one level
    /// down) into a single run at `level + 1`.
    ///
    /// Both level locks are held for the duration, acquired in ascending
    /// order, the discipline every caller follows, so the pair can never
    /// deadlock. Input files are deleted only after the output is
    /// installed; if the merge fails, the inputs are restored to their
    /// levels.
    pub(crate) fn compact_level(&self, level: usize) -> Result<()> {
        if level + 1 >= self.levels.count() {
            // The deepest level never compacts further.
            return Ok(());
        }

        let mut cur = self.levels.lock(level);
        let mut next = self.levels.lock(level + 1);
        if cur.is_empty() {
            return Ok(());
        }

        let moved: Vec<Arc<SsTable>> = cur.drain(..).collect();

        // Global key span of the snapshot.
        let mut min_key = moved[0].min_key().to_vec();
        let mut max_key = moved[0].max_key().to_vec();
        for t in &moved[1..] {
            if t.min_key() < min_key.as_slice() {
                min_key = t.min_key().to_vec();
            }
            if t.max_key() > max_key.as_slice() {
                max_key = t.max_key().to_vec();
            }
        }

        // Runs outside the span keep their place; the rest join the merge.
        let (overlap, keep): (Vec<_>, Vec<_>) = next.drain(..).partition(|t| {
            t.min_key() <= max_key.as_slice() && min_key.as_slice() <= t.max_key()
        });
        next.extend(keep);

        match self.merge_runs(level + 1, &moved, &overlap) {
            Ok(output) => {
                if let Some(table) = output {
                    next.push(Arc::new(table));
                }
                next.sort_by(|a, b| a.min_key().cmp(b.min_key()));
                drop(next);
                drop(cur);

                for table in moved.iter().chain(overlap.iter()) {
                    if let Err(e) = table.delete_files() {
                        warn!(
                            run = %table.data_path().display(),
                            "failed to delete compacted run: {}", e
                        );
                    }
                }
                Ok(())
            }
            Err(e) => {
                cur.extend(moved);
                next.extend(overlap);
                next.sort_by(|a, b| a.min_key().cmp(b.min_key()));
                Err(e)
            }
        }
    }

    /// Reads every record from every input run, keeps the highest-timestamp
    /// version per key, garbage-collects tombstones (the target level is
    /// always below L0), and writes the survivors as one new run.
    ///
    /// Returns `None` when nothing survives: an empty merge produces no
    /// file.
    fn merge_runs(
        &self,
        target_level: usize,
        moved: &[Arc<SsTable>],
        overlap: &[Arc<SsTable>],
    ) -> Result<Option<SsTable>> {
        let mut merged: BTreeMap<Vec<u8>, Record> = BTreeMap::new();
        for table in moved.iter().chain(overlap.iter()) {
            for (key, offset) in table.entries() {
                let rec = table
                    .record_at(offset)
                    .with_context(|| format!("reading {}", table.data_path().display()))?;
                match merged.get(key) {
                    Some(existing) if existing.timestamp >= rec.timestamp => {}
                    _ => {
                        merged.insert(rec.key.clone(), rec);
                    }
                }
            }
        }

        if target_level > 0 {
            merged.retain(|_, rec| !rec.tombstone);
        }
        if merged.is_empty() {
            return Ok(None);
        }

        let id = self.next_timestamp();
        let dir = level_dir(&self.config.data_dir, target_level);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating level dir {}", dir.display()))?;
        let path = dir.join(format!("table_{}.sst", id));

        let table = TableWriter::write(&path, target_level, merged.len(), merged.values())?;
        info!(
            level = target_level,
            inputs = moved.len() + overlap.len(),
            entries = table.len(),
            "compaction wrote new run"
        );
        Ok(Some(table))
    }
}
