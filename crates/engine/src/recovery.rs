//! Cold-start recovery: WAL replay, run loading, and scratch-file cleanup.

use crate::levels::level_dir;
use crate::{Config, WAL_FILENAME};
use anyhow::Result;
use memtable::{Memtable, Record};
use sstable::SsTable;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use wal::WalRecord;

/// Everything recovery rebuilds before the engine goes live.
pub(crate) struct Recovered {
    pub active: Memtable,
    pub levels: Vec<Vec<Arc<SsTable>>>,
    pub next_timestamp: u64,
}

/// Replays the journal and loads every level's runs.
///
/// Replay stamps each recovered mutation with a fresh timestamp, tombstones
/// included. Runs whose index fails to parse are skipped with a warning and
/// their data files left on disk. The timestamp counter is seeded past the
/// largest file id found: ids come from the same counter and are allocated
/// after every record timestamp they contain, so this keeps old on-disk
/// versions from ever shadowing new writes.
pub(crate) fn recover(config: &Config) -> Result<Recovered> {
    let mut active = Memtable::new();
    let mut next_timestamp = 1u64;

    let replayed = wal::replay(config.data_dir.join(WAL_FILENAME), |rec| {
        let ts = next_timestamp;
        next_timestamp += 1;
        match rec {
            WalRecord::Set { key, value } => active.put(Record::put(key, value, ts)),
            WalRecord::Del { key } => active.put(Record::tombstone(key, ts)),
        }
    })?;
    if replayed > 0 {
        info!(records = replayed, entries = active.len(), "journal replayed");
    }

    let mut levels = Vec::with_capacity(config.level_count);
    let mut max_file_id = 0u64;

    for level in 0..config.level_count {
        let mut tables: Vec<Arc<SsTable>> = Vec::new();
        let dir = level_dir(&config.data_dir, level);
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |e| e == "sst") {
                    match SsTable::open(&path, level) {
                        Ok(table) => {
                            if let Some(id) = table.file_id() {
                                max_file_id = max_file_id.max(id);
                            }
                            tables.push(Arc::new(table));
                        }
                        Err(e) => {
                            warn!(
                                table = %path.display(),
                                "skipping unreadable run: {e:#}"
                            );
                        }
                    }
                }
            }
        }

        if level == 0 {
            // L0 stays in flush order.
            tables.sort_by_key(|t| t.file_id().unwrap_or(0));
        } else {
            tables.sort_by(|a, b| a.min_key().cmp(b.min_key()));
        }
        levels.push(tables);
    }

    Ok(Recovered {
        active,
        levels,
        next_timestamp: next_timestamp.max(max_file_id + 1),
    })
}

/// Removes `.tmp` scratch files orphaned by an interrupted flush or
/// compaction.
pub(crate) fn sweep_tmp_files(data_dir: &Path, level_count: usize) {
    for level in 0..level_count {
        let dir = level_dir(data_dir, level);
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.to_string_lossy().ends_with(".tmp") {
                let _ = fs::remove_file(&path);
            }
        }
    }
}
