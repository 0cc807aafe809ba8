use crate::Config;
use std::path::Path;
use std::time::{Duration, Instant};

/// Config with a generous memtable so only explicit `sync()` calls create
/// runs, and a parked scheduler so tests control compaction themselves.
pub fn quiet_config(dir: &Path) -> Config {
    Config::new(dir)
        .with_memtable_max_bytes(1024 * 1024)
        .with_compaction_interval(Duration::from_secs(3600))
}

/// Config with a tiny memtable so ordinary writes force flushes.
pub fn tiny_config(dir: &Path) -> Config {
    Config::new(dir)
        .with_memtable_max_bytes(4096)
        .with_compaction_interval(Duration::from_secs(3600))
}

/// Counts `.sst` data files under `<dir>/L<level>`.
pub fn sst_files_at(dir: &Path, level: usize) -> usize {
    let level_dir = dir.join(format!("L{}", level));
    match std::fs::read_dir(level_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "sst"))
            .count(),
        Err(_) => 0,
    }
}

/// Polls `cond` until it holds or `timeout` expires.
pub fn wait_until<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
