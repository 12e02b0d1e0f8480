/// Startup configuration for one dashboard run.
///
/// Built once (from command-line flags and environment) and then shared
/// read-only; nothing in the core mutates it after construction.
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on concurrent scan workers.
///
/// Each worker holds at most one open directory handle, so this also caps
/// the file descriptors a scan can consume on very deep or wide trees.
pub const MAX_WORKERS: usize = 16;

pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;
pub const DEFAULT_HISTORY_LEN: usize = 120;

#[derive(Debug, Clone)]
pub struct Config {
    /// Suppress all delete requests; the UI still shows the action.
    pub dry_run: bool,
    /// Verbose diagnostics (per-entry scan errors) in the log.
    pub debug: bool,
    /// Worker pool size.
    pub concurrency: usize,
    /// Expand symlinks that point at directories.
    pub follow_symlinks: bool,
    /// Maximum number of subtree cache entries (LRU beyond this).
    pub cache_capacity: usize,
    /// Persist the subtree cache here between runs. `None` keeps it in memory.
    pub cache_file: Option<PathBuf>,
    /// Interval between metric samples.
    pub sample_interval: Duration,
    /// Number of metric samples retained for sparklines.
    pub history_len: usize,
    /// Redraw tick of the render loop.
    pub tick_rate: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            debug: false,
            concurrency: default_concurrency(),
            follow_symlinks: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_file: None,
            sample_interval: Duration::from_secs(1),
            history_len: DEFAULT_HISTORY_LEN,
            tick_rate: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Clamp a requested worker count into `1..=MAX_WORKERS`.
    pub fn with_concurrency(mut self, requested: usize) -> Self {
        self.concurrency = requested.clamp(1, MAX_WORKERS);
        self
    }
}

/// One worker per logical CPU, capped at [`MAX_WORKERS`].
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(Config::default().with_concurrency(0).concurrency, 1);
        assert_eq!(
            Config::default().with_concurrency(10_000).concurrency,
            MAX_WORKERS
        );
        assert_eq!(Config::default().with_concurrency(3).concurrency, 3);
    }

    #[test]
    fn defaults_are_in_memory_and_live() {
        let cfg = Config::default();
        assert!(!cfg.dry_run);
        assert!(cfg.cache_file.is_none());
        assert!(cfg.concurrency >= 1 && cfg.concurrency <= MAX_WORKERS);
    }
}
