/// Run context: everything that lives exactly as long as one dashboard run.
///
/// Holds the immutable [`Config`], the resolved scan root, the subtree cache
/// shared by every scan session of the run, and the log writer guard.
///
/// Lifecycle:
/// 1. [`RunContext::init`] installs the file logger and loads the cache
///    (from `cache_file` when one is configured).
/// 2. The dashboard runs with borrowed pieces of the context.
/// 3. [`RunContext::teardown`] persists the cache and drops the log guard,
///    flushing buffered log lines.
use anyhow::Context as _;
use dirscope_core::cache::SubtreeCache;
use dirscope_core::config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "dirscope.log";

pub struct RunContext {
    pub config: Config,
    pub root: PathBuf,
    pub cache: Arc<SubtreeCache>,
    log_file: Option<PathBuf>,
    _log_guard: Option<WorkerGuard>,
}

impl RunContext {
    /// Initialise logging under the user cache directory and load the cache.
    pub fn init(config: Config, root: PathBuf) -> anyhow::Result<Self> {
        let log_dir = dirs::cache_dir().map(|dir| dir.join("dirscope"));
        Self::init_with_log_dir(config, root, log_dir)
    }

    /// Like [`RunContext::init`] with an explicit log directory. `None`
    /// disables file logging.
    pub fn init_with_log_dir(
        config: Config,
        root: PathBuf,
        log_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let (log_file, log_guard) = match log_dir {
            Some(dir) => {
                let guard = install_logger(&dir, config.debug)?;
                (Some(dir.join(LOG_FILE_NAME)), guard)
            }
            None => (None, None),
        };

        info!(
            "dirscope {} starting on {} (dry run: {}, workers: {})",
            env!("CARGO_PKG_VERSION"),
            root.display(),
            config.dry_run,
            config.concurrency
        );

        let cache = match &config.cache_file {
            Some(path) => SubtreeCache::load(path, config.cache_capacity).unwrap_or_else(|err| {
                warn!("Starting with an empty cache: {err}");
                SubtreeCache::new(config.cache_capacity)
            }),
            None => SubtreeCache::new(config.cache_capacity),
        };

        Ok(Self {
            config,
            root,
            cache: Arc::new(cache),
            log_file,
            _log_guard: log_guard,
        })
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Persist the cache (when configured) and flush the log.
    pub fn teardown(self) {
        if let Some(path) = &self.config.cache_file {
            if let Err(err) = self.cache.save(path) {
                warn!("Could not persist the subtree cache: {err}");
            }
        }
        let stats = self.cache.stats();
        info!("dirscope exiting; cache hit rate {:.0}%", stats.hit_rate());
    }
}

/// Route `tracing` output to a non-blocking file writer in `dir`.
///
/// Returns `None` when a global subscriber is already installed (tests run
/// several contexts in one process).
fn install_logger(dir: &Path, debug: bool) -> anyhow::Result<Option<WorkerGuard>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let default_level = if debug { "dirscope=debug" } else { "dirscope=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .is_ok();
    Ok(installed.then_some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cache_survives_a_run_when_persisted() {
        let tmp = TempDir::new().unwrap();
        let cache_file = tmp.path().join("state").join("cache.json");
        let config = Config {
            cache_file: Some(cache_file.clone()),
            ..Config::default()
        };

        let ctx = RunContext::init_with_log_dir(config.clone(), tmp.path().to_path_buf(), None)
            .unwrap();
        assert!(ctx.cache.is_empty());
        assert!(ctx.log_file().is_none());
        ctx.teardown();
        assert!(cache_file.exists());

        let again =
            RunContext::init_with_log_dir(config, tmp.path().to_path_buf(), None).unwrap();
        assert!(again.cache.is_empty());
    }

    #[test]
    fn malformed_cache_file_falls_back_to_empty() {
        let tmp = TempDir::new().unwrap();
        let cache_file = tmp.path().join("cache.json");
        std::fs::write(&cache_file, "not json").unwrap();
        let config = Config {
            cache_file: Some(cache_file),
            ..Config::default()
        };

        let ctx = RunContext::init_with_log_dir(config, tmp.path().to_path_buf(), None).unwrap();
        assert!(ctx.cache.is_empty());
    }

    #[test]
    fn log_file_lives_in_the_log_directory() {
        let tmp = TempDir::new().unwrap();
        let logs = tmp.path().join("logs");
        let ctx = RunContext::init_with_log_dir(
            Config::default(),
            tmp.path().to_path_buf(),
            Some(logs.clone()),
        )
        .unwrap();
        assert_eq!(ctx.log_file(), Some(logs.join(LOG_FILE_NAME).as_path()));
        assert!(logs.is_dir());
    }
}
