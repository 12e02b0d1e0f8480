/// Scanner module — orchestrates filesystem scanning.
///
/// A scan is three cooperating parts:
/// - **Walkers:** a bounded rayon pool lists directories and probes entries
///   (see [`walker`]). Workers never touch the tree.
/// - **Aggregator:** one thread applies worker reports to the shared
///   [`LiveTree`] in batches under a single write lock (see [`aggregator`]).
/// - **Handle:** the dashboard's side: progress channel, cancellation, and
///   `invalidate`/`expand` commands for subtrees.
///
/// The dashboard takes the `LiveTree` read lock once per frame, so the tree
/// view grows in real time while the scan runs.
pub mod aggregator;
pub mod progress;
pub mod session;
mod walker;

use crate::cache::SubtreeCache;
use crate::config::Config;
use crate::error::{ProbeError, ScanError};
use crate::model::FileTree;
use crate::probe;
use aggregator::{Aggregator, WalkRequest};
use progress::{NodeUpdate, ScanCommand, ScanProgress, WalkKind};
use session::{ScanCounters, ScanSession};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::RwLock;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// A shared, concurrently-readable file tree.
///
/// The aggregator holds the write lock briefly per batch of reports.
/// The UI holds a read lock each frame to render the live tree.
pub type LiveTree = Arc<RwLock<FileTree>>;

/// Maximum number of progress messages that may queue up for the UI.
///
/// The dashboard drains this channel every tick. Running totals and
/// per-entry errors are dropped rather than queued when it is full; only
/// terminal messages wait for room.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Capacity of the worker -> aggregator channel. When the aggregator falls
/// behind, workers block on send instead of growing the heap.
pub const UPDATE_CHANNEL_CAPACITY: usize = 16_384;

/// Reports applied per write-lock acquisition.
const BATCH_SIZE: usize = 2_000;

/// Options that shape one scan session.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub follow_symlinks: bool,
}

impl From<&Config> for ScanOptions {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            follow_symlinks: config.follow_symlinks,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Handle to a running or completed scan session.
pub struct ScanHandle {
    /// Receiver for progress updates from the aggregator.
    pub progress_rx: Receiver<ScanProgress>,
    /// Shared tree that is populated incrementally during scanning.
    pub live_tree: LiveTree,
    session: Arc<ScanSession>,
    commands: Sender<ScanCommand>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request every running walk of this session to stop as soon as
    /// possible. Results so far stay in the tree, flagged partial.
    pub fn cancel(&self) {
        self.session.cancel();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancel_requested()
    }

    /// Discard cached and live results for `path` and re-walk it. A path
    /// that no longer exists is removed from the tree.
    pub fn invalidate(&self, path: impl Into<PathBuf>) {
        let _ = self.commands.send(ScanCommand::Invalidate(path.into()));
    }

    /// Walk the contents of a directory that was completed from the cache.
    pub fn expand(&self, path: impl Into<PathBuf>) {
        let _ = self.commands.send(ScanCommand::Expand(path.into()));
    }

    /// The canonical scan root.
    pub fn root_path(&self) -> &Path {
        self.session.root()
    }

    pub fn counters(&self) -> ScanCounters {
        self.session.counters()
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.session.cancel();
        let _ = self.commands.send(ScanCommand::Shutdown);
    }
}

/// Start a new scan session of `root` on background threads.
///
/// The root is resolved and probed synchronously: a missing, unreadable or
/// non-directory root fails here instead of producing an empty tree.
pub fn start_scan(
    root: impl AsRef<Path>,
    options: ScanOptions,
    cache: Arc<SubtreeCache>,
) -> Result<ScanHandle, ScanError> {
    let requested = root.as_ref();
    let root_path = requested
        .canonicalize()
        .map_err(|err| ScanError::RootUnavailable {
            path: requested.to_path_buf(),
            source: ProbeError::from_io(requested, err),
        })?;
    let root_probe = probe::probe(&root_path).map_err(|source| ScanError::RootUnavailable {
        path: root_path.clone(),
        source,
    })?;
    if !root_probe.kind.is_dir() {
        return Err(ScanError::NotADirectory(root_path));
    }

    let concurrency = options.concurrency.clamp(1, crate::config::MAX_WORKERS);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("dirscope-worker-{i}"))
        .build()
        .map_err(|err| ScanError::Pool(err.to_string()))?;

    let session = Arc::new(ScanSession::new(root_path.clone()));
    if let Some(id) = root_probe.identity {
        session.visited.insert(id);
    }

    let mut tree = FileTree::with_capacity(root_path.clone(), 65_536);
    aggregator::seed_root(&mut tree, &root_probe);
    let live_tree: LiveTree = Arc::new(RwLock::new(tree));

    let (progress_tx, progress_rx) = crossbeam_channel::bounded(PROGRESS_CHANNEL_CAPACITY);
    let (update_tx, update_rx) = crossbeam_channel::bounded(UPDATE_CHANNEL_CAPACITY);
    let (command_tx, command_rx) = crossbeam_channel::unbounded();

    let mut agg = Aggregator::new(Arc::clone(&session), Arc::clone(&cache), progress_tx);
    let initial = agg.begin_walk(root_path.clone(), WalkKind::Initial);
    let spawner = WalkSpawner {
        pool: Arc::new(pool),
        session: Arc::clone(&session),
        cache,
        tx: update_tx,
        follow_symlinks: options.follow_symlinks,
    };

    info!(
        "Starting scan of {} with {} workers",
        root_path.display(),
        concurrency
    );
    let tree_clone = Arc::clone(&live_tree);
    let thread = thread::Builder::new()
        .name("dirscope-aggregator".into())
        .spawn(move || run_aggregator(agg, spawner, tree_clone, update_rx, command_rx, initial))
        .map_err(|source| ScanError::Spawn {
            name: "aggregator",
            source,
        })?;

    Ok(ScanHandle {
        progress_rx,
        live_tree,
        session,
        commands: command_tx,
        _thread: Some(thread),
    })
}

/// Starts walk threads on the session's shared pool.
struct WalkSpawner {
    pool: Arc<ThreadPool>,
    session: Arc<ScanSession>,
    cache: Arc<SubtreeCache>,
    tx: Sender<NodeUpdate>,
    follow_symlinks: bool,
}

impl WalkSpawner {
    fn spawn(&self, request: WalkRequest) -> std::io::Result<()> {
        let walk = walker::Walk {
            session: Arc::clone(&self.session),
            cache: Arc::clone(&self.cache),
            tx: self.tx.clone(),
            follow_symlinks: self.follow_symlinks,
            epoch: self.session.epoch(),
        };
        let pool = Arc::clone(&self.pool);
        thread::Builder::new()
            .name("dirscope-walk".into())
            .spawn(move || walker::run(&pool, &walk, request.root, request.kind))
            .map(|_| ())
    }
}

fn run_aggregator(
    mut agg: Aggregator,
    spawner: WalkSpawner,
    live_tree: LiveTree,
    updates: Receiver<NodeUpdate>,
    commands: Receiver<ScanCommand>,
    initial: WalkRequest,
) {
    let mut requests = vec![initial];
    loop {
        while let Some(request) = requests.pop() {
            let root = request.root.clone();
            let kind = request.kind;
            if let Err(err) = spawner.spawn(request) {
                warn!("Failed to start walk of {}: {err}", root.display());
                let mut tree = live_tree.write();
                let released = agg.apply(
                    &mut tree,
                    NodeUpdate::WalkFinished {
                        root,
                        kind,
                        cancelled: true,
                    },
                );
                requests.extend(released);
            }
        }
        agg.flush();

        let running = select! {
            recv(commands) -> command => match command {
                Ok(ScanCommand::Invalidate(path)) => {
                    requests.extend(agg.invalidate(&mut live_tree.write(), path));
                    true
                }
                Ok(ScanCommand::Expand(path)) => {
                    requests.extend(agg.expand(&mut live_tree.write(), path));
                    true
                }
                Ok(ScanCommand::Shutdown) | Err(_) => false,
            },
            recv(updates) -> update => match update {
                Ok(first) => {
                    let mut tree = live_tree.write();
                    requests.extend(agg.apply(&mut tree, first));
                    for update in updates.try_iter().take(BATCH_SIZE) {
                        requests.extend(agg.apply(&mut tree, update));
                    }
                    agg.publish(&tree);
                    true
                }
                // The spawner keeps a sender alive, so this only happens
                // during teardown.
                Err(_) => false,
            },
        };
        if !running {
            break;
        }
    }
    agg.flush();
    info!("Scan session of {} closed", spawner.session.root().display());
}
