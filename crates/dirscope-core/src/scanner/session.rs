/// Per-session shared state: the visited set, the cancellation signal and
/// running counters. Shared by every worker, the aggregator and the handle.
use crate::model::Identity;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Identities already expanded (directories) or counted (multiply-linked
/// files) in this session. An identity is counted at most once.
#[derive(Debug, Default)]
pub struct VisitedSet {
    inner: Mutex<HashSet<Identity>>,
}

impl VisitedSet {
    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&self, id: Identity) -> bool {
        self.inner.lock().insert(id)
    }

    /// Forget identities whose nodes left the tree, so a re-walk counts them.
    pub fn release(&self, ids: &[Identity]) {
        if ids.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for id in ids {
            inner.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    pub errors: u64,
}

#[derive(Debug)]
pub struct ScanSession {
    root: PathBuf,
    started: Instant,

    /// Bumped by every cancel. A walk captures the epoch it started in and
    /// stops as soon as it changes, so later rescans are unaffected.
    epoch: AtomicU64,
    cancel_requested: AtomicBool,

    pub visited: VisitedSet,

    files: AtomicU64,
    dirs: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl ScanSession {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            started: Instant::now(),
            epoch: AtomicU64::new(0),
            cancel_requested: AtomicBool::new(false),
            visited: VisitedSet::default(),
            files: AtomicU64::new(0),
            dirs: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Stop every walk currently running in this session.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }

    /// `true` if a walk started at `epoch` must stop.
    #[inline]
    pub fn is_cancelled(&self, epoch: u64) -> bool {
        self.epoch() != epoch
    }

    pub(crate) fn record_file(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_dir(&self) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> ScanCounters {
        ScanCounters {
            files: self.files.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
