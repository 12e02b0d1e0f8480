/// Scanner messages.
///
/// Three flows:
/// - [`NodeUpdate`]: walker workers -> aggregator, one FIFO channel for all
///   workers. Per directory the order is always `Listed` first, then exactly
///   one `Probed`/`Alias`/`Cached`/`Failed` per listed entry.
/// - [`ScanCommand`]: scan handle -> aggregator.
/// - [`ScanProgress`]: aggregator -> dashboard. Lightweight; the tree itself
///   lives in the shared `LiveTree`.
use crate::cache::CachedSize;
use crate::error::ScanIssue;
use crate::model::EntryKind;
use crate::probe::Probe;
use compact_str::CompactString;
use std::path::PathBuf;
use std::time::Duration;

/// One name from a directory listing, with the kind reported by the listing
/// itself (no extra stat).
#[derive(Debug, Clone)]
pub struct ListedEntry {
    pub name: CompactString,
    pub kind_hint: EntryKind,
}

/// Why a walk was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkKind {
    /// The session's first walk of the scan root.
    Initial,
    /// Re-walk after `invalidate`, e.g. following a deletion.
    Rescan,
    /// Lazy expansion of a directory completed from the cache.
    Expand,
}

#[derive(Debug)]
pub enum NodeUpdate {
    /// Directory contents. Creates one pending child per entry.
    Listed {
        dir: PathBuf,
        entries: Vec<ListedEntry>,
        /// Entries the listing could not return.
        unreadable: u32,
    },
    /// An entry was probed. A directory moves to `Scanning` and its own
    /// `Listed` follows; everything else is final.
    Probed { path: PathBuf, probe: Probe },
    /// The entry's identity was already visited in this session.
    Alias { path: PathBuf, probe: Probe },
    /// A directory was completed from the subtree cache.
    Cached {
        path: PathBuf,
        probe: Probe,
        cached: CachedSize,
    },
    /// Probing the entry (or listing the directory) failed.
    Failed {
        path: PathBuf,
        kind: EntryKind,
        issue: ScanIssue,
    },
    /// Every worker of the walk rooted at `root` has returned.
    WalkFinished {
        root: PathBuf,
        kind: WalkKind,
        cancelled: bool,
    },
}

impl NodeUpdate {
    pub fn path(&self) -> &std::path::Path {
        match self {
            NodeUpdate::Listed { dir, .. } => dir,
            NodeUpdate::Probed { path, .. }
            | NodeUpdate::Alias { path, .. }
            | NodeUpdate::Cached { path, .. }
            | NodeUpdate::Failed { path, .. } => path,
            NodeUpdate::WalkFinished { root, .. } => root,
        }
    }
}

/// Commands sent from the scan handle to the aggregator.
#[derive(Debug)]
pub enum ScanCommand {
    /// Drop cached and live results for a path and re-walk it.
    Invalidate(PathBuf),
    /// Walk the contents of a directory completed from the cache.
    Expand(PathBuf),
    /// Stop the aggregator. Sent when the handle is dropped.
    Shutdown,
}

/// Progress updates sent from the aggregator to the UI.
#[derive(Debug)]
pub enum ScanProgress {
    /// Periodic update with running totals.
    Update {
        files_found: u64,
        dirs_found: u64,
        total_size: u64,
        errors: u64,
        current_path: String,
    },
    /// A non-fatal error (e.g. permission denied on one directory).
    Error { path: String, message: String },
    /// The initial walk finished. The tree is final.
    Complete {
        duration: Duration,
        error_count: u64,
    },
    /// The initial walk was cancelled; every unfinished node is `Cancelled`.
    Cancelled { duration: Duration },
    /// The scan root itself could not be listed.
    RootFailed { message: String },
    /// A rescan or expansion finished. `removed` means the path no longer
    /// exists and was pruned from the tree.
    SubtreeDone { path: PathBuf, removed: bool },
}
