/// A single node in the arena-allocated scan tree.
///
/// Nodes are stored in a flat `Vec<FileNode>`; parent/child relationships use
/// [`NodeIndex`] rather than pointers so the dashboard can hold on to an index
/// across frames while the aggregator keeps mutating the tree.
use crate::error::ScanIssue;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Lightweight index into the arena `Vec<FileNode>`.
///
/// Uses `u32` to keep nodes small; four billion entries is far beyond any
/// single scan root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Device + inode pair. Two paths with the same identity are the same
/// underlying file (hard links) or directory (bind mounts, followed links).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub dev: u64,
    pub ino: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, FIFOs, device nodes.
    Special,
    /// Could not be probed at all; the real kind is unknown.
    Inaccessible,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// Per-node scan state machine.
///
/// `Pending -> Scanning -> Complete` on the happy path; `Error` and
/// `Cancelled` are terminal for the current walk. A rescan resets a subtree
/// back to `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanState {
    Pending,
    Scanning,
    Complete,
    Error,
    Cancelled,
}

impl ScanState {
    /// `true` once the node will receive no further updates in this walk.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ScanState::Complete | ScanState::Error | ScanState::Cancelled
        )
    }
}

/// One filesystem entry.
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Entry name only; the root carries its full path.
    pub name: CompactString,

    pub kind: EntryKind,

    /// Bytes owned directly by this entry (0 for directories).
    pub self_size: u64,

    /// Allocated on-disk bytes for this entry alone.
    pub allocated_size: u64,

    /// `self_size` plus the cumulative size of every counted descendant.
    /// Only ever grows during a walk; a rescan of the subtree resets it.
    pub cumulative_size: u64,

    /// Number of direct entries, known once the directory was listed (or
    /// restored from the cache).
    pub child_count: u64,

    pub parent: Option<NodeIndex>,

    /// Discovered children. Sorted by descending `cumulative_size` once the
    /// directory is complete; empty for directories completed from the cache
    /// until they are expanded.
    pub children: Vec<NodeIndex>,

    pub state: ScanState,

    pub identity: Option<Identity>,

    pub mtime: Option<SystemTime>,

    /// `cumulative_size` is only a lower bound: some descendant errored or
    /// was cancelled.
    pub partial: bool,

    /// Hard-link or followed-symlink alias of an entry visited earlier.
    /// Aliases contribute nothing to their ancestors.
    pub aliased: bool,

    /// Completed from the subtree cache without walking its contents.
    pub cached: bool,

    pub issue: Option<ScanIssue>,

    /// Direct children that are not final yet (directories only).
    pub(crate) outstanding: u64,

    /// The directory listing has arrived; `outstanding` is meaningful.
    pub(crate) listed: bool,

    /// Some entries could not be read while listing this directory.
    pub(crate) listing_errors: bool,

    /// Cut out of the tree by a rescan; kept in the arena so stale indices
    /// held by readers stay valid.
    pub(crate) detached: bool,
}

impl FileNode {
    /// A freshly discovered entry that has not been probed yet.
    pub fn placeholder(name: CompactString, kind: EntryKind, parent: Option<NodeIndex>) -> Self {
        Self {
            name,
            kind,
            self_size: 0,
            allocated_size: 0,
            cumulative_size: 0,
            child_count: 0,
            parent,
            children: Vec::new(),
            state: ScanState::Pending,
            identity: None,
            mtime: None,
            partial: false,
            aliased: false,
            cached: false,
            issue: None,
            outstanding: 0,
            listed: false,
            listing_errors: false,
            detached: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Removed from the tree by a rescan. Indices to it stay valid but it is
    /// no longer reachable from the root.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Still waiting on work from the current walk.
    pub fn is_in_flight(&self) -> bool {
        !self.state.is_final()
    }

    /// Bytes this node contributes to its parent's total.
    pub fn counted_size(&self) -> u64 {
        if self.aliased {
            0
        } else {
            self.cumulative_size
        }
    }
}
