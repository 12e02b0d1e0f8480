/// FS Probe — stat a single path without following symlinks.
///
/// The probe is the only place the scanner touches file metadata. It is
/// read-only and classifies the entry, reports the bytes it owns directly,
/// and returns the device/inode identity used for alias detection.
use crate::error::ProbeError;
use crate::model::{EntryKind, Identity};
use crate::platform;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::SystemTime;

/// Result of probing one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub kind: EntryKind,
    /// Bytes owned by this entry itself: the logical length of a regular
    /// file, 0 for directories, symlinks and special files.
    pub self_size: u64,
    /// Bytes allocated on disk for a regular file (block-rounded, sparse-aware).
    pub allocated_size: u64,
    pub identity: Option<Identity>,
    pub mtime: Option<SystemTime>,
    pub hard_links: u64,
}

impl Probe {
    fn from_metadata(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        };
        let (self_size, allocated_size) = match kind {
            EntryKind::File => (meta.len(), platform::allocated_bytes(meta)),
            _ => (0, 0),
        };
        Self {
            kind,
            self_size,
            allocated_size,
            identity: platform::identity(meta),
            mtime: meta.modified().ok(),
            hard_links: platform::hard_links(meta),
        }
    }

    /// Regular file with more than one hard link: a candidate alias.
    pub fn is_multiply_linked(&self) -> bool {
        self.kind == EntryKind::File && self.hard_links > 1
    }
}

/// Stat `path` itself. A symlink is reported as a symlink; its target is
/// never consulted.
pub fn probe(path: &Path) -> Result<Probe, ProbeError> {
    fs::symlink_metadata(path)
        .map(|meta| Probe::from_metadata(&meta))
        .map_err(|err| ProbeError::from_io(path, err))
}

/// Stat the target of a symlink. Only used when symlink following is
/// enabled; a dangling link surfaces as `NotFound`.
pub fn probe_target(path: &Path) -> Result<Probe, ProbeError> {
    fs::metadata(path)
        .map(|meta| Probe::from_metadata(&meta))
        .map_err(|err| ProbeError::from_io(path, err))
}
