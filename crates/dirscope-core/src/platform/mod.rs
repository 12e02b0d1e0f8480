/// Platform-specific metadata accessors.
///
/// Everything that needs `std::os::*` extension traits lives here so the
/// probe and scanner stay portable. On unix the device/inode pair gives a
/// stable identity for hard-link and cycle detection; elsewhere no identity
/// is available and alias detection is simply skipped.
use crate::model::Identity;
use std::fs::Metadata;

#[cfg(unix)]
mod imp {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    pub fn identity(meta: &Metadata) -> Option<Identity> {
        Some(Identity {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    pub fn hard_links(meta: &Metadata) -> u64 {
        meta.nlink()
    }

    /// `st_blocks` is always in 512-byte units, regardless of the
    /// filesystem block size.
    pub fn allocated_bytes(meta: &Metadata) -> u64 {
        meta.blocks().saturating_mul(512)
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    pub fn identity(_meta: &Metadata) -> Option<Identity> {
        None
    }

    pub fn hard_links(_meta: &Metadata) -> u64 {
        1
    }

    pub fn allocated_bytes(meta: &Metadata) -> u64 {
        meta.len()
    }
}

pub use imp::{allocated_bytes, hard_links, identity};
