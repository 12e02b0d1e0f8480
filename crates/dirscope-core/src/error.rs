/// Error taxonomy for the scanning core.
///
/// Per-entry problems never abort a scan: they are recorded on the affected
/// node as an [`IssueKind`] and surfaced in the dashboard. Only failures on
/// the scan root itself become a [`ScanError`].
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to stat a single path.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("access denied: {}", .0.display())]
    AccessDenied(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O failure that is not a permission or existence problem, e.g. a
    /// removable or network volume going away mid-scan.
    #[error("I/O error at {}: {source}", path.display())]
    Transient {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// Classify an `io::Error` raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_path_buf()),
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Transient {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// The issue kind recorded on a node that failed this way.
    pub fn issue_kind(&self) -> IssueKind {
        match self {
            Self::AccessDenied(_) => IssueKind::AccessDenied,
            Self::NotFound(_) => IssueKind::NotFound,
            Self::Transient { .. } => IssueKind::Transient,
        }
    }
}

/// What went wrong (or was noteworthy) for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    AccessDenied,
    NotFound,
    Transient,
    /// Hard-link or symlink alias of an already visited entry. Informational.
    Cycle,
    Cancelled,
}

impl IssueKind {
    /// `Cycle` is not an error: aliases are attributed once, so the parent
    /// total stays exact.
    pub fn makes_partial(self) -> bool {
        !matches!(self, IssueKind::Cycle)
    }

    pub fn label(self) -> &'static str {
        match self {
            IssueKind::AccessDenied => "access denied",
            IssueKind::NotFound => "vanished",
            IssueKind::Transient => "I/O error",
            IssueKind::Cycle => "alias",
            IssueKind::Cancelled => "cancelled",
        }
    }
}

/// An issue attached to a node, with an optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ScanIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ProbeError> for ScanIssue {
    fn from(err: &ProbeError) -> Self {
        Self::new(err.issue_kind(), err.to_string())
    }
}

/// Fatal failures for a whole scan session.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot scan {}: {source}", path.display())]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to start scan workers: {0}")]
    Pool(String),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Failures loading or saving a persisted subtree cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache file {} is malformed: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A metric could not be sampled on this tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("metrics are not supported on this platform")]
    Unsupported,

    #[error("sampling failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_probe_taxonomy() {
        let p = Path::new("/x");
        let denied = ProbeError::from_io(p, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.issue_kind(), IssueKind::AccessDenied);

        let gone = ProbeError::from_io(p, io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(gone.issue_kind(), IssueKind::NotFound);

        let other = ProbeError::from_io(p, io::Error::other("device went away"));
        assert_eq!(other.issue_kind(), IssueKind::Transient);
    }

    #[test]
    fn cycle_is_informational() {
        assert!(!IssueKind::Cycle.makes_partial());
        assert!(IssueKind::AccessDenied.makes_partial());
        assert!(IssueKind::Cancelled.makes_partial());
    }
}
