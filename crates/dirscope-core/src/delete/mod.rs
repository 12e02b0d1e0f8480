/// Interface to the external deletion collaborator.
///
/// The core never removes anything itself. It hands an exact path (plus the
/// last known size, for the confirmation prompt) to a [`DeletionEngine`] and
/// reacts to the outcome: on success the subtree is invalidated and rescanned,
/// on failure the row gets an inline error. Protection rules, whitelists and
/// the operation log all belong to the engine.
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub path: PathBuf,
    /// `cumulative_size` at the time the user asked, for display only.
    pub expected_size: u64,
    /// The size is a lower bound (scan still running, errors, cancelled).
    pub size_is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted {
        path: PathBuf,
        /// Bytes the engine actually freed, when it can tell.
        bytes_freed: Option<u64>,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
}

impl DeleteOutcome {
    pub fn path(&self) -> &std::path::Path {
        match self {
            DeleteOutcome::Deleted { path, .. } | DeleteOutcome::Failed { path, .. } => path,
        }
    }
}

/// Something that can carry out (or refuse) a deletion.
///
/// Called from a background thread; implementations may block.
pub trait DeletionEngine: Send + Sync {
    fn delete(&self, request: &DeleteRequest) -> DeleteOutcome;
}
