/// Filesystem-backed deletion collaborator.
///
/// Refuses protected locations, measures what it is about to remove, removes
/// it and reports the bytes freed. Every deletion and refusal is logged here;
/// the dashboard never logs deletions itself.
use dirscope_core::delete::{DeleteOutcome, DeleteRequest, DeletionEngine};
use dirscope_core::model::size::format_size;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// System locations that are never removed, nor anything beneath them.
pub const SYSTEM_PREFIXES: &[&str] = &[
    "/System", "/usr", "/bin", "/sbin", "/etc", "/private", "/Library",
];

pub struct FsDeletionEngine {
    home: Option<PathBuf>,
    prefixes: Vec<PathBuf>,
}

impl Default for FsDeletionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FsDeletionEngine {
    /// Engine protecting the current user's home directory and the standard
    /// system prefixes.
    pub fn new() -> Self {
        Self::with_rules(
            dirs::home_dir(),
            SYSTEM_PREFIXES.iter().map(PathBuf::from).collect(),
        )
    }

    pub fn with_rules(home: Option<PathBuf>, prefixes: Vec<PathBuf>) -> Self {
        Self { home, prefixes }
    }

    /// Why `path` must not be removed, if it must not.
    pub fn refusal(&self, path: &Path) -> Option<String> {
        if !path.is_absolute() {
            return Some("refusing a relative path".to_string());
        }
        if path.parent().is_none() {
            return Some("refusing to delete the filesystem root".to_string());
        }
        if self.home.as_deref() == Some(path) {
            return Some("refusing to delete the home directory".to_string());
        }
        self.prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
            .map(|prefix| format!("{} is a protected system location", prefix.display()))
    }
}

impl DeletionEngine for FsDeletionEngine {
    fn delete(&self, request: &DeleteRequest) -> DeleteOutcome {
        let path = &request.path;
        if let Some(reason) = self.refusal(path) {
            warn!("Delete of {} refused: {reason}", path.display());
            return DeleteOutcome::Failed {
                path: path.clone(),
                reason,
            };
        }

        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Delete of {} failed: {err}", path.display());
                return DeleteOutcome::Failed {
                    path: path.clone(),
                    reason: err.to_string(),
                };
            }
        };

        // Best effort: an unreadable corner only makes the figure smaller.
        let measured = measure(path, &meta);
        let removed = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match removed {
            Ok(()) => {
                info!("Deleted {} ({})", path.display(), format_size(measured));
                DeleteOutcome::Deleted {
                    path: path.clone(),
                    bytes_freed: Some(measured),
                }
            }
            Err(err) => {
                warn!("Delete of {} failed: {err}", path.display());
                DeleteOutcome::Failed {
                    path: path.clone(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Logical bytes under `path`, without following symlinks.
fn measure(path: &Path, meta: &fs::Metadata) -> u64 {
    if !meta.is_dir() {
        return meta.len();
    }
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total = total.saturating_add(meta.len());
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine_for(home: &Path) -> FsDeletionEngine {
        FsDeletionEngine::with_rules(
            Some(home.to_path_buf()),
            vec![PathBuf::from("/System"), PathBuf::from("/usr")],
        )
    }

    fn request(path: PathBuf) -> DeleteRequest {
        DeleteRequest {
            path,
            expected_size: 0,
            size_is_partial: false,
        }
    }

    #[test]
    fn refuses_root_home_and_system_prefixes() {
        let engine = engine_for(Path::new("/Users/someone"));
        assert!(engine.refusal(Path::new("/")).is_some());
        assert!(engine.refusal(Path::new("/Users/someone")).is_some());
        assert!(engine.refusal(Path::new("/usr/local/bin")).is_some());
        assert!(engine.refusal(Path::new("/System")).is_some());
        assert!(engine.refusal(Path::new("relative/path")).is_some());

        assert!(engine.refusal(Path::new("/Users/someone/Caches")).is_none());
        assert!(engine.refusal(Path::new("/usrdata")).is_none());
    }

    #[test]
    fn default_rules_cover_the_system_prefixes() {
        let engine = FsDeletionEngine::new();
        for prefix in SYSTEM_PREFIXES {
            assert!(engine.refusal(Path::new(prefix)).is_some());
        }
    }

    #[test]
    fn deletes_directory_and_reports_bytes() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("build");
        fs::create_dir_all(target.join("nested")).unwrap();
        fs::write(target.join("a.bin"), vec![0u8; 300]).unwrap();
        fs::write(target.join("nested").join("b.bin"), vec![0u8; 700]).unwrap();

        let engine = engine_for(Path::new("/nonexistent-home"));
        let outcome = engine.delete(&request(target.clone()));

        assert_eq!(
            outcome,
            DeleteOutcome::Deleted {
                path: target.clone(),
                bytes_freed: Some(1_000),
            }
        );
        assert!(!target.exists());
    }

    #[test]
    fn deletes_single_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("log.txt");
        fs::write(&file, b"hello").unwrap();

        let engine = engine_for(Path::new("/nonexistent-home"));
        let outcome = engine.delete(&request(file.clone()));
        assert!(matches!(
            outcome,
            DeleteOutcome::Deleted {
                bytes_freed: Some(5),
                ..
            }
        ));
        assert!(!file.exists());
    }

    #[test]
    fn missing_path_fails_without_panicking() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_for(Path::new("/nonexistent-home"));
        let outcome = engine.delete(&request(tmp.path().join("gone")));
        assert!(matches!(outcome, DeleteOutcome::Failed { .. }));
    }
}
