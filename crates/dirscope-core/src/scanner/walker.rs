/// Parallel directory walker on a bounded rayon pool.
///
/// Every directory expansion is one task in a `rayon::Scope`. A task reads
/// the directory listing into memory and closes the handle before probing
/// anything, so the number of open directory handles never exceeds the pool
/// size no matter how wide or deep the tree is.
///
/// Workers never touch the tree. They report through the aggregator channel
/// in a fixed per-directory order: one `Listed`, then exactly one
/// `Probed`/`Alias`/`Cached`/`Failed` per listed entry. The cancellation
/// signal is checked between entries; a cancelled task simply returns and
/// the aggregator settles whatever never reported.
///
/// Paths sent to the aggregator are built from lossily decoded names so they
/// match the tree's own path index; filesystem calls always use the real
/// `OsString` names.
use super::progress::{ListedEntry, NodeUpdate, WalkKind};
use super::session::ScanSession;
use crate::cache::SubtreeCache;
use crate::error::{ProbeError, ScanIssue};
use crate::model::EntryKind;
use crate::probe::{self, Probe};
use compact_str::CompactString;
use crossbeam_channel::Sender;
use rayon::{Scope, ThreadPool};
use std::ffi::OsString;
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything one walk's workers share.
pub(crate) struct Walk {
    pub session: Arc<ScanSession>,
    pub cache: Arc<SubtreeCache>,
    pub tx: Sender<NodeUpdate>,
    pub follow_symlinks: bool,
    /// Session epoch at spawn time; a change means cancelled.
    pub epoch: u64,
}

/// Walk the subtree at `root` on `pool`, then report `WalkFinished`.
///
/// Blocks the calling thread until every task of the walk has returned.
pub(crate) fn run(pool: &ThreadPool, walk: &Walk, root: PathBuf, kind: WalkKind) {
    let started = Instant::now();
    debug!("Walk ({kind:?}) of {} started", root.display());

    pool.scope(|s| walk.visit_root(s, root.clone()));

    let cancelled = walk.cancelled();
    info!(
        "Walk ({kind:?}) of {} {} after {:.2?}",
        root.display(),
        if cancelled { "cancelled" } else { "finished" },
        started.elapsed()
    );
    walk.send(NodeUpdate::WalkFinished {
        root,
        kind,
        cancelled,
    });
}

impl Walk {
    #[inline]
    fn cancelled(&self) -> bool {
        self.session.is_cancelled(self.epoch)
    }

    fn send(&self, update: NodeUpdate) {
        // The aggregator only goes away when the session is being torn
        // down, at which point there is nobody left to tell.
        let _ = self.tx.send(update);
    }

    fn fail(&self, path: PathBuf, kind: EntryKind, err: &ProbeError) {
        self.session.record_error();
        debug!("Scan error: {err}");
        self.send(NodeUpdate::Failed {
            path,
            kind,
            issue: ScanIssue::from(err),
        });
    }

    /// The walk root is always probed and listed fresh; it is never served
    /// from the cache.
    fn visit_root<'s>(&'s self, scope: &Scope<'s>, root: PathBuf) {
        let probe = match probe::probe(&root) {
            Ok(p) => p,
            Err(err) => {
                self.fail(root, EntryKind::Directory, &err);
                return;
            }
        };
        let probe = match probe.kind {
            EntryKind::Symlink if self.follow_symlinks => match probe::probe_target(&root) {
                Ok(target) if target.kind.is_dir() => target,
                _ => probe,
            },
            _ => probe,
        };
        if !probe.kind.is_dir() {
            self.leaf(root, probe);
            return;
        }
        if let Some(id) = probe.identity {
            // The session root is registered before its first walk.
            self.session.visited.insert(id);
        }
        self.session.record_dir();
        self.send(NodeUpdate::Probed {
            path: root.clone(),
            probe,
        });
        self.expand(scope, root.clone(), root);
    }

    /// List `real` and probe every entry. `key` is the same directory as the
    /// tree names it.
    fn expand<'s>(&'s self, scope: &Scope<'s>, real: PathBuf, key: PathBuf) {
        if self.cancelled() {
            return;
        }

        let listing = match read_listing(&real) {
            Ok(listing) => listing,
            Err(err) => {
                let err = ProbeError::from_io(&key, err);
                self.fail(key, EntryKind::Directory, &err);
                return;
            }
        };
        if listing.unreadable > 0 {
            self.session.record_error();
            debug!(
                "{} entries of {} could not be read",
                listing.unreadable,
                key.display()
            );
        }
        if self.cancelled() {
            return;
        }

        let Listing {
            names,
            entries,
            unreadable,
        } = listing;
        let hints: Vec<(CompactString, EntryKind)> = entries
            .iter()
            .map(|e| (e.name.clone(), e.kind_hint))
            .collect();
        self.send(NodeUpdate::Listed {
            dir: key.clone(),
            entries,
            unreadable,
        });

        for (os_name, (name, hint)) in names.into_iter().zip(hints) {
            if self.cancelled() {
                return;
            }
            let child_real = real.join(&os_name);
            let child_key = key.join(name.as_str());
            self.visit(scope, child_real, child_key, hint);
        }
    }

    fn visit<'s>(&'s self, scope: &Scope<'s>, real: PathBuf, key: PathBuf, hint: EntryKind) {
        let probe = match probe::probe(&real) {
            Ok(p) => p,
            Err(err) => {
                self.fail(key, hint, &err);
                return;
            }
        };

        match probe.kind {
            EntryKind::Directory => self.descend(scope, real, key, probe),
            EntryKind::Symlink if self.follow_symlinks => match probe::probe_target(&real) {
                Ok(target) if target.kind.is_dir() => self.descend(scope, real, key, target),
                // Dangling links and links to files keep their own (zero) size.
                _ => self.leaf(key, probe),
            },
            _ => self.leaf(key, probe),
        }
    }

    fn leaf(&self, key: PathBuf, probe: Probe) {
        if probe.is_multiply_linked() {
            if let Some(id) = probe.identity {
                if !self.session.visited.insert(id) {
                    self.send(NodeUpdate::Alias { path: key, probe });
                    return;
                }
            }
        }
        self.session.record_file(probe.self_size);
        self.send(NodeUpdate::Probed { path: key, probe });
    }

    fn descend<'s>(&'s self, scope: &Scope<'s>, real: PathBuf, key: PathBuf, probe: Probe) {
        if let Some(id) = probe.identity {
            if !self.session.visited.insert(id) {
                debug!("{} was already visited; counting once", key.display());
                self.send(NodeUpdate::Alias { path: key, probe });
                return;
            }
        }

        if let (Some(id), Some(mtime)) = (probe.identity, probe.mtime) {
            if let Some(cached) = self.cache.get(&key, id, mtime) {
                self.session.record_dir();
                self.send(NodeUpdate::Cached {
                    path: key,
                    probe,
                    cached,
                });
                return;
            }
        }

        self.session.record_dir();
        self.send(NodeUpdate::Probed {
            path: key.clone(),
            probe,
        });
        scope.spawn(move |s| self.expand(s, real, key));
    }
}

struct Listing {
    names: Vec<OsString>,
    entries: Vec<ListedEntry>,
    unreadable: u32,
}

/// Read a whole directory listing. The directory handle is closed before
/// this returns.
fn read_listing(dir: &Path) -> std::io::Result<Listing> {
    let mut listing = Listing {
        names: Vec::new(),
        entries: Vec::new(),
        unreadable: 0,
    };
    for item in fs::read_dir(dir)? {
        match item {
            Ok(entry) => {
                let os_name = entry.file_name();
                let kind_hint = entry
                    .file_type()
                    .map(kind_from_file_type)
                    .unwrap_or(EntryKind::Inaccessible);
                listing.entries.push(ListedEntry {
                    name: CompactString::new(os_name.to_string_lossy()),
                    kind_hint,
                });
                listing.names.push(os_name);
            }
            Err(_) => listing.unreadable = listing.unreadable.saturating_add(1),
        }
    }
    Ok(listing)
}

fn kind_from_file_type(ft: FileType) -> EntryKind {
    if ft.is_symlink() {
        EntryKind::Symlink
    } else if ft.is_dir() {
        EntryKind::Directory
    } else if ft.is_file() {
        EntryKind::File
    } else {
        EntryKind::Special
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn walk_of(session: Arc<ScanSession>, tx: Sender<NodeUpdate>) -> Walk {
        let epoch = session.epoch();
        Walk {
            session,
            cache: Arc::new(SubtreeCache::new(64)),
            tx,
            follow_symlinks: false,
            epoch,
        }
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn every_listed_entry_gets_exactly_one_report() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::File::create(tmp.path().join("a.txt"))
            .unwrap()
            .write_all(b"hello")
            .unwrap();
        fs::File::create(tmp.path().join("sub/b.txt")).unwrap();

        let session = Arc::new(ScanSession::new(tmp.path().to_path_buf()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let walk = walk_of(Arc::clone(&session), tx);
        run(&pool(), &walk, tmp.path().to_path_buf(), WalkKind::Initial);
        drop(walk);

        let updates: Vec<NodeUpdate> = rx.iter().collect();
        let listed: usize = updates
            .iter()
            .map(|u| match u {
                NodeUpdate::Listed { entries, .. } => entries.len(),
                _ => 0,
            })
            .sum();
        let reports = updates
            .iter()
            .filter(|u| {
                matches!(
                    u,
                    NodeUpdate::Probed { .. }
                        | NodeUpdate::Alias { .. }
                        | NodeUpdate::Cached { .. }
                        | NodeUpdate::Failed { .. }
                )
            })
            .count();
        // One extra report for the walk root itself.
        assert_eq!(reports, listed + 1);
        assert!(matches!(
            updates.last(),
            Some(NodeUpdate::WalkFinished {
                cancelled: false,
                ..
            })
        ));
        assert_eq!(session.counters().files, 2);
        assert_eq!(session.counters().bytes, 5);
    }

    #[test]
    fn listing_precedes_its_entries() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        fs::File::create(tmp.path().join("x/y/z")).unwrap();

        let session = Arc::new(ScanSession::new(tmp.path().to_path_buf()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let walk = walk_of(session, tx);
        run(&pool(), &walk, tmp.path().to_path_buf(), WalkKind::Initial);
        drop(walk);

        let mut listed = std::collections::HashSet::new();
        listed.insert(tmp.path().parent().unwrap().to_path_buf());
        for update in rx.iter() {
            match update {
                NodeUpdate::Listed { dir, .. } => {
                    listed.insert(dir);
                }
                NodeUpdate::Probed { path, .. } => {
                    let parent = path.parent().unwrap().to_path_buf();
                    assert!(listed.contains(&parent), "{} before its listing", path.display());
                }
                _ => {}
            }
        }
    }

    #[test]
    fn cancelled_walk_reports_cancellation() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let session = Arc::new(ScanSession::new(tmp.path().to_path_buf()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let walk = walk_of(Arc::clone(&session), tx);
        session.cancel();
        run(&pool(), &walk, tmp.path().to_path_buf(), WalkKind::Initial);
        drop(walk);

        let updates: Vec<NodeUpdate> = rx.iter().collect();
        assert!(!updates
            .iter()
            .any(|u| matches!(u, NodeUpdate::Listed { .. })));
        assert!(matches!(
            updates.last(),
            Some(NodeUpdate::WalkFinished {
                cancelled: true,
                ..
            })
        ));
    }
}
