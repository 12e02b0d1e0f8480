/// The aggregator — single writer of the scan tree.
///
/// Applies worker reports in arrival order. A directory tracks how many of
/// its listed children are still outstanding; when the count reaches zero
/// the directory is complete, its children are materialized in size order,
/// its total is written to the subtree cache (unless partial), and its parent
/// is told one more child settled. Leaf sizes are credited to every ancestor
/// the moment they arrive, so totals are live lower bounds.
///
/// The aggregator is a plain struct: the scanner thread feeds it under the
/// `LiveTree` write lock, tests feed it synthetic reports directly.
use super::progress::{NodeUpdate, ScanProgress, WalkKind};
use super::session::ScanSession;
use crate::cache::SubtreeCache;
use crate::error::{IssueKind, ScanIssue};
use crate::model::{FileNode, FileTree, NodeIndex, ScanState};
use crate::probe::Probe;
use crossbeam_channel::{Sender, TrySendError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A walk the caller must start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRequest {
    pub root: PathBuf,
    pub kind: WalkKind,
}

pub struct Aggregator {
    session: Arc<ScanSession>,
    cache: Arc<SubtreeCache>,
    progress_tx: Sender<ScanProgress>,
    /// Messages produced under the tree lock, sent once it is released.
    outbox: Vec<ScanProgress>,
    /// Roots of walks still running.
    walks: HashMap<PathBuf, WalkKind>,
    /// Invalidations that arrived while their subtree was still in flight.
    deferred: Vec<PathBuf>,
    /// Most recently listed directory, for progress display.
    current: PathBuf,
}

/// Insert the scan root into an empty tree, already `Scanning`.
pub fn seed_root(tree: &mut FileTree, probe: &Probe) -> NodeIndex {
    let root = tree.add_root();
    let node = tree.node_mut(root);
    apply_probe(node, probe);
    node.state = ScanState::Scanning;
    root
}

fn apply_probe(node: &mut FileNode, probe: &Probe) {
    node.kind = probe.kind;
    node.self_size = probe.self_size;
    node.allocated_size = probe.allocated_size;
    node.identity = probe.identity;
    node.mtime = probe.mtime;
}

impl Aggregator {
    pub fn new(
        session: Arc<ScanSession>,
        cache: Arc<SubtreeCache>,
        progress_tx: Sender<ScanProgress>,
    ) -> Self {
        let current = session.root().to_path_buf();
        Self {
            session,
            cache,
            progress_tx,
            outbox: Vec::new(),
            walks: HashMap::new(),
            deferred: Vec::new(),
            current,
        }
    }

    /// Register a walk the caller is about to start.
    pub fn begin_walk(&mut self, root: PathBuf, kind: WalkKind) -> WalkRequest {
        self.walks.insert(root.clone(), kind);
        WalkRequest { root, kind }
    }

    pub fn has_active_walks(&self) -> bool {
        !self.walks.is_empty()
    }

    /// Apply one worker report. Returns walks that became startable, which
    /// only happens when a finished walk releases deferred invalidations.
    pub fn apply(&mut self, tree: &mut FileTree, update: NodeUpdate) -> Vec<WalkRequest> {
        match update {
            NodeUpdate::Listed {
                dir,
                entries,
                unreadable,
            } => {
                let Some(idx) = self.live_node(tree, &dir) else {
                    return Vec::new();
                };
                let node = tree.node(idx);
                if node.state != ScanState::Scanning || node.listed {
                    debug!("Ignoring listing of {} in state {:?}", dir.display(), node.state);
                    return Vec::new();
                }
                let count = entries.len() as u64;
                for entry in entries {
                    tree.add_child(
                        idx,
                        FileNode::placeholder(entry.name, entry.kind_hint, None),
                    );
                }
                let node = tree.node_mut(idx);
                node.child_count = count;
                node.outstanding = count;
                node.listed = true;
                if unreadable > 0 {
                    node.listing_errors = true;
                    node.partial = true;
                    tree.mark_ancestors_partial(idx);
                }
                if count == 0 {
                    self.complete_and_settle(tree, idx);
                }
                self.current = dir;
            }

            NodeUpdate::Probed { path, probe } => {
                let Some(idx) = self.live_node(tree, &path) else {
                    return Vec::new();
                };
                let node = tree.node_mut(idx);
                apply_probe(node, &probe);
                if probe.kind.is_dir() {
                    node.state = ScanState::Scanning;
                } else {
                    node.state = ScanState::Complete;
                    tree.credit(idx, probe.self_size);
                    self.settle(tree, idx);
                }
            }

            NodeUpdate::Alias { path, probe } => {
                let Some(idx) = self.live_node(tree, &path) else {
                    return Vec::new();
                };
                let node = tree.node_mut(idx);
                apply_probe(node, &probe);
                node.aliased = true;
                node.listed = true;
                node.issue = Some(ScanIssue::new(
                    IssueKind::Cycle,
                    "already counted through another path",
                ));
                node.state = ScanState::Complete;
                // Aliases contribute nothing, but the node still shows what
                // it would have been for a file.
                node.cumulative_size = probe.self_size;
                self.settle(tree, idx);
            }

            NodeUpdate::Cached {
                path,
                probe,
                cached,
            } => {
                let Some(idx) = self.live_node(tree, &path) else {
                    return Vec::new();
                };
                let node = tree.node_mut(idx);
                apply_probe(node, &probe);
                node.child_count = cached.child_count;
                node.cached = true;
                node.listed = true;
                node.state = ScanState::Complete;
                tree.credit(idx, cached.cumulative_size);
                self.settle(tree, idx);
            }

            NodeUpdate::Failed { path, kind, issue } => {
                let Some(idx) = self.live_node(tree, &path) else {
                    return Vec::new();
                };
                let vanished_rescan_root = issue.kind == IssueKind::NotFound
                    && matches!(
                        self.walks.get(&path),
                        Some(WalkKind::Rescan | WalkKind::Expand)
                    )
                    && tree.node(idx).parent.is_some();
                if vanished_rescan_root {
                    info!("{} no longer exists; removing it", path.display());
                    self.remove_vanished(tree, idx);
                    return Vec::new();
                }

                self.outbox.push(ScanProgress::Error {
                    path: path.display().to_string(),
                    message: issue.message.clone(),
                });
                let node = tree.node_mut(idx);
                node.kind = kind;
                node.state = ScanState::Error;
                node.partial = true;
                node.issue = Some(issue);
                tree.mark_ancestors_partial(idx);
                self.settle(tree, idx);
            }

            NodeUpdate::WalkFinished {
                root,
                kind,
                cancelled,
            } => return self.finish_walk(tree, root, kind, cancelled),
        }
        Vec::new()
    }

    /// Drop cached and live results for `path` and schedule a re-walk.
    ///
    /// Cache entries of every ancestor go too: their captured totals include
    /// whatever was under `path`.
    pub fn invalidate(&mut self, tree: &mut FileTree, path: PathBuf) -> Option<WalkRequest> {
        let dropped = self.cache.invalidate_with_ancestors(&path);
        debug!("Invalidated {} cache entries for {}", dropped, path.display());

        let Some(idx) = tree.lookup(&path) else {
            debug!("Invalidate of untracked path {}", path.display());
            return None;
        };
        if tree.node(idx).is_in_flight() {
            debug!("Deferring invalidation of {} until its walk ends", path.display());
            if !self.deferred.contains(&path) {
                self.deferred.push(path);
            }
            return None;
        }
        self.reset(tree, idx);
        Some(self.begin_walk(path, WalkKind::Rescan))
    }

    /// Walk the contents of a directory that was completed from the cache.
    pub fn expand(&mut self, tree: &mut FileTree, path: PathBuf) -> Option<WalkRequest> {
        let idx = tree.lookup(&path)?;
        let node = tree.node(idx);
        if !(node.cached && node.is_dir() && node.state == ScanState::Complete) {
            debug!("{} has nothing to expand", path.display());
            return None;
        }
        self.reset(tree, idx);
        Some(self.begin_walk(path, WalkKind::Expand))
    }

    /// Queue a running-totals update.
    pub fn publish(&mut self, tree: &FileTree) {
        let counters = self.session.counters();
        self.outbox.push(ScanProgress::Update {
            files_found: counters.files,
            dirs_found: counters.dirs,
            total_size: tree.total_size(),
            errors: counters.errors,
            current_path: self.current.display().to_string(),
        });
    }

    /// Send queued progress. Call with the tree lock released.
    ///
    /// Periodic updates and per-entry errors are dropped when the dashboard
    /// falls behind; terminal messages always get through.
    pub fn flush(&mut self) {
        for message in self.outbox.drain(..) {
            let droppable = matches!(
                message,
                ScanProgress::Update { .. } | ScanProgress::Error { .. }
            );
            if droppable {
                match self.progress_tx.try_send(message) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => return,
                }
            } else if self.progress_tx.send(message).is_err() {
                return;
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn live_node(&self, tree: &FileTree, path: &Path) -> Option<NodeIndex> {
        match tree.lookup(path) {
            Some(idx) if !tree.node(idx).state.is_final() => Some(idx),
            Some(_) => {
                debug!("Late report for settled {}", path.display());
                None
            }
            None => {
                debug!("Report for unknown path {}", path.display());
                None
            }
        }
    }

    /// `idx` became final: tell its parent.
    fn settle(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        if let Some(parent) = tree.node(idx).parent {
            self.child_settled(tree, parent);
        }
    }

    /// One child of `dir` became final. Completes `dir`, and transitively its
    /// ancestors, once nothing below them is outstanding.
    fn child_settled(&mut self, tree: &mut FileTree, dir: NodeIndex) {
        let mut current = dir;
        loop {
            let node = tree.node_mut(current);
            node.outstanding = node.outstanding.saturating_sub(1);
            if !(node.listed && node.outstanding == 0 && node.state == ScanState::Scanning) {
                return;
            }
            self.complete_dir(tree, current);
            match tree.node(current).parent {
                Some(parent) => current = parent,
                None => return,
            }
        }
    }

    fn complete_and_settle(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        self.complete_dir(tree, idx);
        self.settle(tree, idx);
    }

    fn complete_dir(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        let node = tree.node(idx);
        let partial = node.listing_errors
            || node.children.iter().any(|&c| {
                let child = tree.node(c);
                child.partial || matches!(child.state, ScanState::Error | ScanState::Cancelled)
            });

        let node = tree.node_mut(idx);
        node.partial = partial;
        node.state = ScanState::Complete;
        tree.materialize_children(idx);

        let node = tree.node(idx);
        if partial {
            return;
        }
        if let (Some(id), Some(mtime)) = (node.identity, node.mtime) {
            let (size, count) = (node.cumulative_size, node.child_count);
            self.cache.put(&tree.full_path(idx), id, mtime, size, count);
        }
    }

    /// Return `idx` to `Pending` with no children and no contribution, so a
    /// fresh walk can fill it in again.
    fn reset(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        let was_final = tree.node(idx).state.is_final();
        tree.debit_ancestors(idx, tree.node(idx).counted_size());
        let mut released = tree.detach_descendants(idx);

        let node = tree.node_mut(idx);
        if let (Some(id), false) = (node.identity, node.aliased) {
            released.push(id);
        }
        node.self_size = 0;
        node.allocated_size = 0;
        node.cumulative_size = 0;
        node.child_count = 0;
        node.state = ScanState::Pending;
        node.partial = false;
        node.aliased = false;
        node.cached = false;
        node.issue = None;
        node.outstanding = 0;
        node.listed = false;
        node.listing_errors = false;
        self.session.visited.release(&released);

        if was_final {
            self.reopen_ancestors(tree, idx);
        }
    }

    /// Ancestors of a node that is in flight again must wait for it.
    fn reopen_ancestors(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        let mut current = idx;
        while let Some(parent) = tree.node(current).parent {
            let node = tree.node_mut(parent);
            node.outstanding += 1;
            if node.state != ScanState::Complete {
                // Already waiting on something; its own parent counts it.
                return;
            }
            node.state = ScanState::Scanning;
            current = parent;
        }
    }

    fn remove_vanished(&mut self, tree: &mut FileTree, idx: NodeIndex) {
        tree.debit_ancestors(idx, tree.node(idx).counted_size());
        let parent = tree.node(idx).parent;
        let released = tree.prune(idx);
        self.session.visited.release(&released);
        if let Some(parent) = parent {
            self.child_settled(tree, parent);
        }
    }

    fn finish_walk(
        &mut self,
        tree: &mut FileTree,
        root: PathBuf,
        kind: WalkKind,
        cancelled: bool,
    ) -> Vec<WalkRequest> {
        self.walks.remove(&root);
        let idx = tree.lookup(&root);
        if let Some(idx) = idx {
            self.settle_unfinished(tree, idx, cancelled);
        }

        let elapsed = self.session.elapsed();
        let message = match kind {
            WalkKind::Initial => match idx.map(|i| tree.node(i)) {
                Some(node) if node.state == ScanState::Error => ScanProgress::RootFailed {
                    message: node
                        .issue
                        .as_ref()
                        .map(|i| i.message.clone())
                        .unwrap_or_else(|| "scan root could not be read".to_owned()),
                },
                _ if cancelled => ScanProgress::Cancelled { duration: elapsed },
                _ => ScanProgress::Complete {
                    duration: elapsed,
                    error_count: self.session.counters().errors,
                },
            },
            WalkKind::Rescan | WalkKind::Expand => ScanProgress::SubtreeDone {
                path: root.clone(),
                removed: idx.is_none(),
            },
        };
        if kind == WalkKind::Initial {
            info!(
                "Scan of {} ended: {} in {:.2?}",
                root.display(),
                if cancelled { "cancelled" } else { "complete" },
                elapsed
            );
        }
        self.publish(tree);
        self.outbox.push(message);

        let pending = std::mem::take(&mut self.deferred);
        pending
            .into_iter()
            .filter_map(|path| self.invalidate(tree, path))
            .collect()
    }

    /// Everything under a finished walk that never reported becomes
    /// `Cancelled`, and its ancestors partial.
    ///
    /// Subtrees whose root is the root of another walk still running belong
    /// to that walk. They are left alone, and the directories between them
    /// and `walk_root` stay open until those walks settle them.
    fn settle_unfinished(&mut self, tree: &mut FileTree, walk_root: NodeIndex, cancelled: bool) {
        let nested: Vec<NodeIndex> = self
            .walks
            .keys()
            .filter_map(|path| tree.lookup(path))
            .filter(|&i| !tree.node(i).state.is_final())
            .filter(|&i| i != walk_root && tree.ancestors(i).any(|a| a == walk_root))
            .collect();
        let mut owned = HashSet::new();
        let mut waiting = HashSet::new();
        for &inner in &nested {
            owned.extend(tree.subtree(inner));
            waiting.extend(tree.ancestors(inner).take_while(|&a| a != walk_root));
            waiting.insert(walk_root);
        }

        let unfinished: Vec<NodeIndex> = tree
            .subtree(walk_root)
            .into_iter()
            .filter(|i| !owned.contains(i) && !waiting.contains(i))
            .filter(|&i| !tree.node(i).state.is_final())
            .collect();

        if !nested.is_empty() {
            debug!(
                "{} walks still running under {}",
                nested.len(),
                tree.full_path(walk_root).display()
            );
        }
        self.cancel_nodes(tree, &unfinished, walk_root, cancelled);

        // Open directories now wait only on children that are not final.
        for &dir in &waiting {
            let outstanding = tree
                .node(dir)
                .children
                .iter()
                .filter(|&&c| !tree.node(c).state.is_final())
                .count() as u64;
            tree.node_mut(dir).outstanding = outstanding;
        }
    }

    fn cancel_nodes(
        &mut self,
        tree: &mut FileTree,
        unfinished: &[NodeIndex],
        walk_root: NodeIndex,
        cancelled: bool,
    ) {
        if unfinished.is_empty() {
            return;
        }
        if !cancelled {
            warn!(
                "{} entries under {} never reported; marking them cancelled",
                unfinished.len(),
                tree.full_path(walk_root).display()
            );
        }
        for &i in unfinished {
            let node = tree.node_mut(i);
            node.state = ScanState::Cancelled;
            node.partial = true;
            node.outstanding = 0;
            node.issue = Some(ScanIssue::new(IssueKind::Cancelled, "scan cancelled"));
            tree.mark_ancestors_partial(i);
        }
        // Directories above the walk root may still be waiting on it.
        if unfinished.contains(&walk_root) {
            self.settle(tree, walk_root);
        }
    }
}
