/// Dashboard state machine.
///
/// Everything the renderer shows and every transition a key press can cause
/// lives here, with no terminal attached, so the whole dashboard can be
/// driven by synthetic input in tests.
///
/// The scan runs on background threads and publishes into a shared
/// `LiveTree`. [`Dashboard::tick`] drains progress messages, metric samples
/// and deletion outcomes once per frame (each bounded) and never blocks;
/// navigation always works on whatever the tree holds at that moment, even
/// while a directory is still partial.
///
/// ```text
///            Delete            Confirm (dry run) / outcome
///  Browsing ────────▶ ConfirmingDelete ─────────────────────▶ Browsing
///     ▲  │ Enter on cached dir                                    ▲
///     │  └────────────────────▶ Scanning ──── SubtreeDone ────────┘
///   Retry
///  Error ◀──── root could not be scanned
/// ```
use dirscope_core::cache::SubtreeCache;
use dirscope_core::config::Config;
use dirscope_core::delete::{DeleteOutcome, DeleteRequest, DeletionEngine};
use dirscope_core::metrics::{MetricsHistory, SamplerHandle};
use dirscope_core::model::size::{format_size, percent_of};
use dirscope_core::model::{EntryKind, FileNode, FileTree, NodeIndex, ScanState};
use dirscope_core::scanner::progress::ScanProgress;
use dirscope_core::scanner::{start_scan, LiveTree, ScanHandle, ScanOptions};

use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum number of scan-progress messages drained per tick.
///
/// A backlog (after a burst of per-entry errors, say) must not stall the
/// render loop for a perceptible duration.
pub const MAX_MESSAGES_PER_FRAME: usize = 300;

/// Metric samples drained per tick.
const MAX_SAMPLES_PER_FRAME: usize = 16;

/// Deletion outcomes drained per tick.
const MAX_OUTCOMES_PER_FRAME: usize = 8;

/// Scan errors kept for the footer; older ones are dropped.
const MAX_RECENT_ERRORS: usize = 200;

/// The dashboard's top-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Viewing the current directory's children, largest first.
    Browsing,
    /// A row was picked for removal; waiting for confirmation or for the
    /// deletion engine to answer.
    ConfirmingDelete,
    /// The initial walk or a subtree expansion is running. Navigation still
    /// works on the partial tree.
    Scanning,
    /// The scan root could not be scanned. Retry starts over.
    Error,
}

/// Everything the user can ask for, independent of key bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Up,
    Down,
    Top,
    Bottom,
    /// Descend into the selected directory (walking it first if it was
    /// completed from the cache).
    Enter,
    Back,
    Delete,
    Confirm,
    /// Dismiss the delete prompt, or cancel a running scan.
    Cancel,
    Retry,
    /// Full rescan of the root, reusing the subtree cache.
    Rescan,
    Quit,
}

/// Inline note attached to a row by a delete action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    DryRun { would_free: u64 },
    DeleteFailed { reason: String },
}

impl Annotation {
    pub fn label(&self) -> String {
        match self {
            Annotation::DryRun { would_free } => {
                format!("dry run: would free {}", format_size(*would_free))
            }
            Annotation::DeleteFailed { reason } => format!("delete failed: {reason}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Annotation::DeleteFailed { .. })
    }
}

/// Per-row scan state, most significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIndicator {
    Ready,
    Scanning,
    Partial,
    Cancelled,
    Cached,
    Alias,
    Error(String),
}

impl RowIndicator {
    pub fn of(node: &FileNode) -> Self {
        if node.aliased {
            RowIndicator::Alias
        } else if node.state == ScanState::Error {
            let message = node
                .issue
                .as_ref()
                .map(|issue| issue.message.clone())
                .unwrap_or_else(|| "error".to_string());
            RowIndicator::Error(message)
        } else if node.is_in_flight() {
            RowIndicator::Scanning
        } else if node.state == ScanState::Cancelled {
            RowIndicator::Cancelled
        } else if node.partial {
            RowIndicator::Partial
        } else if node.cached {
            RowIndicator::Cached
        } else {
            RowIndicator::Ready
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            RowIndicator::Ready => None,
            RowIndicator::Scanning => Some("scanning…"),
            RowIndicator::Partial => Some("partial"),
            RowIndicator::Cancelled => Some("cancelled"),
            RowIndicator::Cached => Some("cached"),
            RowIndicator::Alias => Some("alias"),
            RowIndicator::Error(message) => Some(message.as_str()),
        }
    }
}

/// One row of the size list, detached from the tree lock.
#[derive(Debug, Clone)]
pub struct RowView {
    pub index: NodeIndex,
    pub name: String,
    /// Cumulative size as shown.
    pub size: u64,
    /// Share of the parent directory's total, 0.0 – 100.0.
    pub percent: f32,
    pub kind: EntryKind,
    pub indicator: RowIndicator,
    pub annotation: Option<Annotation>,
}

/// The slice of the current directory that fits on screen.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub rows: Vec<RowView>,
    /// Selected row within `rows`.
    pub selected: Option<usize>,
    /// Position of `rows[0]` in the full list.
    pub offset: usize,
    /// Length of the full list.
    pub total: usize,
}

/// A delete the user asked for and has not seen resolved yet.
#[derive(Debug, Clone)]
pub struct PendingDelete {
    pub request: DeleteRequest,
    pub name: String,
    /// Confirmed and handed to the engine; further deletes are ignored
    /// until the outcome arrives.
    pub awaiting: bool,
}

/// Running totals as last reported by the scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanStatus {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    pub errors: u64,
    pub current_path: String,
    pub duration: Option<Duration>,
    pub cancelled: bool,
}

/// All dashboard state.
pub struct Dashboard {
    config: Config,
    root: PathBuf,
    cache: Arc<SubtreeCache>,
    engine: Arc<dyn DeletionEngine>,

    // ── Lifecycle ──────────────────────────────────────
    phase: Phase,
    quit: bool,
    scan: Option<ScanHandle>,
    error_message: Option<String>,
    /// The initial walk has not reported completion yet.
    initial_running: bool,
    /// Directory being walked because the user opened a cached entry.
    expanding: Option<PathBuf>,
    status: ScanStatus,
    recent_errors: VecDeque<(String, String)>,
    notice: Option<String>,

    // ── Navigation ─────────────────────────────────────
    current: Option<NodeIndex>,
    /// Selection follows the node, so it stays put while sizes reorder.
    selected: Option<NodeIndex>,
    /// Fallback position when the selected node leaves the list.
    cursor: usize,
    offset: usize,

    // ── Deletion ───────────────────────────────────────
    pending: Option<PendingDelete>,
    annotations: HashMap<PathBuf, Annotation>,
    outcome_tx: Sender<DeleteOutcome>,
    outcome_rx: Receiver<DeleteOutcome>,

    // ── Metrics ────────────────────────────────────────
    history: MetricsHistory,
    sampler: Option<SamplerHandle>,
}

impl Dashboard {
    pub fn new(
        config: Config,
        root: PathBuf,
        cache: Arc<SubtreeCache>,
        engine: Arc<dyn DeletionEngine>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let history = MetricsHistory::new(config.history_len);
        Self {
            config,
            root,
            cache,
            engine,
            phase: Phase::Browsing,
            quit: false,
            scan: None,
            error_message: None,
            initial_running: false,
            expanding: None,
            status: ScanStatus::default(),
            recent_errors: VecDeque::new(),
            notice: None,
            current: None,
            selected: None,
            cursor: 0,
            offset: 0,
            pending: None,
            annotations: HashMap::new(),
            outcome_tx,
            outcome_rx,
            history,
            sampler: None,
        }
    }

    /// Start (or restart) a scan session of the root.
    ///
    /// Any previous session is cancelled and dropped; the subtree cache is
    /// shared with the new one. A root that cannot be scanned moves the
    /// dashboard to [`Phase::Error`].
    pub fn start(&mut self) {
        self.scan = None;
        self.error_message = None;
        self.expanding = None;
        self.status = ScanStatus::default();
        self.recent_errors.clear();
        self.pending = None;
        self.annotations.clear();
        self.current = None;
        self.selected = None;
        self.cursor = 0;
        self.offset = 0;

        match start_scan(
            &self.root,
            ScanOptions::from(&self.config),
            Arc::clone(&self.cache),
        ) {
            Ok(handle) => {
                self.current = handle.live_tree.read().root();
                self.scan = Some(handle);
                self.initial_running = true;
                self.phase = Phase::Scanning;
            }
            Err(err) => {
                warn!("Scan of {} failed to start: {err}", self.root.display());
                self.error_message = Some(err.to_string());
                self.initial_running = false;
                self.phase = Phase::Error;
            }
        }
    }

    /// Feed metric samples from a running sampler into the history.
    pub fn attach_sampler(&mut self, sampler: SamplerHandle) {
        self.sampler = Some(sampler);
    }

    // ── Input ──────────────────────────────────────────

    pub fn handle_input(&mut self, input: Input) {
        match (self.phase, input) {
            (Phase::ConfirmingDelete, Input::Quit) if self.is_awaiting_delete() => {
                self.notice = Some("Waiting for the deletion to finish".to_string());
            }
            (_, Input::Quit) => {
                if let Some(scan) = &self.scan {
                    scan.cancel();
                }
                self.quit = true;
            }

            (Phase::Error, Input::Retry | Input::Rescan) => self.start(),
            (Phase::Error, _) => {}

            (Phase::ConfirmingDelete, Input::Confirm) => self.confirm_delete(),
            (Phase::ConfirmingDelete, Input::Cancel) => self.dismiss_delete(),
            (Phase::ConfirmingDelete, _) => {}

            (Phase::Scanning, Input::Cancel) => self.cancel_scan(),
            (Phase::Browsing, Input::Cancel) => self.notice = None,

            (_, Input::Rescan) => {
                info!("Rescanning {}", self.root.display());
                self.start();
            }
            (_, Input::Delete) => self.request_delete(),
            (_, Input::Up) => self.move_cursor(|pos, _| pos.saturating_sub(1)),
            (_, Input::Down) => self.move_cursor(|pos, len| (pos + 1).min(len - 1)),
            (_, Input::Top) => self.move_cursor(|_, _| 0),
            (_, Input::Bottom) => self.move_cursor(|_, len| len - 1),
            (_, Input::Enter) => self.enter(),
            (_, Input::Back) => self.back(),
            (_, Input::Confirm | Input::Retry) => {}
        }
    }

    // ── Per-frame update ───────────────────────────────

    /// Merge everything that arrived since the last frame. Never blocks.
    pub fn tick(&mut self) {
        let messages: Vec<ScanProgress> = match &self.scan {
            Some(scan) => scan
                .progress_rx
                .try_iter()
                .take(MAX_MESSAGES_PER_FRAME)
                .collect(),
            None => Vec::new(),
        };
        for message in messages {
            self.apply_progress(message);
        }

        if let Some(sampler) = &self.sampler {
            for sample in sampler.receiver.try_iter().take(MAX_SAMPLES_PER_FRAME) {
                self.history.push(sample);
            }
        }

        let outcomes: Vec<DeleteOutcome> = self
            .outcome_rx
            .try_iter()
            .take(MAX_OUTCOMES_PER_FRAME)
            .collect();
        for outcome in outcomes {
            self.finish_delete(outcome);
        }

        self.repair_navigation();
    }

    fn apply_progress(&mut self, message: ScanProgress) {
        match message {
            ScanProgress::Update {
                files_found,
                dirs_found,
                total_size,
                errors,
                current_path,
            } => {
                self.status.files = files_found;
                self.status.dirs = dirs_found;
                self.status.bytes = total_size;
                self.status.errors = errors;
                self.status.current_path = current_path;
            }
            ScanProgress::Error { path, message } => {
                if self.recent_errors.len() == MAX_RECENT_ERRORS {
                    self.recent_errors.pop_front();
                }
                self.recent_errors.push_back((path, message));
            }
            ScanProgress::Complete {
                duration,
                error_count,
            } => {
                self.initial_running = false;
                self.status.duration = Some(duration);
                self.status.errors = error_count;
                self.settle_phase();
            }
            ScanProgress::Cancelled { duration } => {
                self.initial_running = false;
                self.status.duration = Some(duration);
                self.status.cancelled = true;
                self.notice = Some("Scan cancelled; sizes shown are lower bounds".to_string());
                self.settle_phase();
            }
            ScanProgress::RootFailed { message } => {
                warn!("Scan root {} failed: {message}", self.root.display());
                self.initial_running = false;
                self.expanding = None;
                self.pending = None;
                self.error_message = Some(message);
                self.phase = Phase::Error;
            }
            ScanProgress::SubtreeDone { path, removed } => {
                if self.expanding.as_deref() == Some(path.as_path()) {
                    self.expanding = None;
                }
                if removed {
                    self.annotations.remove(&path);
                }
                self.settle_phase();
            }
        }
    }

    /// Leave `Scanning` once nothing the user is waiting for is running.
    fn settle_phase(&mut self) {
        if self.phase == Phase::Scanning && !self.is_busy() {
            self.phase = Phase::Browsing;
        }
    }

    /// Where the dashboard rests when no prompt is open.
    fn resting_phase(&self) -> Phase {
        if self.is_busy() {
            Phase::Scanning
        } else {
            Phase::Browsing
        }
    }

    /// Step out of directories a rescan removed from the tree.
    fn repair_navigation(&mut self) {
        let (Some(live), Some(mut dir)) = (self.live_tree(), self.current) else {
            return;
        };
        let tree = live.read();
        let mut moved = false;
        while tree.node(dir).is_detached() {
            match tree.node(dir).parent {
                Some(parent) => {
                    dir = parent;
                    moved = true;
                }
                None => break,
            }
        }
        if moved {
            self.current = Some(dir);
            self.selected = None;
            self.cursor = 0;
            self.offset = 0;
        }
    }

    // ── Navigation ─────────────────────────────────────

    fn move_cursor(&mut self, step: impl FnOnce(usize, usize) -> usize) {
        let (Some(live), Some(dir)) = (self.live_tree(), self.current) else {
            return;
        };
        let tree = live.read();
        let order = tree.children_sorted_by_size(dir);
        if order.is_empty() {
            return;
        }
        let pos = step(self.position_in(&order), order.len());
        self.cursor = pos;
        self.selected = order.get(pos).copied();
    }

    fn enter(&mut self) {
        let Some(live) = self.live_tree() else {
            return;
        };
        let tree = live.read();
        let Some(idx) = self.selected_in(&tree) else {
            return;
        };
        let node = tree.node(idx);
        if !node.is_dir() {
            return;
        }
        if node.aliased {
            self.notice = Some(format!(
                "{} is already counted under another path",
                node.name
            ));
            return;
        }
        let needs_walk = node.cached
            && node.state == ScanState::Complete
            && node.children.is_empty()
            && node.child_count > 0;
        let path = tree.full_path(idx);
        drop(tree);

        self.current = Some(idx);
        self.selected = None;
        self.cursor = 0;
        self.offset = 0;

        if needs_walk {
            if let Some(scan) = &self.scan {
                debug!("Expanding cached {}", path.display());
                scan.expand(path.clone());
                self.expanding = Some(path);
                self.phase = Phase::Scanning;
            }
        }
    }

    fn back(&mut self) {
        let (Some(live), Some(dir)) = (self.live_tree(), self.current) else {
            return;
        };
        let parent = live.read().node(dir).parent;
        if let Some(parent) = parent {
            self.current = Some(parent);
            self.selected = Some(dir);
            self.offset = 0;
        }
    }

    fn cancel_scan(&mut self) {
        if let Some(scan) = &self.scan {
            info!("Cancelling scan of {}", self.root.display());
            scan.cancel();
            self.notice = Some("Cancelling…".to_string());
        }
    }

    // ── Deletion ───────────────────────────────────────

    fn request_delete(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let Some(live) = self.live_tree() else {
            return;
        };
        let tree = live.read();
        let Some(idx) = self.selected_in(&tree) else {
            return;
        };
        let node = tree.node(idx);
        let request = DeleteRequest {
            path: tree.full_path(idx),
            expected_size: node.counted_size(),
            size_is_partial: node.partial || node.is_in_flight(),
        };
        self.pending = Some(PendingDelete {
            request,
            name: node.name.to_string(),
            awaiting: false,
        });
        self.phase = Phase::ConfirmingDelete;
    }

    fn confirm_delete(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            self.phase = self.resting_phase();
            return;
        };
        if pending.awaiting {
            return;
        }

        if self.config.dry_run {
            let request = pending.request.clone();
            self.pending = None;
            self.annotations.insert(
                request.path,
                Annotation::DryRun {
                    would_free: request.expected_size,
                },
            );
            self.phase = self.resting_phase();
            return;
        }

        pending.awaiting = true;
        let request = pending.request.clone();
        let engine = Arc::clone(&self.engine);
        let tx = self.outcome_tx.clone();
        let path = request.path.clone();
        let spawned = thread::Builder::new()
            .name("dirscope-delete".into())
            .spawn(move || {
                let outcome = engine.delete(&request);
                let _ = tx.send(outcome);
            });
        if let Err(err) = spawned {
            self.finish_delete(DeleteOutcome::Failed {
                path,
                reason: format!("could not start deletion: {err}"),
            });
        }
    }

    fn dismiss_delete(&mut self) {
        if self.is_awaiting_delete() {
            return;
        }
        self.pending = None;
        self.phase = self.resting_phase();
    }

    fn finish_delete(&mut self, outcome: DeleteOutcome) {
        let expected = matches!(
            &self.pending,
            Some(p) if p.awaiting && p.request.path.as_path() == outcome.path()
        );
        if !expected {
            debug!("Ignoring outcome for {}", outcome.path().display());
            return;
        }
        self.pending = None;

        match outcome {
            DeleteOutcome::Deleted { path, bytes_freed } => {
                self.annotations.remove(&path);
                self.notice = Some(match bytes_freed {
                    Some(bytes) => format!("Deleted {} (freed {})", path.display(), format_size(bytes)),
                    None => format!("Deleted {}", path.display()),
                });
                if let Some(scan) = &self.scan {
                    scan.invalidate(path);
                }
            }
            DeleteOutcome::Failed { path, reason } => {
                self.annotations
                    .insert(path, Annotation::DeleteFailed { reason });
            }
        }
        self.phase = self.resting_phase();
    }

    // ── Views ──────────────────────────────────────────

    /// The rows of the current directory that fit in `height` lines,
    /// scrolled so the selection stays visible.
    pub fn listing(&mut self, height: usize) -> Listing {
        let (Some(live), Some(dir)) = (self.live_tree(), self.current) else {
            return Listing::default();
        };
        let tree = live.read();
        let order = tree.children_sorted_by_size(dir);
        if order.is_empty() {
            self.selected = None;
            self.cursor = 0;
            self.offset = 0;
            return Listing::default();
        }

        let cursor = self.position_in(&order);
        self.cursor = cursor;
        self.selected = order.get(cursor).copied();

        let height = height.max(1);
        if cursor < self.offset {
            self.offset = cursor;
        } else if cursor >= self.offset + height {
            self.offset = cursor + 1 - height;
        }
        self.offset = self.offset.min(order.len().saturating_sub(height));

        let parent_size = tree.node(dir).cumulative_size;
        let rows = order
            .iter()
            .skip(self.offset)
            .take(height)
            .map(|&idx| self.row_view(&tree, idx, parent_size))
            .collect();
        Listing {
            rows,
            selected: Some(cursor - self.offset),
            offset: self.offset,
            total: order.len(),
        }
    }

    /// Every row of the current directory, largest first.
    pub fn rows(&self) -> Vec<RowView> {
        let (Some(live), Some(dir)) = (self.live_tree(), self.current) else {
            return Vec::new();
        };
        let tree = live.read();
        let parent_size = tree.node(dir).cumulative_size;
        tree.children_sorted_by_size(dir)
            .into_iter()
            .map(|idx| self.row_view(&tree, idx, parent_size))
            .collect()
    }

    pub fn selected_row(&self) -> Option<RowView> {
        let live = self.live_tree()?;
        let tree = live.read();
        let dir = self.current?;
        let idx = self.selected_in(&tree)?;
        Some(self.row_view(&tree, idx, tree.node(dir).cumulative_size))
    }

    fn row_view(&self, tree: &FileTree, idx: NodeIndex, parent_size: u64) -> RowView {
        let node = tree.node(idx);
        let annotation = if self.annotations.is_empty() {
            None
        } else {
            self.annotations.get(&tree.full_path(idx)).cloned()
        };
        RowView {
            index: idx,
            name: node.name.to_string(),
            size: node.cumulative_size,
            percent: percent_of(node.counted_size(), parent_size),
            kind: node.kind,
            indicator: RowIndicator::of(node),
            annotation,
        }
    }

    fn position_in(&self, order: &[NodeIndex]) -> usize {
        self.selected
            .and_then(|sel| order.iter().position(|&idx| idx == sel))
            .unwrap_or_else(|| self.cursor.min(order.len().saturating_sub(1)))
    }

    fn selected_in(&self, tree: &FileTree) -> Option<NodeIndex> {
        let order = tree.children_sorted_by_size(self.current?);
        order.get(self.position_in(&order)).copied()
    }

    // ── Accessors ──────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn live_tree(&self) -> Option<LiveTree> {
        self.scan.as_ref().map(|scan| Arc::clone(&scan.live_tree))
    }

    /// The initial walk or an expansion is still running.
    pub fn is_busy(&self) -> bool {
        self.initial_running || self.expanding.is_some()
    }

    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    pub fn recent_errors(&self) -> impl Iterator<Item = &(String, String)> {
        self.recent_errors.iter()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn pending_delete(&self) -> Option<&PendingDelete> {
        self.pending.as_ref()
    }

    pub fn is_awaiting_delete(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.awaiting)
    }

    pub fn annotation(&self, path: &Path) -> Option<&Annotation> {
        self.annotations.get(path)
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    /// Path of the directory being browsed.
    pub fn current_path(&self) -> Option<PathBuf> {
        let live = self.live_tree()?;
        let tree = live.read();
        Some(tree.full_path(self.current?))
    }

    /// Cumulative size of the directory being browsed and whether it is
    /// still a lower bound.
    pub fn current_size(&self) -> Option<(u64, bool)> {
        let live = self.live_tree()?;
        let tree = live.read();
        let node = tree.node(self.current?);
        Some((node.cumulative_size, node.partial || node.is_in_flight()))
    }

    pub fn total_size(&self) -> u64 {
        self.live_tree()
            .map(|live| live.read().total_size())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirscope_core::error::{IssueKind, ScanIssue};

    fn node(state: ScanState) -> FileNode {
        let mut node = FileNode::placeholder("x".into(), EntryKind::Directory, None);
        node.state = state;
        node
    }

    #[test]
    fn indicator_prefers_alias_and_errors() {
        let mut alias = node(ScanState::Complete);
        alias.aliased = true;
        alias.cached = true;
        assert_eq!(RowIndicator::of(&alias), RowIndicator::Alias);

        let mut failed = node(ScanState::Error);
        failed.issue = Some(ScanIssue::new(IssueKind::AccessDenied, "permission denied"));
        assert_eq!(
            RowIndicator::of(&failed).label(),
            Some("permission denied")
        );
    }

    #[test]
    fn indicator_tracks_scan_state() {
        assert_eq!(RowIndicator::of(&node(ScanState::Pending)), RowIndicator::Scanning);
        assert_eq!(RowIndicator::of(&node(ScanState::Scanning)), RowIndicator::Scanning);
        assert_eq!(RowIndicator::of(&node(ScanState::Cancelled)), RowIndicator::Cancelled);
        assert_eq!(RowIndicator::of(&node(ScanState::Complete)), RowIndicator::Ready);

        let mut partial = node(ScanState::Complete);
        partial.partial = true;
        assert_eq!(RowIndicator::of(&partial), RowIndicator::Partial);

        let mut cached = node(ScanState::Complete);
        cached.cached = true;
        assert_eq!(RowIndicator::of(&cached).label(), Some("cached"));
    }

    #[test]
    fn dry_run_label_names_the_size() {
        let note = Annotation::DryRun {
            would_free: 10 * 1024 * 1024,
        };
        assert_eq!(note.label(), "dry run: would free 10.0 MB");
        assert!(!note.is_error());
    }
}
