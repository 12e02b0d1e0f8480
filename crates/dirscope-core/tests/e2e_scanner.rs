/// End-to-end scanner integration tests.
///
/// These run the real worker pool, aggregator thread and subtree cache
/// against temporary directories and observe the result through the
/// `LiveTree` and the progress channel, exactly as the dashboard does.
///
/// Large files are created sparse with `set_len`, so a 10 MB fixture costs
/// no disk space; the scanner reports logical length, not allocation.
use dirscope_core::cache::SubtreeCache;
use dirscope_core::error::{IssueKind, ScanError};
use dirscope_core::model::{EntryKind, ScanState};
use dirscope_core::scanner::progress::ScanProgress;
use dirscope_core::scanner::{start_scan, ScanHandle, ScanOptions, PROGRESS_CHANNEL_CAPACITY};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const MB: u64 = 1024 * 1024;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// ```text
/// root/
///   a.bin     (10 MB)
///   sub/
///     b.bin   (5 MB)
///     c.bin   (2 MB)
/// ```
fn build_test_tree(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    sparse(&root.join("a.bin"), 10 * MB);
    sparse(&root.join("sub/b.bin"), 5 * MB);
    sparse(&root.join("sub/c.bin"), 2 * MB);
}

fn sparse(path: &Path, len: u64) {
    fs::File::create(path).unwrap().set_len(len).unwrap();
}

fn options() -> ScanOptions {
    ScanOptions {
        concurrency: 4,
        follow_symlinks: false,
    }
}

fn fresh_cache() -> Arc<SubtreeCache> {
    Arc::new(SubtreeCache::new(1_000))
}

/// Wait for the first progress message matching `pred`, panicking after a
/// generous timeout so a stuck scan cannot hang the suite.
fn wait_for(handle: &ScanHandle, pred: impl Fn(&ScanProgress) -> bool) -> ScanProgress {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        assert!(Instant::now() < deadline, "scanner did not report in 30 seconds");
        match handle.progress_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(msg) if pred(&msg) => return msg,
            Ok(_) | Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                panic!("scanner channel disconnected")
            }
        }
    }
}

fn wait_complete(handle: &ScanHandle) {
    match wait_for(handle, |m| {
        matches!(
            m,
            ScanProgress::Complete { .. }
                | ScanProgress::Cancelled { .. }
                | ScanProgress::RootFailed { .. }
        )
    }) {
        ScanProgress::Complete { .. } => {}
        other => panic!("expected Complete, got {other:?}"),
    }
}

fn wait_subtree(handle: &ScanHandle) -> bool {
    match wait_for(handle, |m| matches!(m, ScanProgress::SubtreeDone { .. })) {
        ScanProgress::SubtreeDone { removed, .. } => removed,
        _ => unreachable!(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn totals_match_logical_file_lengths() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);

    let tree = handle.live_tree.read();
    let root = tree.root().unwrap();
    assert_eq!(tree.total_size(), 17 * MB);
    assert_eq!(tree.node(root).state, ScanState::Complete);
    assert!(!tree.node(root).partial);

    let sub = tree.lookup(&handle.root_path().join("sub")).unwrap();
    assert_eq!(tree.node(sub).cumulative_size, 7 * MB);
    assert_eq!(tree.node(sub).child_count, 2);

    let order: Vec<_> = tree
        .children_sorted_by_size(root)
        .into_iter()
        .map(|c| tree.node(c).name.to_string())
        .collect();
    assert_eq!(order, ["a.bin", "sub"]);
    assert_eq!(handle.counters().files, 3);
}

#[test]
fn two_root_files_and_one_nested_file() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    fs::create_dir(tmp.path().join("sub")).unwrap();
    sparse(&tmp.path().join("a.bin"), 10 * MB);
    sparse(&tmp.path().join("b.bin"), 5 * MB);
    sparse(&tmp.path().join("sub/c.bin"), 2 * MB);

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    let done = wait_for(&handle, |m| matches!(m, ScanProgress::Complete { .. }));
    assert!(matches!(done, ScanProgress::Complete { error_count: 0, .. }));

    let tree = handle.live_tree.read();
    assert_eq!(tree.total_size(), 17 * MB);
    let sub = tree.lookup(&handle.root_path().join("sub")).unwrap();
    assert_eq!(tree.node(sub).cumulative_size, 2 * MB);
    let root = tree.root().unwrap();
    let leaves = tree
        .subtree(root)
        .into_iter()
        .filter(|&i| tree.node(i).kind == EntryKind::File)
        .count();
    assert_eq!(leaves, 3);
    assert_eq!(handle.counters().errors, 0);
    assert!(!tree.node(root).partial);
}

#[test]
fn empty_directory_completes_with_only_the_root() {
    let tmp = TempDir::new().expect("failed to create temp dir");

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);

    let tree = handle.live_tree.read();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.total_size(), 0);
}

#[test]
fn unusable_roots_are_rejected_up_front() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    sparse(&tmp.path().join("file"), 1);

    let missing = start_scan(tmp.path().join("nope"), options(), fresh_cache());
    assert!(matches!(missing, Err(ScanError::RootUnavailable { .. })));

    let file = start_scan(tmp.path().join("file"), options(), fresh_cache());
    assert!(matches!(file, Err(ScanError::NotADirectory(_))));
}

#[test]
fn cancellation_leaves_no_unfinished_nodes() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    for d in 0..20 {
        let dir = tmp.path().join(format!("d{d:02}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..50 {
            sparse(&dir.join(format!("f{f:02}")), 1024);
        }
    }

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    handle.cancel();
    assert!(handle.is_cancelled());

    // The walk may already be done by the time the signal is read.
    let terminal = wait_for(&handle, |m| {
        matches!(m, ScanProgress::Cancelled { .. } | ScanProgress::Complete { .. })
    });

    let tree = handle.live_tree.read();
    let root = tree.root().unwrap();
    for idx in tree.subtree(root) {
        let node = tree.node(idx);
        assert!(node.state.is_final(), "{} left {:?}", node.name, node.state);
    }
    if matches!(terminal, ScanProgress::Cancelled { .. }) {
        assert!(tree.node(root).partial);
    }
}

#[test]
fn second_session_is_served_from_the_cache() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let cache = fresh_cache();

    let first = start_scan(tmp.path(), options(), Arc::clone(&cache)).unwrap();
    wait_complete(&first);
    drop(first);
    assert!(!cache.is_empty());

    let second = start_scan(tmp.path(), options(), Arc::clone(&cache)).unwrap();
    wait_complete(&second);
    {
        let tree = second.live_tree.read();
        assert_eq!(tree.total_size(), 17 * MB);
        let sub = tree.lookup(&second.root_path().join("sub")).unwrap();
        assert!(tree.node(sub).cached);
        assert!(tree.node(sub).children.is_empty());
        assert_eq!(tree.node(sub).child_count, 2);
    }
    assert!(cache.stats().hits >= 1);

    // Expanding walks the cached directory for real.
    second.expand(second.root_path().join("sub"));
    assert!(!wait_subtree(&second));
    let tree = second.live_tree.read();
    let sub = tree.lookup(&second.root_path().join("sub")).unwrap();
    assert!(!tree.node(sub).cached);
    assert_eq!(tree.node(sub).children.len(), 2);
    assert_eq!(tree.total_size(), 17 * MB);
}

#[test]
fn changed_directory_is_not_served_from_the_cache() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let cache = fresh_cache();

    let first = start_scan(tmp.path(), options(), Arc::clone(&cache)).unwrap();
    wait_complete(&first);
    drop(first);

    // Adding an entry changes the directory's mtime.
    std::thread::sleep(Duration::from_millis(20));
    sparse(&tmp.path().join("sub/d.bin"), MB);

    let second = start_scan(tmp.path(), options(), cache).unwrap();
    wait_complete(&second);
    let tree = second.live_tree.read();
    let sub = tree.lookup(&second.root_path().join("sub")).unwrap();
    assert!(!tree.node(sub).cached);
    assert_eq!(tree.total_size(), 18 * MB);
}

#[test]
fn invalidate_after_deletion_removes_the_subtree() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);

    let sub = handle.root_path().join("sub");
    fs::remove_dir_all(&sub).unwrap();
    handle.invalidate(&sub);
    assert!(wait_subtree(&handle));

    let tree = handle.live_tree.read();
    let root = tree.root().unwrap();
    assert_eq!(tree.lookup(&sub), None);
    assert_eq!(tree.total_size(), 10 * MB);
    assert_eq!(tree.node(root).child_count, 1);
    assert_eq!(tree.node(root).state, ScanState::Complete);
}

#[cfg(unix)]
#[test]
fn hard_linked_file_is_counted_once() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    fs::create_dir(tmp.path().join("x")).unwrap();
    fs::create_dir(tmp.path().join("y")).unwrap();
    sparse(&tmp.path().join("x/data"), 3 * MB);
    fs::hard_link(tmp.path().join("x/data"), tmp.path().join("y/data")).unwrap();

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);

    let tree = handle.live_tree.read();
    assert_eq!(tree.total_size(), 3 * MB);
    let aliases = tree
        .nodes
        .iter()
        .filter(|n| n.aliased)
        .inspect(|n| assert_eq!(n.issue.as_ref().unwrap().kind, IssueKind::Cycle))
        .count();
    assert_eq!(aliases, 1);
}

#[cfg(unix)]
#[test]
fn symlinks_are_not_followed_by_default() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    std::os::unix::fs::symlink(tmp.path().join("sub"), tmp.path().join("link")).unwrap();

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);

    let tree = handle.live_tree.read();
    assert_eq!(tree.total_size(), 17 * MB);
    let link = tree.lookup(&handle.root_path().join("link")).unwrap();
    assert_eq!(tree.node(link).cumulative_size, 0);
}

#[cfg(unix)]
#[test]
fn followed_symlink_cycle_terminates() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    // sub/up -> root: following it would recurse forever.
    std::os::unix::fs::symlink(tmp.path(), tmp.path().join("sub/up")).unwrap();

    let opts = ScanOptions {
        follow_symlinks: true,
        ..options()
    };
    let handle = start_scan(tmp.path(), opts, fresh_cache()).unwrap();
    wait_complete(&handle);

    let tree = handle.live_tree.read();
    assert_eq!(tree.total_size(), 17 * MB);
    let up = tree.lookup(&handle.root_path().join("sub/up")).unwrap();
    assert!(tree.node(up).aliased);
    assert!(!tree.node(tree.root().unwrap()).partial);
}

#[cfg(unix)]
#[test]
fn unreadable_directory_is_reported_and_parent_partial() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().expect("failed to create temp dir");
    build_test_tree(tmp.path());
    let locked = tmp.path().join("locked");
    fs::create_dir(&locked).unwrap();
    sparse(&locked.join("hidden"), MB);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users read through the mode bits; nothing to observe then.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let handle = start_scan(tmp.path(), options(), fresh_cache()).unwrap();
    wait_complete(&handle);
    {
        let tree = handle.live_tree.read();
        let node = tree.lookup(&handle.root_path().join("locked")).unwrap();
        let node = tree.node(node);
        assert_eq!(node.state, ScanState::Error);
        assert_eq!(node.issue.as_ref().unwrap().kind, IssueKind::AccessDenied);
        assert_eq!(node.cumulative_size, 0);
        assert!(tree.node(tree.root().unwrap()).partial);
        assert_eq!(tree.total_size(), 17 * MB);
    }
    assert!(handle.counters().errors >= 1);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

/// `PROGRESS_CHANNEL_CAPACITY` must never be 0, which would make every
/// terminal `send` rendezvous with the dashboard.
const _: () = assert!(
    PROGRESS_CHANNEL_CAPACITY > 0,
    "PROGRESS_CHANNEL_CAPACITY must be > 0"
);
