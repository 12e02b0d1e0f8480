/// Arena-backed scan tree with incremental bottom-up size propagation.
///
/// All nodes live in a single `Vec<FileNode>`. Unlike a post-scan roll-up,
/// sizes are credited to every ancestor the moment a leaf is probed (O(depth)
/// per update), so the live view is always a valid lower bound.
///
/// The tree is written only by the aggregator thread. Readers take the
/// `LiveTree` read lock for the duration of one frame.
use super::file_node::{EntryKind, FileNode, Identity, NodeIndex, ScanState};
use compact_str::CompactString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileTree {
    /// Arena: every node ever created in this session, including detached ones.
    pub nodes: Vec<FileNode>,

    root: Option<NodeIndex>,

    root_path: PathBuf,

    /// Path -> node for every attached node.
    index: HashMap<PathBuf, NodeIndex>,
}

impl FileTree {
    /// Create an empty tree for `root_path` with pre-allocated capacity.
    pub fn with_capacity(root_path: PathBuf, estimated_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(estimated_nodes),
            root: None,
            root_path,
            index: HashMap::with_capacity(estimated_nodes),
        }
    }

    /// Insert the root directory. The root's name is its full path.
    pub fn add_root(&mut self) -> NodeIndex {
        let name = CompactString::new(self.root_path.to_string_lossy());
        let idx = self.push(FileNode::placeholder(name, EntryKind::Directory, None));
        self.index.insert(self.root_path.clone(), idx);
        self.root = Some(idx);
        idx
    }

    /// Allocate `node` under `parent` and register it by path.
    pub fn add_child(&mut self, parent: NodeIndex, mut node: FileNode) -> NodeIndex {
        node.parent = Some(parent);
        let path = self.full_path(parent).join(node.name.as_str());
        let idx = self.push(node);
        self.nodes[parent.idx()].children.push(idx);
        self.index.insert(path, idx);
        idx
    }

    fn push(&mut self, node: FileNode) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(node);
        idx
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Cumulative size of the root, or 0 before the root exists.
    pub fn total_size(&self) -> u64 {
        self.root.map(|r| self.nodes[r.idx()].cumulative_size).unwrap_or(0)
    }

    /// Find the attached node for `path`.
    pub fn lookup(&self, path: &Path) -> Option<NodeIndex> {
        self.index.get(path).copied()
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> &FileNode {
        &self.nodes[index.idx()]
    }

    #[inline]
    pub fn node_mut(&mut self, index: NodeIndex) -> &mut FileNode {
        &mut self.nodes[index.idx()]
    }

    /// Reconstruct the absolute path of a node by walking up to the root.
    pub fn full_path(&self, index: NodeIndex) -> PathBuf {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            let node = &self.nodes[idx.idx()];
            if node.parent.is_none() {
                break;
            }
            segments.push(node.name.as_str());
            current = node.parent;
        }
        let mut path = self.root_path.clone();
        for seg in segments.into_iter().rev() {
            path.push(seg);
        }
        path
    }

    /// Strict ancestors of `index`, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes[index.idx()].parent,
        }
    }

    /// Add `bytes` to the node and every ancestor up to the root.
    ///
    /// Aliased directories never receive credits, so neither do their
    /// ancestors through them.
    pub fn credit(&mut self, index: NodeIndex, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut current = Some(index);
        while let Some(idx) = current {
            let node = &mut self.nodes[idx.idx()];
            node.cumulative_size = node.cumulative_size.saturating_add(bytes);
            current = node.parent;
        }
    }

    /// Remove `bytes` from every strict ancestor of `index`. Used only when a
    /// subtree is reset for a rescan.
    pub fn debit_ancestors(&mut self, index: NodeIndex, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut current = self.nodes[index.idx()].parent;
        while let Some(idx) = current {
            let node = &mut self.nodes[idx.idx()];
            node.cumulative_size = node.cumulative_size.saturating_sub(bytes);
            current = node.parent;
        }
    }

    /// Flag every strict ancestor as a lower bound.
    pub fn mark_ancestors_partial(&mut self, index: NodeIndex) {
        let mut current = self.nodes[index.idx()].parent;
        while let Some(idx) = current {
            let node = &mut self.nodes[idx.idx()];
            if node.partial {
                // Everything above is already flagged.
                break;
            }
            node.partial = true;
            current = node.parent;
        }
    }

    /// Drop every descendant of `index` from the path index and clear its
    /// child list. Returns the identities that left the tree so the caller can
    /// release them from the visited set.
    pub fn detach_descendants(&mut self, index: NodeIndex) -> Vec<Identity> {
        let mut released = Vec::new();
        let mut stack = std::mem::take(&mut self.nodes[index.idx()].children);
        while let Some(idx) = stack.pop() {
            let path = self.full_path(idx);
            self.index.remove(&path);
            let node = &mut self.nodes[idx.idx()];
            node.detached = true;
            if let Some(id) = node.identity {
                if !node.aliased {
                    released.push(id);
                }
            }
            stack.append(&mut node.children);
        }
        released
    }

    /// Remove `index` and its subtree from its parent. The parent's totals
    /// must already have been debited by the caller.
    pub fn prune(&mut self, index: NodeIndex) -> Vec<Identity> {
        let path = self.full_path(index);
        let mut released = self.detach_descendants(index);
        self.index.remove(&path);
        let node = &mut self.nodes[index.idx()];
        node.detached = true;
        if let (Some(id), false) = (node.identity, node.aliased) {
            released.push(id);
        }
        if let Some(parent) = node.parent {
            let p = &mut self.nodes[parent.idx()];
            p.children.retain(|&c| c != index);
            p.child_count = p.child_count.saturating_sub(1);
        }
        released
    }

    /// Sort a completed directory's children in place, largest first.
    pub fn materialize_children(&mut self, index: NodeIndex) {
        let mut children = std::mem::take(&mut self.nodes[index.idx()].children);
        self.sort_by_size(&mut children);
        self.nodes[index.idx()].children = children;
    }

    /// Direct children ordered by descending cumulative size.
    ///
    /// Complete directories are already materialized in that order; for a
    /// directory still being scanned the discovered children are sorted on
    /// the fly so partial results read the same way.
    pub fn children_sorted_by_size(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        let node = &self.nodes[parent.idx()];
        let mut children = node.children.clone();
        if node.state != ScanState::Complete {
            self.sort_by_size(&mut children);
        }
        children
    }

    fn sort_by_size(&self, children: &mut [NodeIndex]) {
        children.sort_unstable_by(|a, b| {
            let a_node = &self.nodes[a.idx()];
            let b_node = &self.nodes[b.idx()];
            b_node
                .counted_size()
                .cmp(&a_node.counted_size())
                .then_with(|| a_node.name.cmp(&b_node.name))
        });
    }

    /// Attached nodes in the subtree rooted at `index` (inclusive), depth-first.
    pub fn subtree(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.nodes[idx.idx()].children.iter().copied());
        }
        out
    }

    /// Number of attached nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

pub struct Ancestors<'a> {
    tree: &'a FileTree,
    next: Option<NodeIndex>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.nodes[current.idx()].parent;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> FileNode {
        FileNode::placeholder(CompactString::new(name), EntryKind::File, None)
    }

    fn dir(name: &str) -> FileNode {
        FileNode::placeholder(CompactString::new(name), EntryKind::Directory, None)
    }

    #[test]
    fn credit_propagates_to_every_ancestor() {
        let mut tree = FileTree::with_capacity(PathBuf::from("/r"), 8);
        let root = tree.add_root();
        let users = tree.add_child(root, dir("Users"));
        let a = tree.add_child(users, file("a.txt"));
        let b = tree.add_child(users, file("b.txt"));

        tree.credit(a, 100);
        tree.credit(b, 200);

        assert_eq!(tree.node(users).cumulative_size, 300);
        assert_eq!(tree.node(root).cumulative_size, 300);
        assert_eq!(tree.total_size(), 300);
        assert_eq!(tree.ancestors(a).collect::<Vec<_>>(), vec![users, root]);
    }

    #[test]
    fn full_path_and_lookup_agree() {
        let mut tree = FileTree::with_capacity(PathBuf::from("/r"), 4);
        let root = tree.add_root();
        let dir_idx = tree.add_child(root, dir("Users"));
        let f = tree.add_child(dir_idx, file("test.txt"));

        assert_eq!(tree.full_path(f), PathBuf::from("/r/Users/test.txt"));
        assert_eq!(tree.full_path(root), PathBuf::from("/r"));
        assert_eq!(tree.lookup(Path::new("/r/Users/test.txt")), Some(f));
    }

    #[test]
    fn children_sorted_largest_first() {
        let mut tree = FileTree::with_capacity(PathBuf::from("/r"), 5);
        let root = tree.add_root();
        let small = tree.add_child(root, file("small.txt"));
        let big = tree.add_child(root, file("big.bin"));
        let folder = tree.add_child(root, dir("folder"));
        tree.credit(small, 10);
        tree.credit(big, 1000);
        tree.credit(folder, 500);

        assert_eq!(tree.children_sorted_by_size(root), vec![big, folder, small]);

        tree.node_mut(root).state = ScanState::Complete;
        tree.materialize_children(root);
        assert_eq!(tree.node(root).children, vec![big, folder, small]);
    }

    #[test]
    fn prune_detaches_whole_subtree() {
        let mut tree = FileTree::with_capacity(PathBuf::from("/r"), 6);
        let root = tree.add_root();
        let sub = tree.add_child(root, dir("sub"));
        let inner = tree.add_child(sub, file("inner"));
        tree.node_mut(root).child_count = 1;
        tree.credit(inner, 64);

        tree.debit_ancestors(sub, tree.node(sub).cumulative_size);
        tree.prune(sub);

        assert_eq!(tree.total_size(), 0);
        assert!(tree.node(root).children.is_empty());
        assert_eq!(tree.node(root).child_count, 0);
        assert_eq!(tree.lookup(Path::new("/r/sub/inner")), None);
        assert_eq!(tree.lookup(Path::new("/r/sub")), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn partial_flag_stops_at_flagged_ancestor() {
        let mut tree = FileTree::with_capacity(PathBuf::from("/r"), 4);
        let root = tree.add_root();
        let a = tree.add_child(root, dir("a"));
        let b = tree.add_child(a, file("b"));
        tree.mark_ancestors_partial(b);
        assert!(tree.node(a).partial);
        assert!(tree.node(root).partial);
        assert!(!tree.node(b).partial);
    }
}
