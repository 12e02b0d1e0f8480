/// Data model: the arena-allocated scan tree and display helpers.
pub mod file_node;
pub mod file_tree;
pub mod size;

pub use file_node::{EntryKind, FileNode, Identity, NodeIndex, ScanState};
pub use file_tree::FileTree;
