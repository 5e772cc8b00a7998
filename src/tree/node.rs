//! Trie nodes and their per-node payload.

use super::{DiffType, FileInfo, WHITEOUT_PREFIX};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Arena index of a node within its owning [`super::FileTree`].
pub type NodeId = usize;

/// View state for a node, mutated only by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewInfo {
    pub collapsed: bool,
    pub hidden: bool,
}

/// The payload of a FileNode: file metadata, the diff classification
/// assigned by the merge engine, and transient view state.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub file_info: FileInfo,
    pub diff_type: DiffType,
    pub view_info: ViewInfo,
}

impl NodeData {
    pub(crate) fn new(collapsed: bool) -> Self {
        NodeData {
            file_info: FileInfo::default(),
            diff_type: DiffType::Unmodified,
            view_info: ViewInfo {
                collapsed,
                hidden: false,
            },
        }
    }
}

/// A single path segment within a FileTree: its name, its relation to
/// nodes around it, and its payload.
///
/// Ownership of children is expressed through the name-to-id map; the
/// parent link is a plain back-index. The subtree size is memoized with
/// a -1 sentinel meaning "not yet computed".
#[derive(Debug)]
pub struct FileNode {
    name: String,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    pub data: NodeData,
    size: AtomicI64,
}

impl FileNode {
    pub(crate) fn new(name: String, parent: NodeId, data: NodeData) -> Self {
        FileNode {
            name,
            parent: Some(parent),
            children: BTreeMap::new(),
            data,
            size: AtomicI64::new(-1),
        }
    }

    pub(crate) fn new_root() -> Self {
        FileNode {
            name: String::new(),
            parent: None,
            children: BTreeMap::new(),
            data: NodeData::new(false),
            size: AtomicI64::new(-1),
        }
    }

    /// The node's own path segment, whiteout prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node is an overlay whiteout tombstone.
    pub fn is_whiteout(&self) -> bool {
        self.name.starts_with(WHITEOUT_PREFIX)
    }

    pub(crate) fn insert_child(&mut self, name: String, id: NodeId) {
        self.children.insert(name, id);
    }

    pub(crate) fn remove_child(&mut self, name: &str) {
        self.children.remove(name);
    }

    pub(crate) fn size_memo(&self) -> i64 {
        self.size.load(Ordering::Relaxed)
    }

    pub(crate) fn store_size_memo(&self, size: i64) {
        self.size.store(size, Ordering::Relaxed);
    }

    pub(crate) fn reset_size_memo(&self) {
        self.size.store(-1, Ordering::Relaxed);
    }

    /// Clone for a whole-tree copy. The size memo starts fresh.
    pub(crate) fn clone_for_copy(&self) -> FileNode {
        FileNode {
            name: self.name.clone(),
            parent: self.parent,
            children: self.children.clone(),
            data: self.data.clone(),
            size: AtomicI64::new(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whiteout_detection() {
        let node = FileNode::new(".wh.passwd".to_string(), 0, NodeData::new(false));
        assert!(node.is_whiteout());

        let node = FileNode::new("passwd".to_string(), 0, NodeData::new(false));
        assert!(!node.is_whiteout());

        // opaque markers share the prefix; they are also whiteouts
        let node = FileNode::new(".wh..wh..opq".to_string(), 0, NodeData::new(false));
        assert!(node.is_whiteout());
    }

    #[test]
    fn test_size_memo_sentinel() {
        let node = FileNode::new("f".to_string(), 0, NodeData::new(false));
        assert_eq!(node.size_memo(), -1);
        node.store_size_memo(42);
        assert_eq!(node.size_memo(), 42);
        node.reset_size_memo();
        assert_eq!(node.size_memo(), -1);
    }
}
