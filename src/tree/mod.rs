//! Layered file trees.
//!
//! Each image layer is modeled as a path-segment trie. Trees can be
//! stacked (union-mount merge), compared (per-path diff classification),
//! cached by layer range, and scored for wasted space.

mod comparer;
mod diff;
mod efficiency;
mod info;
mod merge;
mod node;
mod order;
mod path_error;
mod render;

pub use comparer::{Comparer, TreeIndexKey};
pub use diff::DiffType;
pub use efficiency::{efficiency, EfficiencyData};
pub use info::{FileInfo, FileKind};
pub use merge::stack_tree_range;
pub use node::{FileNode, NodeData, NodeId, ViewInfo};
pub use order::SortOrder;
pub use path_error::{FileAction, PathError};

use crate::error::TreeError;

/// Prefix marking an overlay whiteout (deletion tombstone) file.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Prefix marking overlay bookkeeping files that are never real
/// filesystem entries (e.g. the opaque-directory marker `.wh..wh..opq`).
pub const DOUBLE_WHITEOUT_PREFIX: &str = ".wh..wh..";

/// A visitor processes, observes, or otherwise reacts to a single node.
pub type Visitor<'a> = dyn FnMut(&FileTree, NodeId) -> Result<(), TreeError> + 'a;

/// A visit evaluator decides whether a node (and for parent-first
/// traversal, its subtree) should be visited.
pub type VisitEvaluator<'a> = dyn Fn(&FileTree, NodeId) -> bool + 'a;

/// FileTree represents a set of files, directories, and their relations
/// for a single layer or a merged view of several layers.
///
/// Nodes live in an arena; parent/child links are non-owning indices so
/// that upward traversal stays cheap while ownership remains a strict
/// tree.
#[derive(Debug)]
pub struct FileTree {
    nodes: Vec<Option<FileNode>>,
    root: NodeId,
    size: usize,
    file_size: u64,
    name: String,
    collapse_default: bool,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    /// Create an empty FileTree. New directories start expanded.
    pub fn new() -> Self {
        Self::with_collapse_default(false)
    }

    /// Create an empty FileTree whose nodes start with the given
    /// collapsed state. The default is threaded through construction
    /// instead of living in process-wide state.
    pub fn with_collapse_default(collapsed: bool) -> Self {
        let root = FileNode::new_root();
        FileTree {
            nodes: vec![Some(root)],
            root: 0,
            size: 0,
            file_size: 0,
            name: String::new(),
            collapse_default: collapsed,
        }
    }

    /// The arena id of the root node. The root has no parent and
    /// carries no file metadata.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of attached nodes, excluding the root.
    pub fn node_count(&self) -> usize {
        self.size
    }

    /// Cumulative size in bytes of the regular files this layer carries.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn add_file_size(&mut self, bytes: u64) {
        self.file_size += bytes;
    }

    /// Borrow a node by id. Panics on a detached id: handing out a stale
    /// id is a programmer error.
    pub fn node(&self, id: NodeId) -> &FileNode {
        self.nodes[id].as_ref().expect("detached node id")
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FileNode {
        self.nodes[id].as_mut().expect("detached node id")
    }

    /// Mark a directory node collapsed or expanded. View state only.
    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) {
        self.node_mut(id).data.view_info.collapsed = collapsed;
    }

    /// Hide or reveal a node. View state only.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        self.node_mut(id).data.view_info.hidden = hidden;
    }

    /// Slash-delimited path from the root to the given node. A whiteout
    /// prefix is fictitious on the leaf and is stripped from the node's
    /// own name only.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent() {
            let node = self.node(cur);
            let name = if cur == id {
                node.name()
                    .strip_prefix(WHITEOUT_PREFIX)
                    .unwrap_or(node.name())
            } else {
                node.name()
            };
            parts.push(name);
            cur = parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Fetch a node id for a slash-delimited path from the root.
    pub fn get_node(&self, path: &str) -> Result<NodeId, TreeError> {
        let mut node = self.root;
        for name in path.trim_matches('/').split('/') {
            if name.is_empty() {
                continue;
            }
            node = self
                .node(node)
                .child(name)
                .ok_or_else(|| TreeError::PathNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Add a node to the tree with the given payload, creating
    /// intermediate directories (with empty payloads) as needed.
    ///
    /// Returns the terminal node and the list of nodes created along the
    /// way, in creation order. Segments carrying the opaque-whiteout
    /// marker are consumed structurally: no node is created for them and
    /// no error is raised, but ancestors created up to that point remain.
    /// Re-adding an existing path replaces the payload in place.
    pub fn add_path(
        &mut self,
        path: &str,
        info: FileInfo,
    ) -> Result<(Option<NodeId>, Vec<NodeId>), TreeError> {
        let cleaned = clean_path(path);
        if cleaned == "." {
            return Err(TreeError::RelativePath(path.to_string()));
        }

        let segments: Vec<&str> = cleaned
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut node = self.root;
        let mut added = Vec::new();
        let last = match segments.len() {
            0 => return Ok((None, added)),
            n => n - 1,
        };

        for (idx, name) in segments.iter().enumerate() {
            node = match self.node(node).child(name) {
                Some(existing) => existing,
                None => {
                    if name.starts_with(DOUBLE_WHITEOUT_PREFIX) {
                        return Ok((None, added));
                    }
                    let child = self.add_child(node, name);
                    added.push(child);
                    child
                }
            };

            // the payload is destined for the path's end node, not any
            // intermediary node
            if idx == last {
                self.node_mut(node).data.file_info = info.clone();
            }
        }

        Ok((Some(node), added))
    }

    fn add_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let data = NodeData::new(self.collapse_default);
        let id = self.nodes.len();
        self.nodes
            .push(Some(FileNode::new(name.to_string(), parent, data)));
        self.node_mut(parent).insert_child(name.to_string(), id);
        self.size += 1;
        self.invalidate_size_up(parent);
        id
    }

    /// Remove the node at the given path, along with its entire subtree.
    pub fn remove_path(&mut self, path: &str) -> Result<(), TreeError> {
        let id = self.get_node(path)?;
        self.remove_node(id)
    }

    fn remove_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RemoveRoot);
        }
        let parent = self.node(id).parent().expect("non-root node has a parent");
        let name = self.node(id).name().to_string();

        let mut doomed = Vec::new();
        self.collect_subtree(id, &mut doomed);
        for victim in doomed {
            self.nodes[victim] = None;
            self.size -= 1;
        }

        self.node_mut(parent).remove_child(&name);
        self.invalidate_size_up(parent);
        Ok(())
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for (_, child) in self.node(id).children() {
            self.collect_subtree(child, out);
        }
        out.push(id);
    }

    fn invalidate_size_up(&self, mut id: NodeId) {
        loop {
            let node = self.node(id);
            node.reset_size_memo();
            match node.parent() {
                Some(parent) => id = parent,
                None => break,
            }
        }
    }

    /// Total size in bytes of the file or directory at the given node.
    ///
    /// Sizes of removed children are excluded, unless the queried node is
    /// itself removed (a removed directory still reports the size it
    /// removed). The result is memoized; structural edits reset the memo
    /// up the ancestor chain.
    pub fn get_size(&self, id: NodeId) -> u64 {
        let node = self.node(id);
        let memo = node.size_memo();
        if memo >= 0 {
            return memo as u64;
        }

        let total = if node.is_leaf() {
            node.data.file_info.size
        } else {
            let queried_removed = node.data.diff_type == DiffType::Removed;
            let mut sum = 0u64;
            let _ = self.visit_node_child_first(
                id,
                &mut |tree, nid| {
                    let cur = tree.node(nid);
                    if cur.data.diff_type != DiffType::Removed || queried_removed {
                        sum += cur.data.file_info.size;
                    }
                    Ok(())
                },
                None,
                SortOrder::ByName,
            );
            sum
        };
        node.store_size_memo(total as i64);
        total
    }

    /// Deep-clone the whole tree. Size memos are not carried over.
    pub fn copy(&self) -> FileTree {
        FileTree {
            nodes: self
                .nodes
                .iter()
                .map(|slot| slot.as_ref().map(FileNode::clone_for_copy))
                .collect(),
            root: self.root,
            size: self.size,
            file_size: self.file_size,
            name: self.name.clone(),
            collapse_default: self.collapse_default,
        }
    }

    /// Iterate the tree depth-first, evaluating the deepest depths first
    /// (visit on bubble up). The root node is never visited.
    pub fn visit_depth_child_first(
        &self,
        visitor: &mut Visitor<'_>,
        evaluator: Option<&VisitEvaluator<'_>>,
        order: SortOrder,
    ) -> Result<(), TreeError> {
        self.visit_node_child_first(self.root, visitor, evaluator, order)
    }

    /// Child-first traversal starting at (and including) the given node.
    pub fn visit_node_child_first(
        &self,
        id: NodeId,
        visitor: &mut Visitor<'_>,
        evaluator: Option<&VisitEvaluator<'_>>,
        order: SortOrder,
    ) -> Result<(), TreeError> {
        for child in order.order_children(self, id) {
            self.visit_node_child_first(child, visitor, evaluator, order)?;
        }
        if id == self.root {
            return Ok(());
        }
        if evaluator.map_or(true, |eval| eval(self, id)) {
            visitor(self, id)?;
        }
        Ok(())
    }

    /// Iterate the tree depth-first, evaluating the shallowest depths
    /// first (visit while sinking down). A rejected node prunes its whole
    /// subtree. The root node is never visited but may prune.
    pub fn visit_depth_parent_first(
        &self,
        visitor: &mut Visitor<'_>,
        evaluator: Option<&VisitEvaluator<'_>>,
        order: SortOrder,
    ) -> Result<(), TreeError> {
        self.visit_node_parent_first(self.root, visitor, evaluator, order)
    }

    fn visit_node_parent_first(
        &self,
        id: NodeId,
        visitor: &mut Visitor<'_>,
        evaluator: Option<&VisitEvaluator<'_>>,
        order: SortOrder,
    ) -> Result<(), TreeError> {
        if !evaluator.map_or(true, |eval| eval(self, id)) {
            return Ok(());
        }
        if id != self.root {
            visitor(self, id)?;
        }
        for child in order.order_children(self, id) {
            self.visit_node_parent_first(child, visitor, evaluator, order)?;
        }
        Ok(())
    }
}

/// Lexically clean a slash-delimited path: collapse repeated separators,
/// drop `.` segments, and resolve `..` where possible.
pub(crate) fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().map_or(false, |last| *last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            _ => out.push(segment),
        }
    }
    if out.is_empty() {
        return if rooted { "/" } else { "." }.to_string();
    }
    if rooted {
        format!("/{}", out.join("/"))
    } else {
        out.join("/")
    }
}
