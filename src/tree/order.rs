//! Child ordering strategies for tree traversal and rendering.

use super::{FileTree, NodeId};

/// How sibling nodes are ordered during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    ByName,
    BySizeDesc,
}

impl SortOrder {
    pub(crate) fn order_children(self, tree: &FileTree, id: NodeId) -> Vec<NodeId> {
        match self {
            SortOrder::ByName => tree.node(id).children().map(|(_, child)| child).collect(),
            SortOrder::BySizeDesc => {
                let mut entries: Vec<(String, NodeId)> = tree
                    .node(id)
                    .children()
                    .map(|(name, child)| (name.to_string(), child))
                    .collect();
                entries.sort_by(|(a_name, a_id), (b_name, b_id)| {
                    tree.get_size(*b_id)
                        .cmp(&tree.get_size(*a_id))
                        .then_with(|| a_name.cmp(b_name))
                });
                entries.into_iter().map(|(_, child)| child).collect()
            }
        }
    }
}
