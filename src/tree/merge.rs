//! Union-mount merging and diff classification.
//!
//! Stacking applies an upper layer's entries onto a lower tree the way
//! an overlay mount would: whiteout tombstones delete, everything else
//! is last-writer-wins. Comparison walks an upper layer and records a
//! DiffType on every touched node of the lower tree.

use super::{DiffType, FileAction, FileTree, NodeId, PathError, SortOrder};
use crate::error::TreeError;

/// A pending classification recorded while walking the upper tree.
/// Tentative marks still need child-aware derivation; final marks are
/// assigned as-is.
struct CompareMark {
    lower: NodeId,
    upper: NodeId,
    tentative: Option<DiffType>,
    finality: Option<DiffType>,
}

impl FileTree {
    /// Stack the given upper tree onto this one, merging the two into a
    /// single effective filesystem.
    ///
    /// Paths that cannot be applied are collected and returned; a
    /// partial merge is still usable.
    pub fn stack(&mut self, upper: &FileTree) -> Result<Vec<PathError>, TreeError> {
        let mut failed: Vec<PathError> = Vec::new();

        upper.visit_depth_child_first(
            &mut |utree, uid| {
                let upath = utree.path_of(uid);
                if utree.node(uid).is_whiteout() {
                    if let Err(err) = self.remove_path(&upath) {
                        failed.push(PathError::new(upath, FileAction::Remove, err));
                    }
                } else {
                    let info = utree.node(uid).data.file_info.clone();
                    if let Err(err) = self.add_path(&upath, info).map(|_| ()) {
                        failed.push(PathError::new(upath, FileAction::Add, err));
                    }
                }
                Ok(())
            },
            None,
            SortOrder::ByName,
        )?;

        Ok(failed)
    }

    /// Classify every path of this (lower) tree against the given upper
    /// tree, recording a per-node DiffType and adopting the upper
    /// layer's payloads as authoritative.
    pub fn compare_and_mark(&mut self, upper: &FileTree) -> Result<Vec<PathError>, TreeError> {
        let mut modifications: Vec<CompareMark> = Vec::new();
        let mut failed: Vec<PathError> = Vec::new();

        // the leaves must be classified before diff types can be derived
        // from and assigned to their parents
        upper.visit_depth_child_first(
            &mut |utree, uid| {
                let upath = utree.path_of(uid);

                if utree.node(uid).is_whiteout() {
                    if let Err(err) = self.mark_removed(&upath) {
                        failed.push(PathError::new(upath, FileAction::Remove, err));
                    }
                    return Ok(());
                }

                match self.get_node(&upath) {
                    Err(_) => {
                        // the path is new in the upper layer; adding it
                        // mutates the live tree mid-comparison, so the
                        // parent of a fresh node may transiently read as
                        // modified. The derivation pass below corrects it.
                        let info = utree.node(uid).data.file_info.clone();
                        match self.add_path(&upath, info) {
                            Ok((_, new_nodes)) => {
                                for &new_node in new_nodes.iter().rev() {
                                    modifications.push(CompareMark {
                                        lower: new_node,
                                        upper: uid,
                                        tentative: None,
                                        finality: Some(DiffType::Added),
                                    });
                                }
                            }
                            Err(err) => {
                                failed.push(PathError::new(upath, FileAction::Add, err));
                            }
                        }
                    }
                    Ok(lower) => {
                        let diff = self.compare_node(lower, utree, uid);
                        modifications.push(CompareMark {
                            lower,
                            upper: uid,
                            tentative: Some(diff),
                            finality: None,
                        });
                    }
                }
                Ok(())
            },
            None,
            SortOrder::ByName,
        )?;

        // apply the recorded classifications to the owning tree
        for mark in &modifications {
            if let Some(diff) = mark.finality {
                self.assign_diff_type(mark.lower, diff);
            } else if let Some(tentative) = mark.tentative {
                if self.node(mark.lower).data.diff_type == DiffType::Unmodified {
                    self.derive_diff_type(mark.lower, tentative);
                }
            }

            // the upper layer's view of the path is authoritative going
            // forward
            self.node_mut(mark.lower).data.file_info =
                upper.node(mark.upper).data.file_info.clone();
        }

        Ok(failed)
    }

    /// Compare the node against its counterpart in the upper tree.
    fn compare_node(&self, lower: NodeId, upper: &FileTree, uid: NodeId) -> DiffType {
        if upper.node(uid).is_whiteout() {
            // whiteouts are intercepted before lookup; a tombstone that
            // reaches an ordinary comparison can only mean "changed"
            return DiffType::Modified;
        }
        self.node(lower)
            .data
            .file_info
            .compare(&upper.node(uid).data.file_info)
    }

    /// Annotate the node at the given path as Removed.
    fn mark_removed(&mut self, path: &str) -> Result<(), TreeError> {
        let id = self.get_node(path)?;
        self.assign_diff_type(id, DiffType::Removed);
        Ok(())
    }

    /// Assign the given DiffType to a node. Removing a directory removes
    /// its whole subtree, so Removed cascades to every descendant.
    fn assign_diff_type(&mut self, id: NodeId, diff: DiffType) {
        self.node_mut(id).data.diff_type = diff;

        if diff == DiffType::Removed {
            let mut pending: Vec<NodeId> =
                self.node(id).children().map(|(_, child)| child).collect();
            while let Some(next) = pending.pop() {
                self.node_mut(next).data.diff_type = DiffType::Removed;
                pending.extend(self.node(next).children().map(|(_, child)| child));
            }
        }
    }

    /// Determine a node's DiffType from a tentative classification. A
    /// directory's type is the merge of its attributes and the already-
    /// finalized types of its children; worse wins.
    fn derive_diff_type(&mut self, id: NodeId, tentative: DiffType) {
        if self.node(id).is_leaf() {
            self.assign_diff_type(id, tentative);
            return;
        }

        let mut merged = tentative;
        let children: Vec<NodeId> = self.node(id).children().map(|(_, child)| child).collect();
        for child in children {
            merged = merged.merge(self.node(child).data.diff_type);
        }
        self.assign_diff_type(id, merged);
    }
}

/// Materialize "what the filesystem looks like after applying layers
/// `start..=stop`": copy the base tree, then stack each tree in the
/// range onto it in order.
pub fn stack_tree_range(
    trees: &[FileTree],
    start: usize,
    stop: usize,
) -> Result<(FileTree, Vec<PathError>), TreeError> {
    if trees.is_empty() {
        return Err(TreeError::EmptyLayerSet);
    }

    let mut tree = trees[0].copy();
    let mut errors: Vec<PathError> = Vec::new();
    for idx in start..=stop {
        let layer = trees.get(idx).ok_or(TreeError::LayerOutOfBounds {
            index: idx,
            count: trees.len(),
        })?;
        errors.extend(tree.stack(layer)?);
    }
    Ok((tree, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{FileInfo, FileKind};

    fn file(size: u64, hash_seed: u8) -> FileInfo {
        FileInfo {
            kind: FileKind::Regular,
            hash: [hash_seed; 32],
            size,
            mode: 0o644,
            ..FileInfo::default()
        }
    }

    #[test]
    fn test_stack_overwrites_and_adds() {
        let mut lower = FileTree::new();
        lower.add_path("/etc/motd", file(10, 1)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/etc/motd", file(20, 2)).unwrap();
        upper.add_path("/etc/hosts", file(5, 3)).unwrap();

        let failed = lower.stack(&upper).unwrap();
        assert!(failed.is_empty());

        let motd = lower.get_node("/etc/motd").unwrap();
        assert_eq!(lower.node(motd).data.file_info.size, 20);
        assert!(lower.get_node("/etc/hosts").is_ok());
    }

    #[test]
    fn test_stack_whiteout_removes_path() {
        let mut lower = FileTree::new();
        lower.add_path("/etc/passwd", file(10, 1)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/etc/.wh.passwd", FileInfo::default()).unwrap();

        let failed = lower.stack(&upper).unwrap();
        assert!(failed.is_empty());
        assert!(lower.get_node("/etc/passwd").is_err());
    }

    #[test]
    fn test_stack_whiteout_for_missing_path_is_collected_not_fatal() {
        let mut lower = FileTree::new();
        lower.add_path("/etc/motd", file(10, 1)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/etc/.wh.absent", FileInfo::default()).unwrap();
        upper.add_path("/etc/hosts", file(5, 2)).unwrap();

        let failed = lower.stack(&upper).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action, FileAction::Remove);
        assert_eq!(failed[0].path, "/etc/absent");
        // the rest of the layer still applied
        assert!(lower.get_node("/etc/hosts").is_ok());
    }

    #[test]
    fn test_stack_tree_range_single_tree_is_copy() {
        let mut base = FileTree::new();
        base.add_path("/a/b", file(10, 1)).unwrap();

        let (stacked, errors) = stack_tree_range(std::slice::from_ref(&base), 0, 0).unwrap();
        assert!(errors.is_empty());
        assert_eq!(stacked.node_count(), base.node_count());
        assert!(stacked.get_node("/a/b").is_ok());
    }

    #[test]
    fn test_stack_tree_range_out_of_bounds_is_hard_error() {
        let trees = vec![FileTree::new()];
        assert!(matches!(
            stack_tree_range(&trees, 0, 3),
            Err(TreeError::LayerOutOfBounds { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_compare_marks_added_file_and_modified_parent() {
        let mut lower = FileTree::new();
        lower.add_path("/usr/one", file(10, 1)).unwrap();
        lower.add_path("/usr/two", file(10, 2)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/usr/one", file(10, 1)).unwrap();
        upper.add_path("/usr/two", file(10, 2)).unwrap();
        upper.add_path("/usr/three", file(7, 3)).unwrap();

        let failed = lower.compare_and_mark(&upper).unwrap();
        assert!(failed.is_empty());

        let three = lower.get_node("/usr/three").unwrap();
        assert_eq!(lower.node(three).data.diff_type, DiffType::Added);

        // a directory with one added child and otherwise-unmodified
        // children derives to Modified
        let usr = lower.get_node("/usr").unwrap();
        assert_eq!(lower.node(usr).data.diff_type, DiffType::Modified);

        let one = lower.get_node("/usr/one").unwrap();
        assert_eq!(lower.node(one).data.diff_type, DiffType::Unmodified);
    }

    #[test]
    fn test_compare_marks_modified_content() {
        let mut lower = FileTree::new();
        lower.add_path("/etc/motd", file(10, 1)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/etc/motd", file(10, 9)).unwrap();

        lower.compare_and_mark(&upper).unwrap();

        let motd = lower.get_node("/etc/motd").unwrap();
        assert_eq!(lower.node(motd).data.diff_type, DiffType::Modified);
        // upper payload is authoritative
        assert_eq!(lower.node(motd).data.file_info.hash, [9u8; 32]);

        let etc = lower.get_node("/etc").unwrap();
        assert_eq!(lower.node(etc).data.diff_type, DiffType::Modified);
    }

    #[test]
    fn test_compare_whiteout_cascades_removed() {
        let mut lower = FileTree::new();
        lower.add_path("/opt/app/bin", file(10, 1)).unwrap();
        lower.add_path("/opt/app/lib/core", file(20, 2)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/opt/.wh.app", FileInfo::default()).unwrap();

        lower.compare_and_mark(&upper).unwrap();

        for path in ["/opt/app", "/opt/app/bin", "/opt/app/lib", "/opt/app/lib/core"] {
            let id = lower.get_node(path).unwrap();
            assert_eq!(
                lower.node(id).data.diff_type,
                DiffType::Removed,
                "{path} should cascade to Removed"
            );
        }
    }

    #[test]
    fn test_compare_unmodified_tree_stays_unmodified() {
        let mut lower = FileTree::new();
        lower.add_path("/bin/sh", file(100, 1)).unwrap();

        let mut upper = FileTree::new();
        upper.add_path("/bin/sh", file(100, 1)).unwrap();

        lower.compare_and_mark(&upper).unwrap();

        for path in ["/bin", "/bin/sh"] {
            let id = lower.get_node(path).unwrap();
            assert_eq!(lower.node(id).data.diff_type, DiffType::Unmodified);
        }
    }
}
