//! Range-keyed cache of merged-and-compared trees.
//!
//! Every UI interaction maps to "build the union of layers
//! `[bottom_start..bottom_stop]`, then compare it against layers
//! `[top_start..top_stop]`". Building is expensive; the same key is
//! computed at most once and answered from the cache afterwards.

use super::{stack_tree_range, FileTree, PathError};
use crate::error::TreeError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The four layer-index boundaries identifying a stack-then-compare
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeIndexKey {
    pub bottom_start: usize,
    pub bottom_stop: usize,
    pub top_start: usize,
    pub top_stop: usize,
}

impl TreeIndexKey {
    pub fn new(bottom_start: usize, bottom_stop: usize, top_start: usize, top_stop: usize) -> Self {
        TreeIndexKey {
            bottom_start,
            bottom_stop,
            top_start,
            top_stop,
        }
    }
}

impl fmt::Display for TreeIndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.bottom_start == self.bottom_stop,
            self.top_start == self.top_stop,
        ) {
            (true, true) => write!(f, "Index({}:{})", self.bottom_start, self.top_start),
            (true, false) => write!(
                f,
                "Index({}:{}-{})",
                self.bottom_start, self.top_start, self.top_stop
            ),
            (false, true) => write!(
                f,
                "Index({}-{}:{})",
                self.bottom_start, self.bottom_stop, self.top_start
            ),
            (false, false) => write!(
                f,
                "Index({}-{}:{}-{})",
                self.bottom_start, self.bottom_stop, self.top_start, self.top_stop
            ),
        }
    }
}

/// Memoizing comparer over an ordered set of reference layer trees.
///
/// The cache maps are lock-guarded so a background thread may pre-warm
/// while the owner keeps reading; a computed entry is immutable once
/// stored and is handed out as a shared pointer.
pub struct Comparer<'a> {
    ref_trees: &'a [FileTree],
    trees: RwLock<HashMap<TreeIndexKey, Arc<FileTree>>>,
    path_errors: RwLock<HashMap<TreeIndexKey, Vec<PathError>>>,
    builds: AtomicUsize,
}

impl<'a> Comparer<'a> {
    pub fn new(ref_trees: &'a [FileTree]) -> Self {
        Comparer {
            ref_trees,
            trees: RwLock::new(HashMap::new()),
            path_errors: RwLock::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.ref_trees.len()
    }

    /// Number of cache misses that led to an actual merge. Exposed for
    /// instrumentation.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// The merged-and-marked tree for the given key, computed on first
    /// request and answered from the cache afterwards.
    pub fn get_tree(&self, key: TreeIndexKey) -> Result<Arc<FileTree>, TreeError> {
        if let Some(tree) = self.trees.read().get(&key) {
            return Ok(Arc::clone(tree));
        }

        let mut trees = self.trees.write();
        // another pre-warming thread may have gotten here first
        if let Some(tree) = trees.get(&key) {
            return Ok(Arc::clone(tree));
        }

        let (tree, errors) = self.build(key)?;
        let tree = Arc::new(tree);
        trees.insert(key, Arc::clone(&tree));
        self.path_errors.write().insert(key, errors);
        Ok(tree)
    }

    /// The path-level failures recorded while building the given key.
    pub fn get_path_errors(&self, key: TreeIndexKey) -> Result<Vec<PathError>, TreeError> {
        if let Some(errors) = self.path_errors.read().get(&key) {
            return Ok(errors.clone());
        }
        self.get_tree(key)?;
        Ok(self
            .path_errors
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    fn build(&self, key: TreeIndexKey) -> Result<(FileTree, Vec<PathError>), TreeError> {
        let count = self.ref_trees.len();
        for index in [key.bottom_start, key.bottom_stop, key.top_start, key.top_stop] {
            if index >= count {
                return Err(TreeError::LayerOutOfBounds { index, count });
            }
        }

        self.builds.fetch_add(1, Ordering::Relaxed);

        let (mut tree, mut errors) =
            stack_tree_range(self.ref_trees, key.bottom_start, key.bottom_stop)?;
        for idx in key.top_start..=key.top_stop {
            match tree.compare_and_mark(&self.ref_trees[idx]) {
                Ok(failed) => errors.extend(failed),
                Err(err) => {
                    tracing::error!(key = %key, layer = idx, error = %err, "unable to compare layer");
                    return Err(err);
                }
            }
        }
        Ok((tree, errors))
    }

    /// Layer-to-previous-layer comparison keys: for each selectable
    /// layer, the bottom range covers everything before it and the top
    /// range is the layer itself.
    pub fn natural_indexes(&self) -> impl Iterator<Item = TreeIndexKey> {
        let count = self.ref_trees.len();
        (0..count).map(|select| {
            if select == 0 {
                TreeIndexKey::new(0, 0, 0, 0)
            } else {
                TreeIndexKey::new(0, select - 1, select, select)
            }
        })
    }

    /// Cumulative-from-base comparison keys: the bottom range is pinned
    /// to the base layer and the top range grows with the selection.
    pub fn aggregated_indexes(&self) -> impl Iterator<Item = TreeIndexKey> {
        let count = self.ref_trees.len();
        (0..count).map(|select| {
            if select == 0 {
                TreeIndexKey::new(0, 0, 0, 0)
            } else {
                TreeIndexKey::new(0, 0, 1, select)
            }
        })
    }

    /// Eagerly compute every key both index enumerations produce, so
    /// that interactive navigation afterwards is pure cache lookup.
    ///
    /// The natural pass is best-effort: path-level failures are
    /// collected and reported together. Any hard error aborts, as does
    /// the first failure of the aggregated pass.
    pub fn build_cache(&self) -> Result<Vec<(TreeIndexKey, PathError)>, TreeError> {
        let mut collected = Vec::new();
        for key in self.natural_indexes() {
            for error in self.get_path_errors(key)? {
                tracing::warn!(key = %key, error = %error, "path error while building cache");
                collected.push((key, error));
            }
            self.get_tree(key)?;
        }

        for key in self.aggregated_indexes() {
            self.get_tree(key)?;
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{DiffType, FileInfo, FileKind};

    fn file(size: u64, hash_seed: u8) -> FileInfo {
        FileInfo {
            kind: FileKind::Regular,
            hash: [hash_seed; 32],
            size,
            mode: 0o644,
            ..FileInfo::default()
        }
    }

    fn three_layers() -> Vec<FileTree> {
        let mut base = FileTree::new();
        base.add_path("/etc/motd", file(10, 1)).unwrap();

        let mut middle = FileTree::new();
        middle.add_path("/etc/motd", file(10, 2)).unwrap();

        let mut top = FileTree::new();
        top.add_path("/etc/hosts", file(5, 3)).unwrap();

        vec![base, middle, top]
    }

    #[test]
    fn test_natural_indexes_for_three_layers() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);
        let keys: Vec<TreeIndexKey> = comparer.natural_indexes().collect();
        assert_eq!(
            keys,
            vec![
                TreeIndexKey::new(0, 0, 0, 0),
                TreeIndexKey::new(0, 0, 1, 1),
                TreeIndexKey::new(0, 1, 2, 2),
            ]
        );
    }

    #[test]
    fn test_aggregated_indexes_for_three_layers() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);
        let keys: Vec<TreeIndexKey> = comparer.aggregated_indexes().collect();
        assert_eq!(
            keys,
            vec![
                TreeIndexKey::new(0, 0, 0, 0),
                TreeIndexKey::new(0, 0, 1, 1),
                TreeIndexKey::new(0, 0, 1, 2),
            ]
        );
    }

    #[test]
    fn test_get_tree_memoizes_per_key() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);
        let key = TreeIndexKey::new(0, 0, 1, 1);

        let first = comparer.get_tree(key).unwrap();
        let second = comparer.get_tree(key).unwrap();

        // the same cached object, not merely an equal one
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(comparer.build_count(), 1);
    }

    #[test]
    fn test_get_tree_marks_diffs() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);

        let tree = comparer.get_tree(TreeIndexKey::new(0, 0, 1, 1)).unwrap();
        let motd = tree.get_node("/etc/motd").unwrap();
        assert_eq!(tree.node(motd).data.diff_type, DiffType::Modified);

        let tree = comparer.get_tree(TreeIndexKey::new(0, 1, 2, 2)).unwrap();
        let hosts = tree.get_node("/etc/hosts").unwrap();
        assert_eq!(tree.node(hosts).data.diff_type, DiffType::Added);
    }

    #[test]
    fn test_out_of_bounds_key_is_hard_error_and_not_cached() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);
        let key = TreeIndexKey::new(0, 0, 9, 9);

        assert!(matches!(
            comparer.get_tree(key),
            Err(TreeError::LayerOutOfBounds { index: 9, count: 3 })
        ));
        assert!(comparer.trees.read().get(&key).is_none());
        assert!(comparer.path_errors.read().get(&key).is_none());
    }

    #[test]
    fn test_build_cache_prewarms_all_keys() {
        let trees = three_layers();
        let comparer = Comparer::new(&trees);
        let errors = comparer.build_cache().unwrap();
        assert!(errors.is_empty());

        // four distinct keys: the first two aggregated keys repeat
        // natural ones
        assert_eq!(comparer.build_count(), 4);

        // interactive navigation afterwards never rebuilds
        for key in comparer.natural_indexes().chain(comparer.aggregated_indexes()) {
            comparer.get_tree(key).unwrap();
        }
        assert_eq!(comparer.build_count(), 5);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TreeIndexKey::new(0, 0, 1, 1).to_string(), "Index(0:1)");
        assert_eq!(TreeIndexKey::new(0, 0, 1, 2).to_string(), "Index(0:1-2)");
        assert_eq!(TreeIndexKey::new(0, 1, 2, 2).to_string(), "Index(0-1:2)");
        assert_eq!(TreeIndexKey::new(0, 1, 2, 3).to_string(), "Index(0-1:2-3)");
    }
}
