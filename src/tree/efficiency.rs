//! Wasted-space scoring across an ordered set of layer trees.

use super::{stack_tree_range, FileTree, NodeId, SortOrder};
use crate::error::TreeError;
use std::collections::HashMap;

/// Storage and reference statistics for a single path across all
/// layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfficiencyData {
    pub path: String,
    /// Indices of the layers whose leaves touched this path, in layer
    /// order.
    pub layers: Vec<usize>,
    pub cumulative_size: u64,
    min_discovered_size: Option<u64>,
}

impl EfficiencyData {
    fn new(path: String) -> Self {
        EfficiencyData {
            path,
            layers: Vec::new(),
            cumulative_size: 0,
            min_discovered_size: None,
        }
    }

    /// The layer that introduced this path.
    pub fn first_layer(&self) -> usize {
        self.layers.first().copied().unwrap_or(0)
    }

    /// The layers that duplicated, overwrote, or deleted it.
    pub fn subsequent_layers(&self) -> &[usize] {
        self.layers.get(1..).unwrap_or(&[])
    }

    /// How many layers referenced the path.
    pub fn reference_count(&self) -> usize {
        self.layers.len()
    }

    pub fn min_discovered_size(&self) -> u64 {
        self.min_discovered_size.unwrap_or(0)
    }
}

/// Score how efficiently the given layers use their bytes.
///
/// Loosely: files duplicated across layers discount the score weighted
/// by file size, and files removed discount it weighted by the size
/// they used to occupy. Returns the score in `[0, 1]` together with the
/// paths referenced by more than one layer, ordered by ascending
/// cumulative size (callers typically reverse to show worst offenders
/// first).
pub fn efficiency(trees: &[FileTree]) -> Result<(f64, Vec<EfficiencyData>), TreeError> {
    let mut records: Vec<EfficiencyData> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut inefficient: Vec<usize> = Vec::new();

    for (layer_idx, tree) in trees.iter().enumerate() {
        tree.visit_depth_child_first(
            &mut |t, id| {
                let node = t.node(id);
                let path = t.path_of(id);

                // a whiteout may delete a whole directory; its cost is
                // whatever the path occupied in the union of the layers
                // below it
                let contribution = if node.is_whiteout() {
                    whiteout_contribution(trees, layer_idx, &path)?
                } else {
                    node.data.file_info.size
                };

                let record_idx = match index.get(&path).copied() {
                    Some(existing) => existing,
                    None => {
                        records.push(EfficiencyData::new(path.clone()));
                        index.insert(path, records.len() - 1);
                        records.len() - 1
                    }
                };

                let record = &mut records[record_idx];
                record.cumulative_size += contribution;
                if record
                    .min_discovered_size
                    .map_or(true, |min| contribution < min)
                {
                    record.min_discovered_size = Some(contribution);
                }
                record.layers.push(layer_idx);

                if record.layers.len() == 2 {
                    inefficient.push(record_idx);
                }
                Ok(())
            },
            Some(&|t: &FileTree, id: NodeId| t.node(id).is_leaf()),
            SortOrder::ByName,
        )?;
    }

    let minimum: u64 = records.iter().map(EfficiencyData::min_discovered_size).sum();
    let discovered: u64 = records.iter().map(|r| r.cumulative_size).sum();
    let score = if discovered == 0 {
        // an image with no bytes has nothing to be inefficient about
        1.0
    } else {
        minimum as f64 / discovered as f64
    };

    let mut matches: Vec<EfficiencyData> = inefficient
        .into_iter()
        .map(|idx| records[idx].clone())
        .collect();
    matches.sort_by_key(|data| data.cumulative_size);

    Ok((score, matches))
}

/// The size a whiteout's target used to occupy: resolve the path in the
/// union of all layers strictly before the current one, and sum the
/// subtree when it is a directory.
fn whiteout_contribution(
    trees: &[FileTree],
    layer_idx: usize,
    path: &str,
) -> Result<u64, TreeError> {
    let stacked = if layer_idx == 0 {
        trees[0].copy()
    } else {
        let (tree, failed) = stack_tree_range(trees, 0, layer_idx - 1)?;
        for error in &failed {
            tracing::error!(%error, "path error while stacking for whiteout lookup");
        }
        tree
    };

    let target = stacked.get_node(path)?;
    if !stacked.node(target).data.file_info.is_dir {
        return Ok(0);
    }

    let mut total = 0u64;
    stacked.visit_node_child_first(
        target,
        &mut |t, id| {
            total += t.node(id).data.file_info.size;
            Ok(())
        },
        None,
        SortOrder::ByName,
    )?;
    Ok(total)
}
