//! Image assembly and analysis.
//!
//! An image is an ordered set of layers, each carrying the file tree an
//! archive reader built for it. Analysis walks the layer trees to
//! produce the efficiency score and waste statistics.

mod archive;
mod layer;
mod manifest;

pub use archive::read_archive;
pub use layer::Layer;

use crate::error::ImageError;
use crate::tree::{efficiency, EfficiencyData, FileTree};

/// A container image: its name, per-layer metadata, and the reference
/// tree for each layer (`layers[i]` corresponds to `trees[i]`).
#[derive(Debug)]
pub struct Image {
    pub name: String,
    pub layers: Vec<Layer>,
    pub trees: Vec<FileTree>,
}

impl Image {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_tree(&self, index: usize) -> Option<&FileTree> {
        self.trees.get(index)
    }

    /// Compute the image-wide efficiency statistics.
    pub fn analyze(&self) -> Result<AnalysisResult, ImageError> {
        let (score, inefficiencies) = efficiency(&self.trees)?;

        let mut size_bytes = 0u64;
        let mut user_size_bytes = 0u64;
        for layer in &self.layers {
            size_bytes += layer.size;
            if layer.index != 0 {
                user_size_bytes += layer.size;
            }
        }

        let wasted_bytes: u64 = inefficiencies
            .iter()
            .map(|file| file.cumulative_size)
            .sum();
        let wasted_user_percent = if user_size_bytes == 0 {
            0.0
        } else {
            wasted_bytes as f64 / user_size_bytes as f64
        };

        Ok(AnalysisResult {
            image_name: self.name.clone(),
            layers: self.layers.clone(),
            efficiency: score,
            size_bytes,
            user_size_bytes,
            wasted_bytes,
            wasted_user_percent,
            inefficiencies,
        })
    }
}

/// The result of analyzing an image's layers.
#[derive(Debug)]
pub struct AnalysisResult {
    pub image_name: String,
    pub layers: Vec<Layer>,
    /// Efficiency score in `[0, 1]`.
    pub efficiency: f64,
    pub size_bytes: u64,
    /// All bytes except the base layer.
    pub user_size_bytes: u64,
    pub wasted_bytes: u64,
    /// wasted bytes relative to the user bytes added
    pub wasted_user_percent: f64,
    /// Paths referenced by more than one layer, ascending by cumulative
    /// size.
    pub inefficiencies: Vec<EfficiencyData>,
}
