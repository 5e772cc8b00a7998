//! JSON export of an analysis.

use crate::error::ImageError;
use crate::image::{AnalysisResult, Image};
use crate::tree::{FileKind, FileTree, SortOrder};
use serde::Serialize;

/// The full report: per-layer file listings plus image-wide statistics.
#[derive(Debug, Serialize)]
pub struct ExportReport {
    pub layer: Vec<ExportLayer>,
    pub image: ExportImage,
}

#[derive(Debug, Serialize)]
pub struct ExportImage {
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    #[serde(rename = "inefficientBytes")]
    pub inefficient_bytes: u64,
    #[serde(rename = "efficiencyScore")]
    pub efficiency_score: f64,
    #[serde(rename = "fileReference")]
    pub file_reference: Vec<FileReference>,
}

/// A path referenced by multiple layers, worst offenders first.
#[derive(Debug, Serialize)]
pub struct FileReference {
    pub count: usize,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct ExportLayer {
    pub index: usize,
    pub id: String,
    #[serde(rename = "digestId")]
    pub digest_id: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    pub command: String,
    #[serde(rename = "fileList")]
    pub file_list: Vec<ExportFileInfo>,
}

#[derive(Debug, Serialize)]
pub struct ExportFileInfo {
    pub path: String,
    #[serde(rename = "typeFlag")]
    pub type_flag: String,
    #[serde(rename = "linkName")]
    pub link_name: String,
    pub size: u64,
    #[serde(rename = "fileMode")]
    pub file_mode: u32,
    pub uid: i64,
    pub gid: i64,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Regular => "regular",
        FileKind::Directory => "directory",
        FileKind::Symlink => "symlink",
        FileKind::Hardlink => "hardlink",
        FileKind::Other => "other",
    }
}

fn layer_file_list(tree: &FileTree) -> Vec<ExportFileInfo> {
    let mut files = Vec::new();
    let _ = tree.visit_depth_child_first(
        &mut |t, id| {
            let info = &t.node(id).data.file_info;
            files.push(ExportFileInfo {
                path: t.path_of(id),
                type_flag: kind_label(info.kind).to_string(),
                link_name: info.link_name.clone(),
                size: info.size,
                file_mode: info.mode,
                uid: info.uid,
                gid: info.gid,
                is_dir: info.is_dir,
            });
            Ok(())
        },
        None,
        SortOrder::ByName,
    );
    files
}

impl ExportReport {
    pub fn new(image: &Image, analysis: &AnalysisResult) -> Self {
        let layer = analysis
            .layers
            .iter()
            .map(|meta| ExportLayer {
                index: meta.index,
                id: meta.id.clone(),
                digest_id: meta.digest.clone(),
                size_bytes: meta.size,
                command: meta.command.clone(),
                file_list: image
                    .layer_tree(meta.index)
                    .map(layer_file_list)
                    .unwrap_or_default(),
            })
            .collect();

        // worst offenders first
        let file_reference = analysis
            .inefficiencies
            .iter()
            .rev()
            .map(|data| FileReference {
                count: data.reference_count(),
                size_bytes: data.cumulative_size,
                file: data.path.clone(),
            })
            .collect();

        ExportReport {
            layer,
            image: ExportImage {
                size_bytes: analysis.size_bytes,
                inefficient_bytes: analysis.wasted_bytes,
                efficiency_score: analysis.efficiency,
                file_reference,
            },
        }
    }

    /// Pretty-printed JSON bytes of the report.
    pub fn marshal(&self) -> Result<String, ImageError> {
        serde_json::to_string_pretty(self).map_err(|source| ImageError::MalformedMetadata {
            context: "export report".to_string(),
            source,
        })
    }
}
