//! Error types for tree operations and image analysis.

use std::path::PathBuf;
use thiserror::Error;

/// Structural errors raised by file tree operations.
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    /// A path that resolves to nothing but the current directory cannot
    /// be attached to a tree.
    #[error("cannot add relative path '{0}'")]
    RelativePath(String),

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("cannot remove the tree root")]
    RemoveRoot,

    #[error("layer index {index} out of bounds ({count} layers)")]
    LayerOutOfBounds { index: usize, count: usize },

    #[error("no layer trees to stack")]
    EmptyLayerSet,
}

/// Errors raised while reading an image archive or assembling analysis
/// results.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unable to read image archive {path}: {source}")]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image archive has no manifest.json")]
    MissingManifest,

    #[error("malformed image metadata ({context}): {source}")]
    MalformedMetadata {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest references missing layer entry '{0}'")]
    MissingLayer(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0}")]
    Invalid(String),
}
