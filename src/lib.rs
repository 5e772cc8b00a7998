//! Strata: Container Image Layer Analysis
//!
//! Models each image layer as a file tree, merges layers with
//! union-mount semantics, classifies per-path changes between layer
//! ranges, and scores how efficiently an image uses its bytes.

pub mod ci;
pub mod config;
pub mod error;
pub mod export;
pub mod image;
pub mod logging;
pub mod tree;
pub mod types;
