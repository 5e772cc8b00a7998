//! Per-path merge failures.
//!
//! Image layers in the wild occasionally contain malformed entries; a
//! handful of bad paths must not abort an otherwise-successful merge.
//! Failures are collected as values and returned alongside the partial
//! result.

use crate::error::TreeError;
use std::fmt;

/// The merge action that failed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Add,
    Remove,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Add => f.write_str("add"),
            FileAction::Remove => f.write_str("remove"),
        }
    }
}

/// A path-level failure recorded while stacking or comparing trees.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unable to {action} '{path}': {source}")]
pub struct PathError {
    pub path: String,
    pub action: FileAction,
    #[source]
    pub source: TreeError,
}

impl PathError {
    pub fn new(path: impl Into<String>, action: FileAction, source: TreeError) -> Self {
        PathError {
            path: path.into(),
            action,
            source,
        }
    }
}
