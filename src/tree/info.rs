//! Per-path file metadata.

use super::DiffType;
use crate::types::{Hash, EMPTY_HASH};

/// The kind of filesystem entry a path represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Hardlink,
    #[default]
    Other,
}

/// Metadata for one path, derived from a layer archive entry.
///
/// `uid`/`gid` may be unknown, represented as -1. The content hash is
/// zero for entries without content (directories, markers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub kind: FileKind,
    pub link_name: String,
    pub hash: Hash,
    pub size: u64,
    pub mode: u32,
    pub uid: i64,
    pub gid: i64,
    pub is_dir: bool,
}

impl Default for FileInfo {
    fn default() -> Self {
        FileInfo {
            path: String::new(),
            kind: FileKind::default(),
            link_name: String::new(),
            hash: EMPTY_HASH,
            size: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            is_dir: false,
        }
    }
}

impl FileInfo {
    /// Determine the DiffType between two payloads. Attributes and
    /// content decide: type, content hash, mode, and ownership must all
    /// match for a path to count as unmodified.
    pub fn compare(&self, other: &FileInfo) -> DiffType {
        if self.kind == other.kind
            && self.hash == other.hash
            && self.mode == other.mode
            && self.uid == other.uid
            && self.gid == other.gid
        {
            DiffType::Unmodified
        } else {
            DiffType::Modified
        }
    }
}
