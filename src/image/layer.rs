//! Per-layer metadata.

use bytesize::ByteSize;

/// Metadata for a single image layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub index: usize,
    /// The layer entry's name within the archive.
    pub id: String,
    /// The uncompressed diff digest from the image config.
    pub digest: String,
    /// The instruction that created the layer.
    pub command: String,
    /// Bytes of regular-file content the layer carries.
    pub size: u64,
}

impl Layer {
    /// A truncated identifier suitable for one-line summaries.
    pub fn short_id(&self) -> String {
        let id = self.digest.strip_prefix("sha256:").unwrap_or(&self.digest);
        let id = if id.is_empty() { &self.id } else { id };
        id.chars().take(15).collect()
    }

    /// One-line summary: size column plus the creating command. The
    /// base layer shows its id instead of a command.
    pub fn summary(&self) -> String {
        let label = if self.index == 0 {
            format!("FROM {}", self.short_id())
        } else {
            self.command.clone()
        };
        format!("{:>10}  {}", ByteSize::b(self.size).to_string(), label)
    }
}
