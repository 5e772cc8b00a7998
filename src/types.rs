//! Core types shared across the layer analysis engine.

/// Hash: 256-bit content hash of a file's bytes.
pub type Hash = [u8; 32];

/// The hash carried by entries that have no content (directories and
/// whiteout markers).
pub const EMPTY_HASH: Hash = [0u8; 32];

/// Compute the content hash of a byte slice.
pub fn hash_bytes(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}
