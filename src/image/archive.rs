//! Reading docker-save style image archives.
//!
//! The archive is read in two passes: the first finds `manifest.json`,
//! the second extracts the config blob and every referenced layer in
//! manifest order. Layer tars may be stored plain, gzip, or zstd
//! compressed; the format is sniffed from magic bytes rather than file
//! extensions.

use super::layer::Layer;
use super::manifest::{ImageConfig, ManifestEntry};
use super::Image;
use crate::error::ImageError;
use crate::tree::{FileInfo, FileKind, FileTree};
use crate::types::{Hash, EMPTY_HASH};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Read a `docker save` style archive from disk and assemble the image:
/// one file tree per layer plus layer metadata from the image config.
pub fn read_archive(path: &Path) -> Result<Image, ImageError> {
    let manifest = read_manifest(path)?;

    let file = File::open(path).map_err(|source| ImageError::ArchiveRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = tar::Archive::new(BufReader::new(file));

    let mut config_bytes: Option<Vec<u8>> = None;
    let mut layer_trees: HashMap<String, FileTree> = HashMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry_name(&entry);

        if name == manifest.config {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            config_bytes = Some(bytes);
        } else if manifest.layers.iter().any(|layer| *layer == name) {
            let reader = layer_reader(&mut entry)?;
            let tree = process_layer_tar(&name, reader)?;
            layer_trees.insert(name, tree);
        }
    }

    let config_bytes = config_bytes.ok_or_else(|| {
        ImageError::MissingLayer(format!("config blob '{}'", manifest.config))
    })?;
    let config: ImageConfig =
        serde_json::from_slice(&config_bytes).map_err(|source| ImageError::MalformedMetadata {
            context: manifest.config.clone(),
            source,
        })?;

    assemble(path, manifest, config, layer_trees)
}

fn assemble(
    path: &Path,
    manifest: ManifestEntry,
    config: ImageConfig,
    mut layer_trees: HashMap<String, FileTree>,
) -> Result<Image, ImageError> {
    // commands come from the config history, skipping entries that
    // produced no layer
    let commands: Vec<String> = config
        .history
        .iter()
        .filter(|entry| !entry.empty_layer)
        .map(|entry| entry.created_by.clone())
        .collect();

    let mut layers = Vec::with_capacity(manifest.layers.len());
    let mut trees = Vec::with_capacity(manifest.layers.len());
    for (index, layer_name) in manifest.layers.iter().enumerate() {
        let tree = layer_trees
            .remove(layer_name)
            .ok_or_else(|| ImageError::MissingLayer(layer_name.clone()))?;
        layers.push(Layer {
            index,
            id: layer_name.clone(),
            digest: config.rootfs.diff_ids.get(index).cloned().unwrap_or_default(),
            command: commands.get(index).cloned().unwrap_or_default(),
            size: tree.file_size(),
        });
        trees.push(tree);
    }

    let name = manifest
        .repo_tags
        .first()
        .cloned()
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string())
        });

    tracing::info!(
        image = %name,
        layers = layers.len(),
        fs_type = %config.rootfs.fs_type,
        "image archive read"
    );

    Ok(Image {
        name,
        layers,
        trees,
    })
}

/// First pass: locate and parse `manifest.json`.
fn read_manifest(path: &Path) -> Result<ManifestEntry, ImageError> {
    let file = File::open(path).map_err(|source| ImageError::ArchiveRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = tar::Archive::new(BufReader::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry_name(&entry) != "manifest.json" {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let mut entries: Vec<ManifestEntry> =
            serde_json::from_slice(&bytes).map_err(|source| ImageError::MalformedMetadata {
                context: "manifest.json".to_string(),
                source,
            })?;
        return entries.drain(..).next().ok_or(ImageError::MissingManifest);
    }
    Err(ImageError::MissingManifest)
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> String {
    let raw = entry.path_bytes();
    let name = String::from_utf8_lossy(&raw);
    name.trim_start_matches("./").to_string()
}

/// Wrap a layer entry in the right decompressor based on its magic
/// bytes.
fn layer_reader<'a, R: Read>(entry: &'a mut R) -> Result<Box<dyn Read + 'a>, ImageError> {
    let mut probe = [0u8; 4];
    let probed = read_up_to(entry, &mut probe)?;
    let rewound = Cursor::new(probe[..probed].to_vec()).chain(entry);

    if probed >= 2 && probe[..2] == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(rewound)))
    } else if probed >= 4 && probe == ZSTD_MAGIC {
        Ok(Box::new(zstd::stream::read::Decoder::new(rewound)?))
    } else {
        Ok(Box::new(rewound))
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ImageError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Build a FileTree from a single layer tar stream.
fn process_layer_tar(name: &str, reader: impl Read) -> Result<FileTree, ImageError> {
    let mut tree = FileTree::new();
    tree.set_name(name);

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry_name(&entry);
        if path.is_empty() || path == "." || path == "/" {
            continue;
        }

        let info = file_info_from_entry(&mut entry, &path)?;
        let is_regular = info.kind == FileKind::Regular;
        let size = info.size;

        match tree.add_path(&path, info) {
            Ok(_) => {
                if is_regular {
                    tree.add_file_size(size);
                }
            }
            Err(err) => {
                // a malformed entry must not abort the rest of the layer
                tracing::warn!(layer = name, %path, error = %err, "unable to add archive entry");
            }
        }
    }

    Ok(tree)
}

/// Derive per-path metadata from a tar entry, hashing file content.
fn file_info_from_entry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    path: &str,
) -> Result<FileInfo, ImageError> {
    let header = entry.header();
    let kind = match header.entry_type() {
        tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
            FileKind::Regular
        }
        tar::EntryType::Directory => FileKind::Directory,
        tar::EntryType::Symlink => FileKind::Symlink,
        tar::EntryType::Link => FileKind::Hardlink,
        _ => FileKind::Other,
    };
    let size = header.size().unwrap_or(0);
    let mode = header.mode().unwrap_or(0);
    let uid = header.uid().map(|uid| uid as i64).unwrap_or(-1);
    let gid = header.gid().map(|gid| gid as i64).unwrap_or(-1);
    let link_name = entry
        .link_name()
        .ok()
        .flatten()
        .map(|link| link.to_string_lossy().into_owned())
        .unwrap_or_default();

    let hash = if kind == FileKind::Regular {
        hash_entry_content(entry)?
    } else {
        EMPTY_HASH
    };

    Ok(FileInfo {
        path: format!("/{path}"),
        kind,
        link_name,
        hash,
        size,
        mode,
        uid,
        gid,
        is_dir: kind == FileKind::Directory,
    })
}

fn hash_entry_content<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Hash, ImageError> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = entry.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash_bytes;

    #[test]
    fn test_hash_bytes_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
        assert_ne!(hash_bytes(b""), EMPTY_HASH);
    }

    #[test]
    fn test_read_up_to_short_input() {
        let mut input: &[u8] = b"xy";
        let mut buf = [0u8; 4];
        let n = read_up_to(&mut input, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], b"xy");
    }
}
