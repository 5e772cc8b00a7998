//! End-to-end analysis of a synthetic docker-save archive.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use strata::ci::Evaluator;
use strata::export::ExportReport;
use strata::image::read_archive;
use strata::tree::{Comparer, DiffType, TreeIndexKey};

fn tar_file(builder: &mut tar::Builder<&mut Vec<u8>>, path: &str, data: &[u8], mode: u32) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, path, data).unwrap();
}

fn tar_dir(builder: &mut tar::Builder<&mut Vec<u8>>, path: &str) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, path, &[][..]).unwrap();
}

fn layer_tar<F: FnOnce(&mut tar::Builder<&mut Vec<u8>>)>(fill: F) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut builder = tar::Builder::new(&mut bytes);
    fill(&mut builder);
    builder.finish().unwrap();
    drop(builder);
    bytes
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Three layers: the base adds nginx.conf (2000) and public (3000), the
/// second overwrites nginx.conf (5000) and adds athing (10000), the
/// third (gzip compressed) deletes athing via a whiteout.
fn build_fixture_archive() -> tempfile::NamedTempFile {
    let layer0 = layer_tar(|builder| {
        tar_dir(builder, "etc/");
        tar_file(builder, "etc/nginx.conf", &vec![b'a'; 2000], 0o644);
        tar_file(builder, "etc/public", &vec![b'p'; 3000], 0o644);
    });
    let layer1 = layer_tar(|builder| {
        tar_dir(builder, "etc/");
        tar_file(builder, "etc/nginx.conf", &vec![b'b'; 5000], 0o644);
        tar_file(builder, "etc/athing", &vec![b't'; 10000], 0o644);
    });
    let layer2 = gzip(&layer_tar(|builder| {
        tar_file(builder, "etc/.wh.athing", &[], 0o644);
    }));

    let manifest = serde_json::json!([{
        "Config": "config.json",
        "RepoTags": ["strata/fixture:latest"],
        "Layers": ["l0/layer.tar", "l1/layer.tar", "l2/layer.tar"],
    }])
    .to_string();

    let config = serde_json::json!({
        "history": [
            {"created_by": "ADD rootfs /"},
            {"created_by": "ENV PATH=/bin", "empty_layer": true},
            {"created_by": "RUN rebuild nginx.conf"},
            {"created_by": "RUN rm athing"},
        ],
        "rootfs": {
            "type": "layers",
            "diff_ids": ["sha256:aaaa", "sha256:bbbb", "sha256:cccc"],
        },
    })
    .to_string();

    let mut outer = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut outer);
        tar_file(&mut builder, "manifest.json", manifest.as_bytes(), 0o644);
        tar_file(&mut builder, "config.json", config.as_bytes(), 0o644);
        tar_file(&mut builder, "l0/layer.tar", &layer0, 0o644);
        tar_file(&mut builder, "l1/layer.tar", &layer1, 0o644);
        tar_file(&mut builder, "l2/layer.tar", &layer2, 0o644);
        builder.finish().unwrap();
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&outer).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn archive_read_assembles_layers_in_manifest_order() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();

    assert_eq!(image.name, "strata/fixture:latest");
    assert_eq!(image.layer_count(), 3);

    assert_eq!(image.layers[0].digest, "sha256:aaaa");
    assert_eq!(image.layers[0].command, "ADD rootfs /");
    assert_eq!(image.layers[0].size, 5000);

    // empty_layer history entries do not consume a layer slot
    assert_eq!(image.layers[1].command, "RUN rebuild nginx.conf");
    assert_eq!(image.layers[1].size, 15000);
    assert_eq!(image.layers[2].command, "RUN rm athing");

    let base = image.layer_tree(0).unwrap();
    let conf = base.get_node("/etc/nginx.conf").unwrap();
    assert_eq!(base.node(conf).data.file_info.size, 2000);
    assert_eq!(base.node(conf).data.file_info.mode, 0o644);

    // the gzip layer was sniffed and decoded
    let top = image.layer_tree(2).unwrap();
    assert!(top.get_node("/etc/.wh.athing").is_ok());
}

#[test]
fn analysis_scores_overwrites_and_deletions() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();
    let analysis = image.analyze().unwrap();

    // minimum bytes: nginx.conf 2000 + public 3000 + athing 0 (deleted)
    // discovered bytes: 7000 + 3000 + 10000
    assert_eq!(analysis.efficiency, 0.25);
    assert_eq!(analysis.wasted_bytes, 17000);
    assert_eq!(analysis.size_bytes, 20000);
    assert_eq!(analysis.user_size_bytes, 15000);

    assert_eq!(analysis.inefficiencies.len(), 2);
    // ascending by cumulative size
    assert_eq!(analysis.inefficiencies[0].path, "/etc/nginx.conf");
    assert_eq!(analysis.inefficiencies[0].cumulative_size, 7000);
    assert_eq!(analysis.inefficiencies[0].layers, vec![0, 1]);
    assert_eq!(analysis.inefficiencies[1].path, "/etc/athing");
    assert_eq!(analysis.inefficiencies[1].cumulative_size, 10000);
    assert_eq!(analysis.inefficiencies[1].layers, vec![1, 2]);
}

#[test]
fn comparer_classifies_layer_transitions() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();
    let comparer = Comparer::new(&image.trees);

    // changes going into layer 1
    let tree = comparer.get_tree(TreeIndexKey::new(0, 0, 1, 1)).unwrap();
    let conf = tree.get_node("/etc/nginx.conf").unwrap();
    assert_eq!(tree.node(conf).data.diff_type, DiffType::Modified);
    let athing = tree.get_node("/etc/athing").unwrap();
    assert_eq!(tree.node(athing).data.diff_type, DiffType::Added);
    let public = tree.get_node("/etc/public").unwrap();
    assert_eq!(tree.node(public).data.diff_type, DiffType::Unmodified);
    let etc = tree.get_node("/etc").unwrap();
    assert_eq!(tree.node(etc).data.diff_type, DiffType::Modified);

    // changes going into layer 2: the whiteout marks the file removed
    let tree = comparer.get_tree(TreeIndexKey::new(0, 1, 2, 2)).unwrap();
    let athing = tree.get_node("/etc/athing").unwrap();
    assert_eq!(tree.node(athing).data.diff_type, DiffType::Removed);

    // the merged view renders
    let rendered = tree.render(false);
    assert!(rendered.contains("athing"));
    assert!(rendered.contains("nginx.conf"));
}

#[test]
fn comparer_prewarm_makes_navigation_cache_only() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();
    let comparer = Comparer::new(&image.trees);

    let path_errors = comparer.build_cache().unwrap();
    assert!(path_errors.is_empty());

    let builds = comparer.build_count();
    for key in comparer
        .natural_indexes()
        .chain(comparer.aggregated_indexes())
    {
        comparer.get_tree(key).unwrap();
    }
    assert_eq!(comparer.build_count(), builds);
}

#[test]
fn export_report_json_contract_has_required_fields() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();
    let analysis = image.analyze().unwrap();
    let report = ExportReport::new(&image, &analysis);

    let parsed: serde_json::Value = serde_json::from_str(&report.marshal().unwrap()).unwrap();

    let image_block = parsed.get("image").expect("image block should exist");
    assert!(image_block.get("sizeBytes").and_then(|v| v.as_u64()).is_some());
    assert!(image_block
        .get("inefficientBytes")
        .and_then(|v| v.as_u64())
        .is_some());
    assert!(image_block
        .get("efficiencyScore")
        .and_then(|v| v.as_f64())
        .is_some());

    let references = image_block
        .get("fileReference")
        .and_then(|v| v.as_array())
        .expect("fileReference array should exist");
    // worst offenders first
    assert_eq!(references[0]["file"], "/etc/athing");
    assert_eq!(references[1]["file"], "/etc/nginx.conf");

    let layers = parsed
        .get("layer")
        .and_then(|v| v.as_array())
        .expect("layer array should exist");
    assert_eq!(layers.len(), 3);
    for layer in layers {
        assert!(layer.get("index").is_some());
        assert!(layer.get("digestId").is_some());
        assert!(layer.get("command").is_some());
        assert!(layer.get("fileList").and_then(|v| v.as_array()).is_some());
    }
}

#[test]
fn ci_gate_fails_wasteful_image_with_default_rules() {
    let archive = build_fixture_archive();
    let image = read_archive(archive.path()).unwrap();
    let analysis = image.analyze().unwrap();

    let mut evaluator = Evaluator::default();
    assert!(!evaluator.evaluate(&analysis));
    assert_eq!(evaluator.tally.total, 3);
    assert_eq!(evaluator.tally.fail, 2);
    assert_eq!(evaluator.tally.skip, 1);

    let report = evaluator.report();
    assert!(report.contains("lowestEfficiency"));
    assert!(report.contains("Result:FAIL"));
}
