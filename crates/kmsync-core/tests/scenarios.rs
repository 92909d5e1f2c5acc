//! End-to-end scenarios exercising `Engine` as an external consumer would,
//! rather than from inside `src/` with access to private helpers.

use std::fs;
use std::path::Path;

use kmsync_core::{content_id, Engine};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn baseline_one_mod_and_restore() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "chitin.key", &vec![0u8; 1024]);
    write(root, "dialog.tlk", &vec![1u8; 5 * 1024 * 1024]);
    write(root, "Override/appearance.2da", &vec![2u8; 10 * 1024]);
    write(root, "Modules/danm13.mod", &vec![3u8; 2 * 1024 * 1024]);

    let engine = Engine::open(root).unwrap();
    let session_id = engine.start_session().unwrap();

    write(root, "Override/texture_1.tga", b"new texture bytes");
    write(root, "Override/appearance.2da", b"overwritten appearance");

    let checkpoint_id = engine.create_checkpoint("mod1", "mod1").unwrap();
    let checkpoints = engine.list_checkpoints(&session_id).unwrap();
    let mod_checkpoint = checkpoints
        .iter()
        .find(|c| c.id == checkpoint_id)
        .unwrap();
    assert_eq!(mod_checkpoint.added_count, 1);
    assert_eq!(mod_checkpoint.modified_count, 1);

    let baseline_id = checkpoints[0].id.clone();
    engine.restore_checkpoint(&baseline_id).unwrap();

    assert!(!root.join("Override/texture_1.tga").exists());
    assert_eq!(
        fs::read(root.join("Override/appearance.2da")).unwrap(),
        vec![2u8; 10 * 1024]
    );

    let report = engine.validate_checkpoint(&baseline_id).unwrap();
    assert!(report.ok, "baseline should verify after restore: {:?}", report.errors);
}

#[test]
fn anchors_land_at_every_tenth_sequence() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "seed.txt", b"seed");
    let engine = Engine::open(root).unwrap();
    engine.start_session().unwrap();

    for i in 0..25 {
        write(root, &format!("mod_{i}.txt"), format!("payload {i}").as_bytes());
        engine.create_checkpoint(&format!("mod{i}"), &format!("mod{i}")).unwrap();
    }

    let session_id = engine.list_sessions().unwrap()[0].id.clone();
    let checkpoints = engine.list_checkpoints(&session_id).unwrap();
    let anchors: Vec<u64> = checkpoints
        .iter()
        .filter(|c| c.is_anchor)
        .map(|c| c.sequence)
        .collect();
    assert_eq!(anchors, vec![0, 10, 20]);
}

#[test]
fn large_file_small_mutation_yields_compact_delta_and_restores_exactly() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let mut original = vec![0u8; 50 * 1024 * 1024];
    for (i, byte) in original.iter_mut().enumerate() {
        *byte = (i % 241) as u8;
    }
    write(root, "dialog.tlk", &original);

    let engine = Engine::open(root).unwrap();
    let session_id = engine.start_session().unwrap();
    let baseline_id = engine.list_checkpoints(&session_id).unwrap()[0].id.clone();

    let mut mutated = original.clone();
    for b in mutated[1_000_000..1_000_030].iter_mut() {
        *b = 0xAA;
    }
    write(root, "dialog.tlk", &mutated);
    engine.create_checkpoint("mod1", "mod1").unwrap();

    let checkpoints = engine.list_checkpoints(&session_id).unwrap();
    let mod_checkpoint = &checkpoints[1];
    assert!((mod_checkpoint.delta_size as usize) < mutated.len() / 10);

    engine.restore_checkpoint(&baseline_id).unwrap();
    assert_eq!(fs::read(root.join("dialog.tlk")).unwrap(), original);
}

#[test]
fn identical_blobs_across_mods_deduplicate_in_cas() {
    use kmsync_core::{content_hash_bytes, ObjectStore};

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "seed.txt", b"seed");
    let engine = Engine::open(root).unwrap();
    engine.start_session().unwrap();

    let blob: &[u8] = b"fourteen bytes";
    assert_eq!(blob.len(), 14);
    write(root, "Override/a.tga", blob);
    engine.create_checkpoint("mod_a", "mod_a").unwrap();

    write(root, "Override/b.tga", blob);
    engine.create_checkpoint("mod_b", "mod_b").unwrap();

    let objects = ObjectStore::new(root.join(".kmsync/checkpoints/objects")).unwrap();
    assert!(objects.exists(&content_hash_bytes(blob)));

    let validation = engine.validate_checkpoint(
        &engine.list_checkpoints(&engine.list_sessions().unwrap()[0].id).unwrap()[2].id,
    ).unwrap();
    assert!(validation.ok, "{:?}", validation.errors);
}

#[test]
fn corruption_is_detected_by_validate() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "chitin.key", b"baseline");
    let engine = Engine::open(root).unwrap();
    let session_id = engine.start_session().unwrap();
    let checkpoint_id = engine.list_checkpoints(&session_id).unwrap()[0].id.clone();

    fs::remove_dir_all(root.join(".kmsync/checkpoints/objects")).unwrap();
    fs::create_dir_all(root.join(".kmsync/checkpoints/objects")).unwrap();

    let report = engine.validate_checkpoint(&checkpoint_id).unwrap();
    assert!(!report.ok);
    assert!(report.errors.iter().any(|e| e.contains("Missing CAS object")));
}

#[test]
fn content_id_is_deterministic_across_equivalent_inputs() {
    use std::collections::BTreeMap;
    use kmsync_core::ContentIdValue;

    let meta = |pairs: &[(&str, &str)]| -> BTreeMap<String, ContentIdValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ContentIdValue::Str(v.to_string())))
            .collect()
    };

    let forward = meta(&[("provider", "ds"), ("filePageId", "1313"), ("version", "5.2")]);
    let reverse = meta(&[("version", "5.2"), ("filePageId", "1313"), ("provider", "ds")]);

    let with_query = content_id(&forward, "https://ex.com/files/1313/?tab=files").unwrap();
    let without_query = content_id(&forward, "https://ex.com/files/1313/").unwrap();
    let reverse_keys = content_id(&reverse, "https://ex.com/files/1313/").unwrap();
    assert_eq!(with_query, without_query);
    assert_eq!(with_query, reverse_keys);

    let different_version = meta(&[("provider", "ds"), ("filePageId", "1313"), ("version", "5.1")]);
    let different_case = meta(&[("provider", "DS"), ("filePageId", "1313"), ("version", "5.2")]);
    assert_ne!(with_query, content_id(&different_version, "https://ex.com/files/1313/").unwrap());
    assert_ne!(with_query, content_id(&different_case, "https://ex.com/files/1313/").unwrap());
}
