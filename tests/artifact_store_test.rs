/// Integration tests for artifact persistence
///
/// Covers the on-disk contract: round trips, overwrite, missing and damaged
/// files, and failed writes.
mod common;

use common::{sample_record, trained_artifact, varied_record};
use credit_default_predictor::{
    ml::{predict, ArtifactStore, FsArtifactStore},
    AppError,
};

fn leftover_temp_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".artifact-"))
        .collect()
}

#[test]
fn test_round_trip_preserves_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("model.bin"));
    let artifact = trained_artifact(500, 11);

    store.save(&artifact).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.schema(), artifact.schema());
    assert_eq!(loaded.feature_importance(), artifact.feature_importance());
    for i in 0..20 {
        let record = varied_record(i);
        assert_eq!(
            predict(&record, &loaded).unwrap(),
            predict(&record, &artifact).unwrap()
        );
    }
}

#[test]
fn test_save_overwrites_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("model.bin"));
    let first = trained_artifact(400, 1);
    let second = trained_artifact(400, 2);

    store.save(&first).unwrap();
    store.save(&second).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.model(), second.model());
    assert_eq!(loaded.scaler(), second.scaler());
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[test]
fn test_missing_artifact_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.bin");
    let store = FsArtifactStore::new(&path);

    match store.load() {
        Err(AppError::ArtifactNotFound(reported)) => assert_eq!(reported, path),
        other => panic!("expected ArtifactNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_damaged_files_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let store = FsArtifactStore::new(&path);
    store.save(&trained_artifact(300, 4)).unwrap();
    let good = std::fs::read(&path).unwrap();

    let damaged: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"{\"model\": null}".to_vec(),
        good[..good.len() / 2].to_vec(),
        good[..8].to_vec(),
    ];

    for bytes in damaged {
        std::fs::write(&path, &bytes).unwrap();
        let err = store.load().unwrap_err();
        assert!(
            matches!(err, AppError::CorruptArtifact(_)),
            "{} bytes gave {:?}",
            bytes.len(),
            err
        );
        assert!(!err.is_client_error());
    }
}

#[test]
fn test_unwritable_location_is_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let store = FsArtifactStore::new(blocker.join("model.bin"));
    let err = store.save(&trained_artifact(300, 6)).unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
    assert_eq!(err.error_code(), "PERSISTENCE_ERROR");
}

#[test]
fn test_failed_write_leaves_no_partial_artifact() {
    let dir = tempfile::tempdir().unwrap();
    // A directory squatting on the target path makes the final rename fail
    let target = dir.path().join("model.bin");
    std::fs::create_dir(&target).unwrap();

    let store = FsArtifactStore::new(&target);
    assert!(matches!(
        store.save(&trained_artifact(300, 7)),
        Err(AppError::Persistence(_))
    ));
    assert!(target.is_dir());
    assert!(leftover_temp_files(dir.path()).is_empty());
    assert!(!store.exists());
}

#[test]
fn test_loaded_artifact_scores_reference_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("model.bin"));
    store.save(&trained_artifact(500, 9)).unwrap();

    let result = predict(&sample_record(), &store.load().unwrap()).unwrap();
    assert!((result.probability.no_default + result.probability.default - 1.0).abs() < 1e-6);
}
