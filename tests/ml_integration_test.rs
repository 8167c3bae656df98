/// Integration tests for the training pipeline
///
/// These tests verify the complete model lifecycle:
/// - Dataset loading from CSV
/// - Schema derivation
/// - Scaler and forest fitting with held-out evaluation
/// - Artifact persistence and reload
/// - Scoring the reference record
mod common;

use common::{parse_prometheus_output, sample_record, small_training_config};
use credit_default_predictor::{
    metrics,
    ml::{
        derive_schema, train, train_and_persist, ArtifactStore, Dataset, FsArtifactStore,
        ModelService, TrainingConfig, CANONICAL_FEATURES, ID_COLUMN, LABEL_COLUMN,
    },
};
use std::sync::Arc;

#[test]
fn test_end_to_end_with_default_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("credit_card_model.bin"));
    let dataset = Dataset::synthetic(30_000, 42);

    let outcome = train_and_persist(&dataset, &TrainingConfig::default(), &store).unwrap();

    assert!((0.0..=1.0).contains(&outcome.metrics.accuracy));
    assert_eq!(outcome.metrics.support, 6_000);
    // well above chance on the synthetic signal
    assert!(outcome.metrics.accuracy > 0.6, "accuracy {}", outcome.metrics.accuracy);
    assert_eq!(outcome.artifact.model().n_trees(), 100);
    assert!(store.exists());

    let result =
        credit_default_predictor::ml::predict(&sample_record(), &outcome.artifact).unwrap();
    assert!(result.prediction <= 1);
    let total = result.probability.no_default + result.probability.default;
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(result.confidence, result.probability.max());
    assert_eq!(result.feature_importance.len(), 23);
    let importance_sum: f64 = result.feature_importance.values().sum();
    assert!((importance_sum - 1.0).abs() < 1e-6);
}

#[test]
fn test_schema_follows_dataset_columns() {
    let dataset = Dataset::synthetic(50, 1);
    let schema = derive_schema(dataset.columns(), LABEL_COLUMN, &[ID_COLUMN]).unwrap();

    assert_eq!(schema.len(), 23);
    let expected: Vec<&str> = CANONICAL_FEATURES.to_vec();
    assert_eq!(schema.iter().collect::<Vec<_>>(), expected);

    let outcome = train(&Dataset::synthetic(400, 1), &small_training_config(1)).unwrap();
    assert_eq!(outcome.artifact.schema(), &schema);
}

#[test]
fn test_heldout_metrics_are_consistent() {
    let outcome = train(&Dataset::synthetic(1_000, 3), &small_training_config(3)).unwrap();
    let metrics = outcome.metrics;

    let cells: usize = metrics.confusion_matrix.iter().flatten().sum();
    assert_eq!(cells, metrics.support);
    assert_eq!(metrics.support, 200);

    let correct = metrics.confusion_matrix[0][0] + metrics.confusion_matrix[1][1];
    assert!((metrics.accuracy - correct as f64 / 200.0).abs() < 1e-12);
    for value in [metrics.precision, metrics.recall, metrics.f1_score] {
        assert!((0.0..=1.0).contains(&value));
    }
}

#[test]
fn test_reloaded_artifact_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let store = FsArtifactStore::new(&path);

    let outcome = train_and_persist(
        &Dataset::synthetic(800, 5),
        &small_training_config(5),
        &store,
    )
    .unwrap();

    let reloaded = FsArtifactStore::new(&path).load().unwrap();
    let record = sample_record();
    assert_eq!(
        credit_default_predictor::ml::predict(&record, &outcome.artifact).unwrap(),
        credit_default_predictor::ml::predict(&record, &reloaded).unwrap()
    );
    assert_eq!(reloaded.metadata(), outcome.artifact.metadata());
}

#[tokio::test]
async fn test_service_trains_from_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("UCI_Credit_Card.csv");
    Dataset::synthetic(600, 8).write_csv_path(&csv_path).unwrap();

    let config = TrainingConfig {
        dataset_path: csv_path,
        ..small_training_config(8)
    };
    let store = Arc::new(FsArtifactStore::new(dir.path().join("model.bin")));
    let service = ModelService::new(config, store.clone());

    let heldout = service.train().await.unwrap();
    assert_eq!(heldout.support, 120);
    assert!(store.exists());

    let result = service.predict(&sample_record()).unwrap();
    assert!(result.prediction <= 1);
    assert!(result.interpretation.ends_with("risk of default"));
}

#[test]
fn test_training_updates_prometheus_metrics() {
    metrics::init_metrics().unwrap();
    let store = credit_default_predictor::ml::InMemoryArtifactStore::new();

    train_and_persist(&Dataset::synthetic(300, 2), &small_training_config(2), &store).unwrap();

    let parsed = parse_prometheus_output(&metrics::gather_metrics());
    let runs = parsed
        .get("credit_default_training_runs_total")
        .expect("training runs metric exported");
    assert!(runs.iter().any(|line| line.contains("status=\"success\"")));
    assert!(parsed.contains_key("credit_default_model_heldout_accuracy"));
}
