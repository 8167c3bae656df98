/// Integration tests for the inference contract
///
/// Validation, projection, probability normalization and batch atomicity,
/// including property tests over arbitrary feature values.
mod common;

use common::{sample_record, trained_artifact, varied_record};
use credit_default_predictor::{
    ml::{
        inference::{project, HIGH_RISK, LOW_RISK},
        predict, predict_batch, Artifact, CreditProfile, PredictionRecord, CANONICAL_FEATURES,
    },
    AppError,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::OnceLock;

fn shared_artifact() -> &'static Artifact {
    static ARTIFACT: OnceLock<Artifact> = OnceLock::new();
    ARTIFACT.get_or_init(|| trained_artifact(1_500, 21))
}

fn record_from_values(values: &[f64]) -> PredictionRecord {
    CANONICAL_FEATURES
        .iter()
        .copied()
        .zip(values.iter().copied())
        .collect()
}

#[test]
fn test_missing_features_are_named_in_schema_order() {
    let mut record = sample_record();
    record.remove("PAY_AMT6");
    record.remove("AGE");

    match predict(&record, shared_artifact()) {
        Err(AppError::MissingFeatures {
            missing,
            record_index,
        }) => {
            assert_eq!(missing, vec!["AGE".to_string(), "PAY_AMT6".to_string()]);
            assert_eq!(record_index, None);
        }
        other => panic!("expected MissingFeatures, got {:?}", other),
    }
}

#[test]
fn test_empty_record_lists_every_feature() {
    let err = predict(&PredictionRecord::new(), shared_artifact()).unwrap_err();
    match err {
        AppError::MissingFeatures { missing, .. } => assert_eq!(missing.len(), 23),
        other => panic!("expected MissingFeatures, got {:?}", other),
    }
}

#[test]
fn test_extra_keys_do_not_change_the_result() {
    let artifact = shared_artifact();
    let plain = predict(&sample_record(), artifact).unwrap();

    let noisy = sample_record()
        .with("customer_name", "Jane")
        .with("ID", 12345)
        .with("default.payment.next.month", 1);
    assert_eq!(predict(&noisy, artifact).unwrap(), plain);
}

#[test]
fn test_numeric_strings_score_like_numbers() {
    let artifact = shared_artifact();
    let mut record = sample_record();
    record.insert("LIMIT_BAL", "20000");
    record.insert("AGE", "30");

    assert_eq!(
        predict(&record, artifact).unwrap(),
        predict(&sample_record(), artifact).unwrap()
    );
}

#[test]
fn test_invalid_value_is_rejected() {
    let mut record = sample_record();
    record.insert("EDUCATION", "graduate");

    match predict(&record, shared_artifact()).unwrap_err() {
        AppError::InvalidFeatureValue { name, value, .. } => {
            assert_eq!(name, "EDUCATION");
            assert_eq!(value, "\"graduate\"");
        }
        other => panic!("expected InvalidFeatureValue, got {:?}", other),
    }
}

#[test]
fn test_out_of_range_values_are_still_scored() {
    let record = sample_record().with("AGE", -5).with("LIMIT_BAL", 1e12);
    let result = predict(&record, shared_artifact()).unwrap();
    assert!(result.prediction <= 1);
}

#[test]
fn test_result_shape() {
    let artifact = shared_artifact();
    let result = predict(&sample_record(), artifact).unwrap();

    assert_eq!(result.confidence, result.probability.max());
    assert_eq!(result.prediction == 1, result.probability.default > result.probability.no_default);
    assert_eq!(
        result.interpretation,
        if result.prediction == 1 { HIGH_RISK } else { LOW_RISK }
    );

    // global importance, identical for every record
    let other = predict(&varied_record(17), artifact).unwrap();
    assert_eq!(result.feature_importance, other.feature_importance);
    assert_eq!(&result.feature_importance, artifact.feature_importance());
    assert!(result.feature_importance.values().all(|v| *v >= 0.0));
}

#[test]
fn test_response_json_layout() {
    let result = predict(&sample_record(), shared_artifact()).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert!(json["prediction"].is_u64());
    assert!(json["probability"]["no_default"].is_f64());
    assert!(json["probability"]["default"].is_f64());
    assert!(json["confidence"].is_f64());
    assert_eq!(json["feature_importance"].as_object().unwrap().len(), 23);
    assert!(json["interpretation"].is_string());
}

#[test]
fn test_credit_profile_matches_record() {
    let profile: CreditProfile = serde_json::from_value(json!({
        "LIMIT_BAL": 20000, "SEX": 1, "EDUCATION": 1, "MARRIAGE": 1, "AGE": 30,
        "PAY_0": 0, "PAY_2": 0, "PAY_3": 0, "PAY_4": 0, "PAY_5": 0, "PAY_6": 0,
        "BILL_AMT1": 1000, "BILL_AMT2": 1000, "BILL_AMT3": 1000,
        "BILL_AMT4": 1000, "BILL_AMT5": 1000, "BILL_AMT6": 1000,
        "PAY_AMT1": 1000, "PAY_AMT2": 1000, "PAY_AMT3": 1000,
        "PAY_AMT4": 1000, "PAY_AMT5": 1000, "PAY_AMT6": 1000
    }))
    .unwrap();

    let artifact = shared_artifact();
    assert_eq!(
        predict(&PredictionRecord::from(profile), artifact).unwrap(),
        predict(&sample_record(), artifact).unwrap()
    );
}

#[test]
fn test_batch_matches_single_predictions_in_order() {
    let artifact = shared_artifact();
    let records: Vec<PredictionRecord> = (0..25).map(varied_record).collect();

    let batch = predict_batch(&records, artifact).unwrap();
    assert_eq!(batch.len(), 25);
    for (i, item) in batch.iter().enumerate() {
        assert_eq!(item.record_id, i);
        assert_eq!(item.result, predict(&records[i], artifact).unwrap());
    }
}

#[test]
fn test_batch_is_atomic() {
    let artifact = shared_artifact();
    let mut records: Vec<PredictionRecord> = (0..10).map(varied_record).collect();
    records[6].remove("BILL_AMT3");

    let err = predict_batch(&records, artifact).unwrap_err();
    match &err {
        AppError::MissingFeatures { missing, .. } => {
            assert_eq!(missing, &vec!["BILL_AMT3".to_string()]);
        }
        other => panic!("expected MissingFeatures, got {:?}", other),
    }
    assert_eq!(err.record_index(), Some(6));
}

#[test]
fn test_batch_reports_first_invalid_record() {
    let mut records: Vec<PredictionRecord> = (0..5).map(varied_record).collect();
    records[1].insert("AGE", json!(null));
    records[3].remove("AGE");

    let err = predict_batch(&records, shared_artifact()).unwrap_err();
    assert!(matches!(err, AppError::InvalidFeatureValue { .. }));
    assert_eq!(err.record_index(), Some(1));
}

#[test]
fn test_empty_batch() {
    assert!(predict_batch(&[], shared_artifact()).unwrap().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_projection_is_idempotent(values in prop::collection::vec(-1.0e7f64..1.0e7, 23)) {
        let schema = shared_artifact().schema();
        let record = record_from_values(&values);

        let once = project(&record, schema).unwrap();
        let again = project(&record_from_values(once.as_slice().unwrap()), schema).unwrap();
        prop_assert_eq!(once, again);
    }

    #[test]
    fn prop_probabilities_are_normalized(values in prop::collection::vec(-1.0e6f64..1.0e6, 23)) {
        let result = predict(&record_from_values(&values), shared_artifact()).unwrap();
        let p = result.probability;

        prop_assert!((p.no_default + p.default - 1.0).abs() < 1e-6);
        prop_assert!((0.0..=1.0).contains(&p.default));
        prop_assert_eq!(result.confidence, p.max());
        prop_assert_eq!(result.prediction, u8::from(p.default > p.no_default));
    }

    #[test]
    fn prop_missing_keys_are_reported_exactly(
        drop in prop::collection::btree_set(0usize..23, 1..6)
    ) {
        let mut record = sample_record();
        for &i in &drop {
            record.remove(CANONICAL_FEATURES[i]);
        }

        let expected: Vec<String> = drop.iter().map(|&i| CANONICAL_FEATURES[i].to_string()).collect();
        match predict(&record, shared_artifact()) {
            Err(AppError::MissingFeatures { missing, .. }) => prop_assert_eq!(missing, expected),
            other => prop_assert!(false, "expected MissingFeatures, got {:?}", other),
        }
    }
}
