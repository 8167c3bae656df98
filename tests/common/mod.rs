//! Common test utilities for the credit default integration tests
//!
//! Shared fixtures: the reference customer record, small forest
//! configurations and a helper for reading Prometheus output.

#![allow(dead_code)]

use credit_default_predictor::ml::{
    Artifact, Dataset, MaxFeatures, PredictionRecord, TrainingConfig, CANONICAL_FEATURES,
};
use std::collections::HashMap;

/// Reference customer: LIMIT_BAL=20000, SEX/EDUCATION/MARRIAGE=1, AGE=30,
/// no payment delays, 1000 for every bill and payment amount
pub fn sample_record() -> PredictionRecord {
    CANONICAL_FEATURES
        .iter()
        .map(|&name| {
            let value = match name {
                "LIMIT_BAL" => 20000.0,
                "SEX" | "EDUCATION" | "MARRIAGE" => 1.0,
                "AGE" => 30.0,
                n if n.starts_with("PAY_AMT") || n.starts_with("BILL_AMT") => 1000.0,
                _ => 0.0,
            };
            (name, value)
        })
        .collect()
}

/// Record with every canonical feature set from a seed, for variety in batches
pub fn varied_record(seed: usize) -> PredictionRecord {
    let mut record = sample_record();
    record.insert("LIMIT_BAL", 10000.0 * (1 + seed % 50) as f64);
    record.insert("AGE", 21.0 + (seed % 50) as f64);
    record.insert("PAY_0", (seed % 5) as f64 - 1.0);
    record.insert("BILL_AMT1", 500.0 * (seed % 40) as f64);
    record
}

/// Forest small enough for fast tests
pub fn small_training_config(seed: u64) -> TrainingConfig {
    TrainingConfig {
        seed,
        n_estimators: 10,
        max_depth: 6,
        max_features: MaxFeatures::Sqrt,
        ..TrainingConfig::default()
    }
}

/// Train a small artifact on synthetic data
pub fn trained_artifact(rows: usize, seed: u64) -> Artifact {
    let dataset = Dataset::synthetic(rows, seed);
    credit_default_predictor::ml::train(&dataset, &small_training_config(seed))
        .expect("training on synthetic data")
        .artifact
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric name to its HELP/TYPE and sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            if let Some(name) = line.split_whitespace().nth(2) {
                current_metric = name.to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
