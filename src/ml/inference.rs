//! Record validation, projection and scoring against a loaded artifact.

use crate::error::{AppError, Result};
use crate::metrics::{self, PredictionTimer};
use crate::ml::artifact::Artifact;
use crate::ml::models::{BatchPrediction, ClassProbabilities, PredictionRecord, PredictionResult};
use crate::ml::schema::FeatureSchema;
use ndarray::Array1;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

/// Interpretation attached to a default prediction
pub const HIGH_RISK: &str = "High risk of default";

/// Interpretation attached to a no-default prediction
pub const LOW_RISK: &str = "Low risk of default";

/// Largest probability-sum drift tolerated without a warning
const RENORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Check that every schema feature is present; extra keys are ignored
pub fn validate(record: &PredictionRecord, schema: &FeatureSchema) -> Result<()> {
    let missing = schema.missing_from(|name| record.contains_key(name));
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::MissingFeatures {
            missing,
            record_index: None,
        })
    }
}

/// Project a record onto the schema order as a numeric vector
pub fn project(record: &PredictionRecord, schema: &FeatureSchema) -> Result<Array1<f64>> {
    validate(record, schema)?;

    // Every schema name is present once validation passed
    let values = schema
        .iter()
        .filter_map(|name| record.get(name).map(|value| numeric_value(name, value)))
        .collect::<Result<Vec<f64>>>()?;

    Ok(Array1::from(values))
}

/// Numbers and numeric strings are accepted; anything else is rejected
fn numeric_value(name: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::InvalidFeatureValue {
            name: name.to_string(),
            value: value.to_string(),
            record_index: None,
        }),
    }
}

/// Clamp both probabilities to [0, 1] and rescale them to sum to 1.0
pub fn normalize_probabilities(raw: [f64; 2]) -> Result<ClassProbabilities> {
    if raw.iter().any(|p| !p.is_finite()) {
        return Err(AppError::Internal(format!(
            "classifier produced non-finite probabilities {:?}",
            raw
        )));
    }

    let no_default = raw[0].clamp(0.0, 1.0);
    let default = raw[1].clamp(0.0, 1.0);
    let sum = no_default + default;
    if sum <= 0.0 {
        return Err(AppError::Internal(
            "classifier produced an all-zero probability vector".to_string(),
        ));
    }

    if (sum - 1.0).abs() > RENORMALIZATION_TOLERANCE || no_default != raw[0] || default != raw[1] {
        warn!(
            raw_no_default = raw[0],
            raw_default = raw[1],
            "Renormalized classifier probabilities"
        );
    }

    Ok(ClassProbabilities {
        no_default: no_default / sum,
        default: default / sum,
    })
}

/// Human readable risk label for a predicted class
pub fn interpret(prediction: u8) -> &'static str {
    if prediction == 1 {
        HIGH_RISK
    } else {
        LOW_RISK
    }
}

/// Scale and score an already projected row
fn score(row: &Array1<f64>, artifact: &Artifact) -> Result<PredictionResult> {
    let scaled = artifact.scaler().transform_row(row.view())?;
    let raw = artifact.model().predict_proba_row(scaled.view())?;
    let probability = normalize_probabilities(raw)?;

    // Ties resolve to no default
    let prediction = u8::from(probability.default > probability.no_default);

    Ok(PredictionResult {
        prediction,
        probability,
        confidence: probability.max(),
        feature_importance: artifact.feature_importance().clone(),
        interpretation: interpret(prediction).to_string(),
    })
}

/// Validate, project, scale and score one record
pub fn predict(record: &PredictionRecord, artifact: &Artifact) -> Result<PredictionResult> {
    let _timer = PredictionTimer::start("single");

    let result = project(record, artifact.schema()).and_then(|row| score(&row, artifact));

    match &result {
        Ok(prediction) => {
            metrics::record_prediction(prediction.prediction);
            debug!(
                prediction = prediction.prediction,
                p_default = prediction.probability.default,
                confidence = prediction.confidence,
                "Scored record"
            );
        }
        Err(e) => metrics::record_prediction_error(e),
    }

    result
}

/// Score records as one unit.
///
/// Every record is validated and projected before any is scored; the first
/// invalid record fails the whole batch with its index attached. Output order
/// matches input order.
pub fn predict_batch(
    records: &[PredictionRecord],
    artifact: &Artifact,
) -> Result<Vec<BatchPrediction>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let _timer = PredictionTimer::start("batch");

    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| project(record, artifact.schema()).map_err(|e| e.at_record(i)))
        .collect::<Result<Vec<Array1<f64>>>>()
        .map_err(|e| {
            metrics::record_prediction_error(&e);
            e
        })?;

    let results = rows
        .par_iter()
        .enumerate()
        .map(|(record_id, row)| {
            score(row, artifact).map(|result| BatchPrediction { record_id, result })
        })
        .collect::<Result<Vec<_>>>()?;

    for item in &results {
        metrics::record_prediction(item.result.prediction);
    }
    debug!(records = results.len(), "Scored batch");

    Ok(results)
}
