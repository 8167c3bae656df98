//! Prometheus metrics for training runs and prediction traffic.
//!
//! All metrics live in a crate-global registry. Call [`init_metrics`] once at
//! startup to register them and [`gather_metrics`] to render the text
//! exposition format.
//!
//! # Example
//! ```no_run
//! use credit_default_predictor::metrics::{init_metrics, PREDICTIONS_TOTAL};
//!
//! init_metrics().expect("metrics registration");
//! PREDICTIONS_TOTAL.with_label_values(&["default"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::Instant;

const NAMESPACE: &str = "credit_default";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Prediction Metrics
    // ============================================================================

    /// Total number of scored records
    ///
    /// Labels: outcome (default, no_default, error)
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of scored records")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Prediction latency in seconds
    ///
    /// Labels: mode (single, batch)
    pub static ref PREDICTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction latency in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
        &["mode"]
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Records rejected by feature validation
    ///
    /// Labels: reason (missing_features, invalid_value)
    pub static ref PREDICTION_VALIDATION_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "prediction_validation_failures_total",
            "Records rejected by feature validation"
        )
        .namespace(NAMESPACE),
        &["reason"]
    ).expect("Failed to create PREDICTION_VALIDATION_FAILURES_TOTAL metric");

    // ============================================================================
    // Training Metrics
    // ============================================================================

    /// Training runs by result
    ///
    /// Labels: status (success, failure)
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Training runs by result")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    /// Wall-clock duration of training runs in seconds
    pub static ref TRAINING_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "training_duration_seconds",
            "Wall-clock duration of training runs in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0])
    ).expect("Failed to create TRAINING_DURATION_SECONDS metric");

    /// Held-out accuracy of the most recently trained artifact
    pub static ref MODEL_HELDOUT_ACCURACY: Gauge = Gauge::with_opts(
        Opts::new("model_heldout_accuracy", "Held-out accuracy of the latest artifact")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_HELDOUT_ACCURACY metric");

    /// 1 when an artifact is active, 0 otherwise
    pub static ref ARTIFACT_LOADED: Gauge = Gauge::with_opts(
        Opts::new("artifact_loaded", "Whether a model artifact is active")
            .namespace(NAMESPACE)
    ).expect("Failed to create ARTIFACT_LOADED metric");

    /// Artifact store operations that failed
    pub static ref ARTIFACT_STORE_ERRORS_TOTAL: Counter = Counter::with_opts(
        Opts::new("artifact_store_errors_total", "Artifact store operations that failed")
            .namespace(NAMESPACE)
    ).expect("Failed to create ARTIFACT_STORE_ERRORS_TOTAL metric");
}

/// Register every metric with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PREDICTIONS_TOTAL.clone()),
        Box::new(PREDICTION_DURATION_SECONDS.clone()),
        Box::new(PREDICTION_VALIDATION_FAILURES_TOTAL.clone()),
        Box::new(TRAINING_RUNS_TOTAL.clone()),
        Box::new(TRAINING_DURATION_SECONDS.clone()),
        Box::new(MODEL_HELDOUT_ACCURACY.clone()),
        Box::new(ARTIFACT_LOADED.clone()),
        Box::new(ARTIFACT_STORE_ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Record the outcome of one scored record
pub fn record_prediction(prediction: u8) {
    let outcome = if prediction == 1 { "default" } else { "no_default" };
    PREDICTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a rejected prediction request
pub fn record_prediction_error(error: &crate::error::AppError) {
    use crate::error::AppError;

    PREDICTIONS_TOTAL.with_label_values(&["error"]).inc();
    let reason = match error {
        AppError::MissingFeatures { .. } => "missing_features",
        AppError::InvalidFeatureValue { .. } => "invalid_value",
        _ => return,
    };
    PREDICTION_VALIDATION_FAILURES_TOTAL
        .with_label_values(&[reason])
        .inc();
}

/// Times a prediction and observes it on drop
pub struct PredictionTimer {
    mode: &'static str,
    start: Instant,
}

impl PredictionTimer {
    pub fn start(mode: &'static str) -> Self {
        Self {
            mode,
            start: Instant::now(),
        }
    }
}

impl Drop for PredictionTimer {
    fn drop(&mut self) {
        PREDICTION_DURATION_SECONDS
            .with_label_values(&[self.mode])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
