use crate::error::{AppError, Result};
use crate::metrics::{MODEL_HELDOUT_ACCURACY, TRAINING_DURATION_SECONDS, TRAINING_RUNS_TOTAL};
use crate::ml::artifact::{Artifact, ArtifactStore};
use crate::ml::classifier::{Classifier, RandomForestClassifier};
use crate::ml::dataset::Dataset;
use crate::ml::models::{ArtifactMetadata, ModelMetrics, TrainingConfig};
use crate::ml::scaler::StandardScaler;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{error, info};

/// Row indices of a train/held-out partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Result of a successful training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: Artifact,

    /// Metrics on the held-out rows
    pub metrics: ModelMetrics,
}

/// Deterministic shuffled partition of `0..n_samples`.
///
/// The held-out part has `ceil(n_samples * test_size)` rows; both parts must
/// end up non-empty.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AppError::Configuration(format!(
            "test_size must be between 0 and 1 (exclusive), got {}",
            test_size
        )));
    }

    let n_test = (n_samples as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(AppError::Dataset(format!(
            "{} rows cannot be split with test_size {}",
            n_samples, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: indices,
    })
}

/// Fit scaler and forest on a labeled dataset and evaluate on held-out rows.
///
/// Nothing is persisted; see [`train_and_persist`].
pub fn train(dataset: &Dataset, config: &TrainingConfig) -> Result<TrainingOutcome> {
    config.validate()?;

    let data = dataset.split_features_labels(&config.label_column, &config.id_columns)?;
    let split = train_test_split(data.n_samples(), config.test_size, config.seed)?;

    let x_train = data.features.select(Axis(0), &split.train);
    let x_test = data.features.select(Axis(0), &split.test);
    let y_train: Vec<u8> = split.train.iter().map(|&i| data.labels[i]).collect();
    let y_test: Vec<u8> = split.test.iter().map(|&i| data.labels[i]).collect();

    info!(
        train_rows = y_train.len(),
        heldout_rows = y_test.len(),
        features = data.schema.len(),
        "Training credit default model"
    );

    // Scaler statistics come from the training rows only
    let scaler = StandardScaler::fit(&x_train)?;
    let x_train = scaler.transform(&x_train)?;
    let x_test = scaler.transform(&x_test)?;

    let params = config.forest_params();
    let model = RandomForestClassifier::fit(&x_train, &y_train, &params)?;

    let predictions = model.predict(&x_test)?;
    let metrics = ModelMetrics::from_predictions(&y_test, &predictions);

    let metadata = ArtifactMetadata {
        trained_at: chrono::Utc::now(),
        n_training_samples: y_train.len(),
        n_heldout_samples: y_test.len(),
        label_column: config.label_column.clone(),
        heldout_metrics: metrics.clone(),
        params,
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let artifact = Artifact::new(model, scaler, data.schema, Some(metadata))?;

    info!(
        accuracy = metrics.accuracy,
        precision = metrics.precision,
        recall = metrics.recall,
        f1 = metrics.f1_score,
        "Held-out evaluation complete"
    );

    Ok(TrainingOutcome { artifact, metrics })
}

const RUNNING: u8 = 0;
const ABANDONED: u8 = 1;
const COMMITTED: u8 = 2;

/// Decides whether a training run may still publish its artifact.
///
/// The run calls [`CommitGate::try_commit`] right before persisting and
/// whoever waits for the run calls [`CommitGate::abandon`] when it gives up.
/// Exactly one of the two succeeds.
#[derive(Debug, Default)]
pub struct CommitGate(AtomicU8);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the run from persisting. Returns false if it already committed.
    pub fn abandon(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claim the right to persist. Returns false if the run was abandoned.
    pub fn try_commit(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, COMMITTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst) == ABANDONED
    }
}

/// Train, then persist through `store`. The store is untouched on failure.
pub fn train_and_persist(
    dataset: &Dataset,
    config: &TrainingConfig,
    store: &dyn ArtifactStore,
) -> Result<TrainingOutcome> {
    train_and_persist_gated(dataset, config, store, &CommitGate::new())
}

/// Like [`train_and_persist`], but a run abandoned through `gate` before it
/// persists fails with a training error and leaves the store untouched.
pub fn train_and_persist_gated(
    dataset: &Dataset,
    config: &TrainingConfig,
    store: &dyn ArtifactStore,
    gate: &CommitGate,
) -> Result<TrainingOutcome> {
    let start = Instant::now();

    let result = train(dataset, config).and_then(|outcome| {
        if !gate.try_commit() {
            return Err(AppError::Training(
                "training run abandoned before its artifact was persisted".to_string(),
            ));
        }
        store.save(&outcome.artifact)?;
        Ok(outcome)
    });

    let elapsed = start.elapsed();
    TRAINING_DURATION_SECONDS.observe(elapsed.as_secs_f64());

    match &result {
        Ok(outcome) => {
            TRAINING_RUNS_TOTAL.with_label_values(&["success"]).inc();
            MODEL_HELDOUT_ACCURACY.set(outcome.metrics.accuracy);
            info!(
                location = %store.location(),
                accuracy = outcome.metrics.accuracy,
                duration_ms = elapsed.as_millis() as u64,
                "✅ Model trained and saved"
            );
        }
        Err(e) => {
            TRAINING_RUNS_TOTAL.with_label_values(&["failure"]).inc();
            error!(error = %e, code = e.error_code(), "Training run failed");
        }
    }

    result
}
