use crate::config::Config;
use crate::error::{AppError, Result};
use crate::metrics::{ARTIFACT_LOADED, ARTIFACT_STORE_ERRORS_TOTAL};
use crate::ml::artifact::{Artifact, ArtifactStore, FsArtifactStore};
use crate::ml::dataset::Dataset;
use crate::ml::inference;
use crate::ml::models::{
    BatchPrediction, FeatureInfo, ModelMetrics, PredictionRecord, PredictionResult,
    TrainingConfig,
};
use crate::ml::training::{self, CommitGate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns the active artifact and serializes training runs
pub struct ModelService {
    /// Training configuration
    config: TrainingConfig,

    /// Where artifacts are persisted
    store: Arc<dyn ArtifactStore>,

    /// Active artifact, replaced wholesale after a successful training run
    active: Arc<RwLock<Option<Arc<Artifact>>>>,

    /// Held for the duration of a training run, including its blocking work
    training_lock: Arc<Mutex<()>>,

    /// Set while a training run is in flight
    training_in_progress: Arc<AtomicBool>,
}

impl ModelService {
    /// Create a new model service with no active artifact
    pub fn new(config: TrainingConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            store,
            active: Arc::new(RwLock::new(None)),
            training_lock: Arc::new(Mutex::new(())),
            training_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a service backed by the configured artifact file
    pub fn from_config(config: &Config) -> Self {
        let store = Arc::new(FsArtifactStore::new(config.artifact.path.clone()));
        Self::new(config.training.clone(), store)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Activate the stored artifact if one exists.
    ///
    /// Returns whether an artifact was loaded. A missing artifact is not an
    /// error; an unreadable one is.
    pub fn initialize(&self) -> Result<bool> {
        match self.store.load() {
            Ok(artifact) => {
                info!(
                    location = %self.store.location(),
                    features = artifact.schema().len(),
                    "Model artifact loaded"
                );
                self.activate(artifact);
                Ok(true)
            }
            Err(AppError::ArtifactNotFound(path)) => {
                info!(path = %path.display(), "No model artifact found, train a model first");
                Ok(false)
            }
            Err(e) => {
                ARTIFACT_STORE_ERRORS_TOTAL.inc();
                warn!(
                    location = %self.store.location(),
                    error = %e,
                    "Failed to load model artifact"
                );
                Err(e)
            }
        }
    }

    /// Retrain from the configured dataset file
    pub async fn train(&self) -> Result<ModelMetrics> {
        let path = self.config.dataset_path.clone();
        let dataset = tokio::task::spawn_blocking(move || Dataset::from_csv_path(path))
            .await
            .map_err(|e| AppError::Internal(format!("dataset loading task failed: {}", e)))??;
        self.train_from(dataset).await
    }

    /// Retrain from an in-memory dataset.
    ///
    /// At most one run is in flight; later callers wait. The new artifact is
    /// persisted before it becomes active, and a failed run leaves the
    /// previous artifact in place.
    ///
    /// If the caller stops awaiting (for example under
    /// `tokio::time::timeout`), the run is abandoned: it neither persists nor
    /// activates its artifact, so the stored and active artifacts stay the
    /// previous one. A run that already started persisting when abandoned
    /// finishes and activates, leaving both on the new artifact. The training
    /// lock stays held until the blocking work ends.
    pub async fn train_from(&self, dataset: Dataset) -> Result<ModelMetrics> {
        let permit = Arc::clone(&self.training_lock).lock_owned().await;
        let flag = TrainingFlag::raise(Arc::clone(&self.training_in_progress));

        let gate = Arc::new(CommitGate::new());
        let abandon = AbandonOnDrop::arm(Arc::clone(&gate));

        let config = self.config.clone();
        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.active);
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _flag = flag;
            let outcome =
                training::train_and_persist_gated(&dataset, &config, store.as_ref(), &gate)?;
            // Persisted and activated together, even if the caller is gone
            activate(&active, outcome.artifact);
            Ok::<_, AppError>(outcome.metrics)
        })
        .await;
        abandon.disarm();

        joined.map_err(|e| AppError::Internal(format!("training task failed: {}", e)))?
    }

    /// Score one record against the active artifact
    pub fn predict(&self, record: &PredictionRecord) -> Result<PredictionResult> {
        let artifact = self.require_artifact()?;
        inference::predict(record, &artifact)
    }

    /// Score a batch atomically against the active artifact
    pub fn predict_batch(&self, records: &[PredictionRecord]) -> Result<Vec<BatchPrediction>> {
        let artifact = self.require_artifact()?;
        inference::predict_batch(records, &artifact)
    }

    /// Schema features of the active artifact with descriptions
    pub fn features(&self) -> Result<Vec<FeatureInfo>> {
        Ok(self.require_artifact()?.schema().describe())
    }

    /// Snapshot of the service state
    pub fn status(&self) -> ServiceStatus {
        let artifact = self.current_artifact();
        let metadata = artifact.as_ref().and_then(|a| a.metadata().cloned());

        ServiceStatus {
            model_loaded: artifact.is_some(),
            n_features: artifact.as_ref().map_or(0, |a| a.schema().len()),
            n_trees: artifact.as_ref().map_or(0, |a| a.model().n_trees()),
            trained_at: metadata.as_ref().map(|m| m.trained_at),
            heldout_accuracy: metadata.as_ref().map(|m| m.heldout_metrics.accuracy),
            training_in_progress: self.is_training(),
            artifact_location: self.store.location(),
        }
    }

    /// The active artifact, if any
    pub fn current_artifact(&self) -> Option<Arc<Artifact>> {
        self.active.read().clone()
    }

    pub fn is_training(&self) -> bool {
        self.training_in_progress.load(Ordering::SeqCst)
    }

    fn require_artifact(&self) -> Result<Arc<Artifact>> {
        self.current_artifact().ok_or(AppError::ModelNotLoaded)
    }

    fn activate(&self, artifact: Artifact) {
        activate(&self.active, artifact);
    }
}

fn activate(slot: &RwLock<Option<Arc<Artifact>>>, artifact: Artifact) {
    *slot.write() = Some(Arc::new(artifact));
    ARTIFACT_LOADED.set(1.0);
}

/// Abandons a training run if dropped before being disarmed
struct AbandonOnDrop {
    gate: Arc<CommitGate>,
    armed: bool,
}

impl AbandonOnDrop {
    fn arm(gate: Arc<CommitGate>) -> Self {
        Self { gate, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.armed && self.gate.abandon() {
            warn!("Training run abandoned by its caller, its artifact will be discarded");
        }
    }
}

/// Marks a training run as in flight until dropped
struct TrainingFlag(Arc<AtomicBool>);

impl TrainingFlag {
    fn raise(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for TrainingFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Service state for status endpoints and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub model_loaded: bool,
    pub n_features: usize,
    pub n_trees: usize,
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
    pub heldout_accuracy: Option<f64>,
    pub training_in_progress: bool,
    pub artifact_location: String,
}
