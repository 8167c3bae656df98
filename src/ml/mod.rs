//! Model lifecycle for credit card default prediction
//!
//! This module provides:
//! - The feature schema binding training and serving
//! - CSV dataset loading and a synthetic dataset generator
//! - Standard scaling and a random forest classifier
//! - Artifact persistence (scaler + classifier + schema as one unit)
//! - The training pipeline and the inference engine
//! - A serving facade that owns the active artifact

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod inference;
pub mod models;
pub mod scaler;
pub mod schema;
pub mod service;
pub mod training;
pub mod tree;

pub use artifact::{Artifact, ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
pub use classifier::{Classifier, RandomForestClassifier};
pub use dataset::{Dataset, LabeledData};
pub use inference::{predict, predict_batch};
pub use models::{
    ArtifactMetadata, BatchPrediction, ClassProbabilities, CreditProfile, FeatureInfo,
    ForestParams, MaxFeatures, ModelMetrics, PredictionRecord, PredictionResult, TrainingConfig,
};
pub use scaler::StandardScaler;
pub use schema::{derive_schema, FeatureSchema, CANONICAL_FEATURES, ID_COLUMN, LABEL_COLUMN};
pub use service::{ModelService, ServiceStatus};
pub use training::{
    train, train_and_persist, train_and_persist_gated, train_test_split, CommitGate,
    TrainingOutcome,
};
