use std::path::PathBuf;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Feature schema could not be derived or is malformed
    #[error("Schema error: {0}")]
    Schema(String),

    /// Training data is missing, empty or malformed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Numeric failure while fitting the scaler or classifier
    #[error("Training error: {0}")]
    Training(String),

    /// Artifact could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No artifact exists at the expected location
    #[error("Artifact not found at {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// Artifact bytes are unreadable or one of its parts is absent
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// Artifact parts disagree on the feature width
    #[error("Inconsistent artifact: {0}")]
    InconsistentArtifact(String),

    /// Prediction input lacks required features
    #[error("Missing features: {}", .missing.join(", "))]
    MissingFeatures {
        missing: Vec<String>,
        record_index: Option<usize>,
    },

    /// Prediction input carries a non-numeric feature value
    #[error("Invalid value for feature {name}: {value}")]
    InvalidFeatureValue {
        name: String,
        value: String,
        record_index: Option<usize>,
    },

    /// No artifact is active
    #[error("Model not loaded. Please train the model first.")]
    ModelNotLoaded,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Schema(_) => "SCHEMA_ERROR",
            AppError::Dataset(_) => "DATASET_ERROR",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            AppError::CorruptArtifact(_) => "CORRUPT_ARTIFACT",
            AppError::InconsistentArtifact(_) => "INCONSISTENT_ARTIFACT",
            AppError::MissingFeatures { .. } => "MISSING_FEATURES",
            AppError::InvalidFeatureValue { .. } => "INVALID_FEATURE_VALUE",
            AppError::ModelNotLoaded => "MODEL_NOT_LOADED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller's input caused the failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingFeatures { .. }
                | AppError::InvalidFeatureValue { .. }
                | AppError::ModelNotLoaded
        )
    }

    /// Tag a record-level validation error with the record's batch position.
    pub fn at_record(self, index: usize) -> Self {
        match self {
            AppError::MissingFeatures { missing, .. } => AppError::MissingFeatures {
                missing,
                record_index: Some(index),
            },
            AppError::InvalidFeatureValue { name, value, .. } => AppError::InvalidFeatureValue {
                name,
                value,
                record_index: Some(index),
            },
            other => other,
        }
    }

    /// Batch position of the offending record, if any
    pub fn record_index(&self) -> Option<usize> {
        match self {
            AppError::MissingFeatures { record_index, .. }
            | AppError::InvalidFeatureValue { record_index, .. } => *record_index,
            _ => None,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from csv::Error
impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Dataset(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
