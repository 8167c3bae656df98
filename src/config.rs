use crate::error::{AppError, Result};
use crate::ml::models::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Artifact storage configuration
    #[serde(default)]
    pub artifact: ArtifactConfig,

    /// Training pipeline configuration
    #[serde(default)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the built-in defaults, an optional file and
    /// the environment.
    ///
    /// The file is `path` when given, otherwise `CONFIG_PATH` if set.
    /// Environment variables use the `CREDIT_DEFAULT` prefix with `__` as the
    /// section separator (`CREDIT_DEFAULT__TRAINING__SEED=7`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| std::env::var("CONFIG_PATH").ok());

        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(config_path) = config_path {
            // An explicitly named file must exist
            builder = builder.add_source(config::File::with_name(&config_path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("CREDIT_DEFAULT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.artifact.path.as_os_str().is_empty() {
            return Err(AppError::Configuration(
                "artifact.path must not be empty".to_string(),
            ));
        }
        self.training.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Location of the serialized model bundle
    #[serde(default = "default_artifact_path")]
    pub path: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: default_artifact_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("credit_card_model.bin")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
