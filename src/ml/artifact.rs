use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, RandomForestClassifier};
use crate::ml::models::ArtifactMetadata;
use crate::ml::scaler::StandardScaler;
use crate::ml::schema::FeatureSchema;
use bincode::Options;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File header identifying a serialized model bundle
const MAGIC: &[u8; 4] = b"CCDP";

/// Bundle layout version following the header
const FORMAT_VERSION: u32 = 1;

/// Fitted scaler, classifier and the feature schema both were fitted on
#[derive(Debug, Clone)]
pub struct Artifact {
    model: RandomForestClassifier,
    scaler: StandardScaler,
    schema: FeatureSchema,
    metadata: Option<ArtifactMetadata>,

    /// Classifier importances keyed by feature name
    importance: BTreeMap<String, f64>,
}

impl Artifact {
    /// Bundle the three parts, rejecting any width disagreement
    pub fn new(
        model: RandomForestClassifier,
        scaler: StandardScaler,
        schema: FeatureSchema,
        metadata: Option<ArtifactMetadata>,
    ) -> Result<Self> {
        let width = schema.len();
        if scaler.n_features() != width || model.n_features() != width {
            return Err(AppError::InconsistentArtifact(format!(
                "schema has {} features, scaler {}, classifier {}",
                width,
                scaler.n_features(),
                model.n_features()
            )));
        }

        let importance = schema
            .iter()
            .map(str::to_string)
            .zip(model.feature_importances().iter().copied())
            .collect();

        Ok(Self {
            model,
            scaler,
            schema,
            metadata,
            importance,
        })
    }

    pub fn model(&self) -> &RandomForestClassifier {
        &self.model
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metadata(&self) -> Option<&ArtifactMetadata> {
        self.metadata.as_ref()
    }

    /// Global feature importance keyed by schema name, summing to 1.0
    pub fn feature_importance(&self) -> &BTreeMap<String, f64> {
        &self.importance
    }

    /// Encode as header plus bincode bundle
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bundle = BundleRef {
            model: Some(&self.model),
            scaler: Some(&self.scaler),
            feature_columns: Some(&self.schema),
            metadata: self.metadata.as_ref(),
        };

        let mut bytes = Vec::with_capacity(64 * 1024);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, &bundle)
            .map_err(|e| AppError::Persistence(format!("failed to encode artifact: {}", e)))?;
        Ok(bytes)
    }

    /// Decode bytes produced by [`Artifact::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = match bytes.strip_prefix(MAGIC.as_slice()) {
            Some(rest) => rest,
            None => {
                return Err(AppError::CorruptArtifact(
                    "missing model bundle header".to_string(),
                ))
            }
        };
        if body.len() < 4 {
            return Err(AppError::CorruptArtifact("truncated header".to_string()));
        }

        let (version, payload) = body.split_at(4);
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version != FORMAT_VERSION {
            return Err(AppError::CorruptArtifact(format!(
                "unsupported format version {}",
                version
            )));
        }

        let bundle: Bundle = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .deserialize(payload)
            .map_err(|e| AppError::CorruptArtifact(format!("undecodable bundle: {}", e)))?;

        let model = bundle
            .model
            .ok_or_else(|| AppError::CorruptArtifact("bundle has no model".to_string()))?;
        let scaler = bundle
            .scaler
            .ok_or_else(|| AppError::CorruptArtifact("bundle has no scaler".to_string()))?;
        let schema = bundle.feature_columns.ok_or_else(|| {
            AppError::CorruptArtifact("bundle has no feature_columns".to_string())
        })?;

        if !model.is_well_formed() {
            return Err(AppError::CorruptArtifact(
                "classifier structure is invalid".to_string(),
            ));
        }
        if !scaler.is_well_formed() {
            return Err(AppError::CorruptArtifact(
                "scaler parameters are invalid".to_string(),
            ));
        }

        Self::new(model, scaler, schema, bundle.metadata)
    }
}

/// Serialized form; parts are optional so an absent part is detectable
#[derive(Serialize)]
struct BundleRef<'a> {
    model: Option<&'a RandomForestClassifier>,
    scaler: Option<&'a StandardScaler>,
    feature_columns: Option<&'a FeatureSchema>,
    metadata: Option<&'a ArtifactMetadata>,
}

#[derive(Deserialize)]
struct Bundle {
    model: Option<RandomForestClassifier>,
    scaler: Option<StandardScaler>,
    feature_columns: Option<FeatureSchema>,
    metadata: Option<ArtifactMetadata>,
}

/// Trait for artifact persistence
pub trait ArtifactStore: Send + Sync {
    /// Persist the artifact, replacing any previous one
    fn save(&self, artifact: &Artifact) -> Result<()>;

    /// Load the stored artifact
    fn load(&self) -> Result<Artifact>;

    /// Check whether an artifact is stored
    fn exists(&self) -> bool;

    /// Human readable location for logs
    fn location(&self) -> String;
}

/// Artifact store backed by a single file
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    path: PathBuf,
}

impl FsArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, bytes: &[u8]) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Same directory as the target so the rename stays on one filesystem
        let mut tmp = tempfile::Builder::new()
            .prefix(".artifact-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, artifact: &Artifact) -> Result<()> {
        let bytes = artifact.to_bytes()?;
        self.write_atomically(&bytes).map_err(|e| {
            AppError::Persistence(format!(
                "failed to write artifact to {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            features = artifact.schema().len(),
            "Artifact saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Artifact> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::ArtifactNotFound(self.path.clone()))
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let artifact = Artifact::from_bytes(&bytes)?;
        debug!(
            path = %self.path.display(),
            trees = artifact.model().n_trees(),
            "Artifact loaded"
        );
        Ok(artifact)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory artifact store holding the encoded bytes
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, artifact: &Artifact) -> Result<()> {
        let bytes = artifact.to_bytes()?;
        *self.bytes.lock() = Some(bytes);
        Ok(())
    }

    fn load(&self) -> Result<Artifact> {
        match self.bytes.lock().as_deref() {
            Some(bytes) => Artifact::from_bytes(bytes),
            None => Err(AppError::ArtifactNotFound(PathBuf::from(self.location()))),
        }
    }

    fn exists(&self) -> bool {
        self.bytes.lock().is_some()
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
