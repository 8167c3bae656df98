use crate::error::{AppError, Result};
use crate::ml::schema::{ID_COLUMN, LABEL_COLUMN};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Training pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// CSV file with the labeled historical records
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Binary target column
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Identifier columns excluded from the feature set
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,

    /// Share of rows held out for evaluation (0.0 - 1.0, exclusive)
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the train/test partition and the forest
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of trees
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Maximum tree depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Minimum samples a node needs before it may split
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    /// Candidate features per split
    #[serde(default)]
    pub max_features: MaxFeatures,
}

impl TrainingConfig {
    /// Forest hyperparameters derived from this configuration
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: self.max_features,
            bootstrap: true,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(AppError::Configuration(format!(
                "training.test_size must be between 0 and 1 (exclusive), got {}",
                self.test_size
            )));
        }
        if self.label_column.trim().is_empty() {
            return Err(AppError::Configuration(
                "training.label_column must not be empty".to_string(),
            ));
        }
        self.forest_params().validate()
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            label_column: default_label_column(),
            id_columns: default_id_columns(),
            test_size: default_test_size(),
            seed: default_seed(),
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            max_features: MaxFeatures::default(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("UCI_Credit_Card.csv")
}

fn default_label_column() -> String {
    LABEL_COLUMN.to_string()
}

fn default_id_columns() -> Vec<String> {
    vec![ID_COLUMN.to_string()]
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> usize {
    10
}

fn default_min_samples_split() -> usize {
    2
}

/// Strategy for the number of candidate features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// floor(sqrt(n_features))
    #[default]
    Sqrt,

    /// floor(log2(n_features))
    Log2,

    /// Every feature
    All,

    /// A fixed count, clamped to the feature width
    Fixed(usize),
}

impl MaxFeatures {
    /// Resolve to a concrete count in `1..=n_features`
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features.max(1);
        let k = match self {
            MaxFeatures::Sqrt => (n as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n as f64).log2().floor() as usize,
            MaxFeatures::All => n,
            MaxFeatures::Fixed(k) => *k,
        };
        k.clamp(1, n)
    }
}

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(AppError::Configuration(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(AppError::Configuration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(AppError::Configuration(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.max_features == MaxFeatures::Fixed(0) {
            return Err(AppError::Configuration(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        TrainingConfig::default().forest_params()
    }
}

/// Held-out evaluation metrics for the binary classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Precision for the default class
    pub precision: f64,

    /// Recall for the default class
    pub recall: f64,

    /// F1 score for the default class
    pub f1_score: f64,

    /// Confusion matrix, `[actual][predicted]`
    pub confusion_matrix: [[usize; 2]; 2],

    /// Number of evaluated samples
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: [[0; 2]; 2],
            support: 0,
        }
    }

    /// Compute metrics from true and predicted labels (0 or 1)
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let n_samples = y_true.len().min(y_pred.len());
        if n_samples == 0 {
            return Self::new();
        }

        let mut confusion = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            confusion[(t as usize).min(1)][(p as usize).min(1)] += 1;
        }

        let correct = confusion[0][0] + confusion[1][1];
        let accuracy = correct as f64 / n_samples as f64;

        let tp = confusion[1][1];
        let fp = confusion[0][1];
        let fn_count = confusion[1][0];

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        let recall = if tp + fn_count > 0 {
            tp as f64 / (tp + fn_count) as f64
        } else {
            0.0
        };

        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            confusion_matrix: confusion,
            support: n_samples,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Informational metadata stored alongside an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Rows used to fit the scaler and forest
    pub n_training_samples: usize,

    /// Rows used for evaluation
    pub n_heldout_samples: usize,

    /// Target column the model was trained on
    pub label_column: String,

    /// Held-out evaluation metrics
    pub heldout_metrics: ModelMetrics,

    /// Forest hyperparameters
    pub params: ForestParams,

    /// Version of the crate that produced the artifact
    pub producer_version: String,
}

/// A single customer's feature snapshot, keyed by feature name.
///
/// Values stay as raw JSON so that type problems surface as
/// `InvalidFeatureValue` during projection rather than at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionRecord(Map<String, Value>);

impl PredictionRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Insert or replace a feature value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Remove a feature, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<Map<String, Value>> for PredictionRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for PredictionRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut record = PredictionRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// Typed form of the canonical 23-feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditProfile {
    #[serde(rename = "LIMIT_BAL")]
    pub limit_bal: f64,
    #[serde(rename = "SEX")]
    pub sex: f64,
    #[serde(rename = "EDUCATION")]
    pub education: f64,
    #[serde(rename = "MARRIAGE")]
    pub marriage: f64,
    #[serde(rename = "AGE")]
    pub age: f64,
    /// Repayment status, most recent month first (PAY_0, PAY_2..PAY_6)
    #[serde(rename = "PAY_0")]
    pub pay_0: f64,
    #[serde(rename = "PAY_2")]
    pub pay_2: f64,
    #[serde(rename = "PAY_3")]
    pub pay_3: f64,
    #[serde(rename = "PAY_4")]
    pub pay_4: f64,
    #[serde(rename = "PAY_5")]
    pub pay_5: f64,
    #[serde(rename = "PAY_6")]
    pub pay_6: f64,
    #[serde(rename = "BILL_AMT1")]
    pub bill_amt1: f64,
    #[serde(rename = "BILL_AMT2")]
    pub bill_amt2: f64,
    #[serde(rename = "BILL_AMT3")]
    pub bill_amt3: f64,
    #[serde(rename = "BILL_AMT4")]
    pub bill_amt4: f64,
    #[serde(rename = "BILL_AMT5")]
    pub bill_amt5: f64,
    #[serde(rename = "BILL_AMT6")]
    pub bill_amt6: f64,
    #[serde(rename = "PAY_AMT1")]
    pub pay_amt1: f64,
    #[serde(rename = "PAY_AMT2")]
    pub pay_amt2: f64,
    #[serde(rename = "PAY_AMT3")]
    pub pay_amt3: f64,
    #[serde(rename = "PAY_AMT4")]
    pub pay_amt4: f64,
    #[serde(rename = "PAY_AMT5")]
    pub pay_amt5: f64,
    #[serde(rename = "PAY_AMT6")]
    pub pay_amt6: f64,
}

impl CreditProfile {
    /// Feature values paired with their canonical column names, in canonical order
    pub fn values(&self) -> [(&'static str, f64); 23] {
        [
            ("LIMIT_BAL", self.limit_bal),
            ("SEX", self.sex),
            ("EDUCATION", self.education),
            ("MARRIAGE", self.marriage),
            ("AGE", self.age),
            ("PAY_0", self.pay_0),
            ("PAY_2", self.pay_2),
            ("PAY_3", self.pay_3),
            ("PAY_4", self.pay_4),
            ("PAY_5", self.pay_5),
            ("PAY_6", self.pay_6),
            ("BILL_AMT1", self.bill_amt1),
            ("BILL_AMT2", self.bill_amt2),
            ("BILL_AMT3", self.bill_amt3),
            ("BILL_AMT4", self.bill_amt4),
            ("BILL_AMT5", self.bill_amt5),
            ("BILL_AMT6", self.bill_amt6),
            ("PAY_AMT1", self.pay_amt1),
            ("PAY_AMT2", self.pay_amt2),
            ("PAY_AMT3", self.pay_amt3),
            ("PAY_AMT4", self.pay_amt4),
            ("PAY_AMT5", self.pay_amt5),
            ("PAY_AMT6", self.pay_amt6),
        ]
    }
}

impl From<&CreditProfile> for PredictionRecord {
    fn from(profile: &CreditProfile) -> Self {
        profile.values().into_iter().collect()
    }
}

impl From<CreditProfile> for PredictionRecord {
    fn from(profile: CreditProfile) -> Self {
        PredictionRecord::from(&profile)
    }
}

/// Per-class probability pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub no_default: f64,
    pub default: f64,
}

impl ClassProbabilities {
    /// Highest class probability
    pub fn max(&self) -> f64 {
        self.no_default.max(self.default)
    }
}

/// Outcome of scoring one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 0 = no default, 1 = default
    pub prediction: u8,

    pub probability: ClassProbabilities,

    /// max(probability)
    pub confidence: f64,

    /// Global model-level importance per feature, summing to 1.0
    pub feature_importance: BTreeMap<String, f64>,

    /// Human readable risk label
    pub interpretation: String,
}

impl PredictionResult {
    pub fn is_default(&self) -> bool {
        self.prediction == 1
    }
}

/// Batch result tagged with the record's input position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub record_id: usize,

    #[serde(flatten)]
    pub result: PredictionResult,
}

/// A schema feature with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub description: String,
}
