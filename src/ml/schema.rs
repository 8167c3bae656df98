//! Feature schema: the ordered feature list binding training and serving.

use crate::error::{AppError, Result};
use crate::ml::models::FeatureInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Target column of the UCI credit card dataset
pub const LABEL_COLUMN: &str = "default.payment.next.month";

/// Identifier column of the UCI credit card dataset
pub const ID_COLUMN: &str = "ID";

/// The 23 canonical feature names, in dataset order
pub const CANONICAL_FEATURES: [&str; 23] = [
    "LIMIT_BAL",
    "SEX",
    "EDUCATION",
    "MARRIAGE",
    "AGE",
    "PAY_0",
    "PAY_2",
    "PAY_3",
    "PAY_4",
    "PAY_5",
    "PAY_6",
    "BILL_AMT1",
    "BILL_AMT2",
    "BILL_AMT3",
    "BILL_AMT4",
    "BILL_AMT5",
    "BILL_AMT6",
    "PAY_AMT1",
    "PAY_AMT2",
    "PAY_AMT3",
    "PAY_AMT4",
    "PAY_AMT5",
    "PAY_AMT6",
];

const UNKNOWN_DESCRIPTION: &str = "Feature description not available";

/// Ordered, duplicate-free list of feature names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty or duplicated name lists
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(AppError::Schema("feature schema is empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(AppError::Schema(format!("duplicate feature column '{}'", name)));
            }
        }

        Ok(Self { names })
    }

    /// Schema of the canonical UCI dataset
    pub fn canonical() -> Self {
        Self {
            names: CANONICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Schema names for which `present` is false, in schema order
    pub fn missing_from<F>(&self, present: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.iter()
            .filter(|name| !present(name))
            .map(str::to_string)
            .collect()
    }

    /// Feature names paired with their descriptions
    pub fn describe(&self) -> Vec<FeatureInfo> {
        self.iter()
            .map(|name| FeatureInfo {
                name: name.to_string(),
                description: describe_feature(name).to_string(),
            })
            .collect()
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = AppError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        FeatureSchema::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

/// Derive the feature schema from a dataset's columns.
///
/// Identifier and label columns are removed; the remaining columns keep their
/// original order.
pub fn derive_schema<S, T>(
    raw_columns: &[S],
    label_column: &str,
    id_columns: &[T],
) -> Result<FeatureSchema>
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    if !raw_columns.iter().any(|c| c.as_ref() == label_column) {
        return Err(AppError::Schema(format!(
            "label column '{}' not found",
            label_column
        )));
    }

    let names = raw_columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| *c != label_column && !id_columns.iter().any(|id| id.as_ref() == *c))
        .map(str::to_string)
        .collect();

    FeatureSchema::new(names)
}

/// Human readable description of a feature
pub fn describe_feature(name: &str) -> &'static str {
    match name {
        "LIMIT_BAL" => "Credit limit amount",
        "SEX" => "Gender (1=male, 2=female)",
        "EDUCATION" => {
            "Education level (1=graduate school, 2=university, 3=high school, 4=others)"
        }
        "MARRIAGE" => "Marital status (1=married, 2=single, 3=others)",
        "AGE" => "Age in years",
        "PAY_0" => "Repayment status in September",
        "PAY_2" => "Repayment status in August",
        "PAY_3" => "Repayment status in July",
        "PAY_4" => "Repayment status in June",
        "PAY_5" => "Repayment status in May",
        "PAY_6" => "Repayment status in April",
        "BILL_AMT1" => "Bill statement amount in September",
        "BILL_AMT2" => "Bill statement amount in August",
        "BILL_AMT3" => "Bill statement amount in July",
        "BILL_AMT4" => "Bill statement amount in June",
        "BILL_AMT5" => "Bill statement amount in May",
        "BILL_AMT6" => "Bill statement amount in April",
        "PAY_AMT1" => "Previous payment amount in September",
        "PAY_AMT2" => "Previous payment amount in August",
        "PAY_AMT3" => "Previous payment amount in July",
        "PAY_AMT4" => "Previous payment amount in June",
        "PAY_AMT5" => "Previous payment amount in May",
        "PAY_AMT6" => "Previous payment amount in April",
        _ => UNKNOWN_DESCRIPTION,
    }
}
