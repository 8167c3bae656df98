use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column means of the training matrix
    mean: Array1<f64>,

    /// Column population standard deviations; zero-variance columns use 1.0
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on a training matrix (n_samples × n_features)
    pub fn fit(features: &Array2<f64>) -> Result<Self> {
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(AppError::Training(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Training(
                "cannot fit scaler on non-finite values".to_string(),
            ));
        }

        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| AppError::Training("empty scaler input".to_string()))?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Structural check run when an artifact is loaded: one finite mean and
    /// one finite positive scale per feature
    pub fn is_well_formed(&self) -> bool {
        self.mean.len() == self.scale.len()
            && self.mean.iter().all(|m| m.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
    }

    /// Standardize a matrix whose width matches the fitted width
    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(features.ncols())?;
        Ok((features - &self.mean) / &self.scale)
    }

    /// Standardize a single row
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok((&row - &self.mean) / &self.scale)
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(AppError::InconsistentArtifact(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }
}
