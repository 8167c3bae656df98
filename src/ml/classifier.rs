use crate::error::{AppError, Result};
use crate::ml::models::ForestParams;
use crate::ml::tree::{DecisionTree, TreeParams};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trait for binary classifiers over a fixed-width feature matrix
pub trait Classifier: Send + Sync {
    /// Number of input features
    fn n_features(&self) -> usize;

    /// Predict class probabilities (n_samples × 2), columns `[no_default, default]`
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict class labels; ties resolve to class 0
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<u8>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .axis_iter(Axis(0))
            .map(|p| if p[1] > p[0] { 1 } else { 0 })
            .collect())
    }

    /// Global importance per feature, non-negative and summing to 1.0
    fn feature_importances(&self) -> &Array1<f64>;
}

/// Bagged ensemble of CART trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    /// Hyperparameters used for fitting
    params: ForestParams,

    /// Fitted trees, in seed order
    trees: Vec<DecisionTree>,

    /// Number of input features
    n_features: usize,

    /// Mean decrease in impurity, normalized
    feature_importances: Array1<f64>,
}

impl RandomForestClassifier {
    /// Fit a forest on `x` (n_samples × n_features) with binary labels `y`.
    ///
    /// Trees are grown in parallel; tree `t` draws its bootstrap sample and
    /// feature subsets from a generator seeded by `(params.seed, t)`, so the
    /// result does not depend on thread scheduling.
    pub fn fit(x: &Array2<f64>, y: &[u8], params: &ForestParams) -> Result<Self> {
        params.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(AppError::Training(
                "cannot fit a forest on an empty matrix".to_string(),
            ));
        }
        if y.len() != n_samples {
            return Err(AppError::Training(format!(
                "{} labels for {} samples",
                y.len(),
                n_samples
            )));
        }
        if let Some(bad) = y.iter().find(|&&label| label > 1) {
            return Err(AppError::Training(format!(
                "labels must be 0 or 1, got {}",
                bad
            )));
        }
        if !(y.contains(&0) && y.contains(&1)) {
            return Err(AppError::Training(
                "training labels contain a single class".to_string(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Training(
                "training matrix contains non-finite values".to_string(),
            ));
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features: params.max_features.resolve(n_features),
        };

        debug!(
            n_estimators = params.n_estimators,
            n_samples,
            n_features,
            max_features = tree_params.max_features,
            "Fitting random forest"
        );

        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, t as u64));
                let samples: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                DecisionTree::fit(x, y, &samples, tree_params, &mut rng)
            })
            .collect();

        let feature_importances = combine_importances(
            fitted.iter().map(|(_, raw)| raw.as_slice()),
            n_features,
        );
        let trees = fitted.into_iter().map(|(tree, _)| tree).collect();

        Ok(Self {
            params: params.clone(),
            trees,
            n_features,
            feature_importances,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean of the per-tree leaf distributions for one row
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> Result<[f64; 2]> {
        if row.len() != self.n_features {
            return Err(AppError::InconsistentArtifact(format!(
                "forest expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(AppError::Internal("forest has no trees".to_string()));
        }

        let mut sum = [0.0; 2];
        for tree in &self.trees {
            let p = tree.predict_proba_row(row);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        Ok([sum[0] / n, sum[1] / n])
    }

    /// Structural check run when an artifact is loaded
    pub fn is_well_formed(&self) -> bool {
        !self.trees.is_empty()
            && self.feature_importances.len() == self.n_features
            && self
                .trees
                .iter()
                .all(|t| t.n_features() == self.n_features && t.is_well_formed())
    }
}

impl Classifier for RandomForestClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let mut proba = Array2::zeros((features.nrows(), 2));
        for (i, row) in features.axis_iter(Axis(0)).enumerate() {
            let p = self.predict_proba_row(row)?;
            proba[[i, 0]] = p[0];
            proba[[i, 1]] = p[1];
        }
        Ok(proba)
    }

    fn feature_importances(&self) -> &Array1<f64> {
        &self.feature_importances
    }
}

/// Normalize each tree's impurity decreases, average them across trees and
/// renormalize. Falls back to a uniform distribution when no tree split.
fn combine_importances<'a, I>(per_tree: I, n_features: usize) -> Array1<f64>
where
    I: Iterator<Item = &'a [f64]>,
{
    let mut total = Array1::<f64>::zeros(n_features);
    let mut n_trees = 0usize;

    for raw in per_tree {
        n_trees += 1;
        let sum: f64 = raw.iter().sum();
        if sum > 0.0 {
            for (acc, v) in total.iter_mut().zip(raw) {
                *acc += v / sum;
            }
        }
    }

    if n_trees > 0 {
        total /= n_trees as f64;
    }

    let sum = total.sum();
    if sum > 0.0 && sum.is_finite() {
        total / sum
    } else {
        Array1::from_elem(n_features, 1.0 / n_features.max(1) as f64)
    }
}

/// SplitMix64 mix of the forest seed and the tree index
fn tree_seed(seed: u64, tree: u64) -> u64 {
    let mut z = seed
        .wrapping_add(tree.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
