//! CART decision tree on Gini impurity, the building block of the forest.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Tree node, stored in a flat arena; children are arena indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Class distribution of the training samples that reached the leaf
    Leaf { proba: [f64; 2] },

    /// Samples with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,

    /// Non-constant candidate features examined per split
    pub max_features: usize,
}

/// Binary decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
}

/// Candidate split found while scanning a node
struct SplitCandidate {
    feature: usize,
    threshold: f64,

    /// n_left * gini_left + n_right * gini_right
    weighted_impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows named by `samples` (duplicates allowed).
    ///
    /// Returns the tree and its raw impurity decrease per feature, each split
    /// weighted by the share of samples reaching it.
    pub fn fit(
        x: &Array2<f64>,
        y: &[u8],
        samples: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> (Self, Vec<f64>) {
        let n_features = x.ncols();
        let mut builder = TreeBuilder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
            n_total: samples.len().max(1) as f64,
            feature_order: (0..n_features).collect(),
        };

        let mut indices = samples.to_vec();
        builder.grow(&mut indices, 0);

        let tree = DecisionTree {
            nodes: builder.nodes,
            n_features,
        };
        (tree, builder.importances)
    }

    /// Class probabilities for one row
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { proba }) => return *proba,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return [0.5, 0.5],
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Every split references a feature below `n_features` and children that
    /// come after it in the arena.
    ///
    /// Nodes are stored in pre-order, so forward-only child links rule out
    /// cycles and guarantee every walk from the root ends at a leaf.
    pub fn is_well_formed(&self) -> bool {
        let n_nodes = self.nodes.len();
        n_nodes > 0
            && self.nodes.iter().enumerate().all(|(idx, node)| match node {
                Node::Leaf { proba } => proba.iter().all(|p| p.is_finite()),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < self.n_features
                        && threshold.is_finite()
                        && (idx + 1..n_nodes).contains(left)
                        && (idx + 1..n_nodes).contains(right)
                }
            })
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [u8],
    params: TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    n_total: f64,
    feature_order: Vec<usize>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let counts = self.class_counts(indices);
        let n = indices.len();
        let node_idx = self.nodes.len();
        self.nodes.push(leaf(counts));

        let pure = counts[0] == 0 || counts[1] == 0;
        if depth >= self.params.max_depth || n < self.params.min_samples_split || pure {
            return node_idx;
        }

        let Some(split) = self.best_split(indices) else {
            return node_idx;
        };

        let mid = partition(indices, |i| self.x[[i, split.feature]] <= split.threshold);
        if mid == 0 || mid == n {
            return node_idx;
        }

        let decrease = n as f64 * gini(counts) - split.weighted_impurity;
        self.importances[split.feature] += decrease.max(0.0) / self.n_total;

        let (left_rows, right_rows) = indices.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);

        self.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    /// Best Gini split over a random subset of features.
    ///
    /// Features are visited in shuffled order until `max_features` of them
    /// have shown more than one distinct value.
    fn best_split(&mut self, indices: &[usize]) -> Option<SplitCandidate> {
        self.feature_order.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        let mut examined = 0;
        let mut column: Vec<(f64, u8)> = Vec::with_capacity(indices.len());

        for &feature in &self.feature_order {
            if examined >= self.params.max_features {
                break;
            }

            column.clear();
            column.extend(indices.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (first, last) = match (column.first(), column.last()) {
                (Some(first), Some(last)) => (first.0, last.0),
                _ => continue,
            };
            if first == last {
                continue;
            }
            examined += 1;

            let total = class_counts_of(&column);
            let mut left = [0usize; 2];
            for pos in 0..column.len() - 1 {
                left[column[pos].1.min(1) as usize] += 1;

                let current = column[pos].0;
                let next = column[pos + 1].0;
                if current == next {
                    continue;
                }

                let right = [total[0] - left[0], total[1] - left[1]];
                let n_left = (pos + 1) as f64;
                let n_right = (column.len() - pos - 1) as f64;
                let weighted = n_left * gini(left) + n_right * gini(right);

                if best
                    .as_ref()
                    .map_or(true, |b| weighted < b.weighted_impurity)
                {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        weighted_impurity: weighted,
                    });
                }
            }
        }

        best
    }

    fn class_counts(&self, indices: &[usize]) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for &i in indices {
            counts[self.y[i].min(1) as usize] += 1;
        }
        counts
    }
}

fn class_counts_of(column: &[(f64, u8)]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &(_, label) in column {
        counts[label.min(1) as usize] += 1;
    }
    counts
}

fn leaf(counts: [usize; 2]) -> Node {
    let n = (counts[0] + counts[1]).max(1) as f64;
    Node::Leaf {
        proba: [counts[0] as f64 / n, counts[1] as f64 / n],
    }
}

fn gini(counts: [usize; 2]) -> f64 {
    let n = (counts[0] + counts[1]) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / n;
    let p1 = counts[1] as f64 / n;
    1.0 - p0 * p0 - p1 * p1
}

/// Move rows matching `goes_left` to the front; returns the boundary
fn partition<F>(indices: &mut [usize], goes_left: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut mid = 0;
    for pos in 0..indices.len() {
        if goes_left(indices[pos]) {
            indices.swap(pos, mid);
            mid += 1;
        }
    }
    mid
}
