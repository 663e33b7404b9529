//! Random forest regressor
//!
//! Bagged CART regression trees over the four sensor features. Importances are
//! the impurity (squared error) decrease per feature, normalised per tree and
//! averaged across the ensemble.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::types::FEATURE_COUNT;

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    child_sse: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn sum_stats(y: &[f64], idx: &[usize]) -> (f64, f64) {
    idx.iter().fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]))
}

fn sse(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (sum_sq - sum * sum / n as f64).max(0.0)
}

impl RegressionTree {
    /// Grow one tree on `sample` (row indices, repeats allowed). Adds each
    /// split's squared-error decrease to `importances`.
    fn grow(
        x: &[[f64; FEATURE_COUNT]],
        y: &[f64],
        sample: Vec<usize>,
        params: &ForestParams,
        importances: &mut [f64; FEATURE_COUNT],
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = vec![(0usize, sample, 0usize)];

        while let Some((slot, idx, depth)) = pending.pop() {
            let n = idx.len();
            let mean = if n == 0 { 0.0 } else { idx.iter().map(|&i| y[i]).sum::<f64>() / n as f64 };
            let parent_sse: f64 = idx.iter().map(|&i| (y[i] - mean).powi(2)).sum();

            let depth_exhausted = params.max_depth.is_some_and(|max| depth >= max);
            let split = if n < params.min_samples_split.max(2) || depth_exhausted || parent_sse <= 1e-12 {
                None
            } else {
                Self::best_split(x, y, &idx, params.min_samples_leaf.max(1))
            };

            match split {
                Some(best) if best.child_sse < parent_sse => {
                    importances[best.feature] += parent_sse - best.child_sse;
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes[slot] = Node::Split {
                        feature: best.feature,
                        threshold: best.threshold,
                        left,
                        right,
                    };
                    pending.push((left, best.left, depth + 1));
                    pending.push((right, best.right, depth + 1));
                }
                _ => nodes[slot] = Node::Leaf { value: mean },
            }
        }

        Self { nodes }
    }

    fn best_split(
        x: &[[f64; FEATURE_COUNT]],
        y: &[f64],
        idx: &[usize],
        min_leaf: usize,
    ) -> Option<BestSplit> {
        let n = idx.len();
        let (total, total_sq) = sum_stats(y, idx);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..FEATURE_COUNT {
            let mut order = idx.to_vec();
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for k in 0..n - 1 {
                let v = y[order[k]];
                left_sum += v;
                left_sq += v * v;

                let here = x[order[k]][feature];
                let next = x[order[k + 1]][feature];
                let n_left = k + 1;
                let n_right = n - n_left;
                if here == next || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let child = sse(left_sum, left_sq, n_left)
                    + sse(total - left_sum, total_sq - left_sq, n_right);
                if best.map_or(true, |(_, _, b)| child < b) {
                    let mid = (here + next) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some((feature, threshold, child));
                }
            }
        }

        best.map(|(feature, threshold, child_sse)| {
            let (left, right) = idx.iter().copied().partition(|&i| x[i][feature] <= threshold);
            BestSplit { feature, threshold, child_sse, left, right }
        })
    }

    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    at = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Trained ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    importances: [f64; FEATURE_COUNT],
}

impl RandomForest {
    pub fn fit(
        x: &[[f64; FEATURE_COUNT]],
        y: &[f64],
        params: &ForestParams,
    ) -> Result<Self, FitError> {
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch { features: x.len(), labels: y.len() });
        }
        if x.is_empty() {
            return Err(FitError::Empty);
        }
        if params.n_estimators == 0 {
            return Err(FitError::Other("n_estimators must be at least 1".to_string()));
        }

        let n = x.len();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = [0.0; FEATURE_COUNT];

        for _ in 0..params.n_estimators {
            let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let mut tree_imp = [0.0; FEATURE_COUNT];
            trees.push(RegressionTree::grow(x, y, sample, params, &mut tree_imp));

            let total: f64 = tree_imp.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(tree_imp) {
                    *acc += v / total;
                }
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self { trees, importances })
    }

    /// Mean of the per-tree predictions
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len().max(1) as f64
    }

    /// Fraction of total impurity decrease attributed to each feature
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        self.importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
