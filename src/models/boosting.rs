//! Gradient-boosted regression trees with squared loss.
//!
//! Each stage fits a depth-limited CART tree to the current residuals of a
//! seeded row subsample, then adds it to the ensemble scaled by the learning
//! rate. Row subsampling draws from a `StdRng` seeded from [`ModelParams`],
//! so two fits on identical data produce bit-identical ensembles.

use super::traits::{ModelFactory, Regressor};
use crate::config::ModelParams;
use crate::error::{PipelineError, Result};
use ndarray::{ArrayView1, ArrayView2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

/// Relative gain a split must exceed; keeps rounding noise from splitting
/// nodes whose targets are all equal.
const MIN_RELATIVE_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree stored as a flat node vector, root at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grows a tree on `rows` of `features` against `targets`. Leaves hold
    /// the mean target of the rows that reach them.
    pub fn fit(
        features: ArrayView2<f64>,
        targets: &[f64],
        rows: Vec<usize>,
        max_depth: usize,
        min_samples_split: usize,
    ) -> Self {
        let mut builder = TreeBuilder {
            features,
            targets,
            max_depth,
            min_samples_split: min_samples_split.max(2),
            nodes: Vec::new(),
        };
        builder.grow(rows, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
}

struct TreeBuilder<'f, 't> {
    features: ArrayView2<'f, f64>,
    targets: &'t [f64],
    max_depth: usize,
    min_samples_split: usize,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_, '_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        let value = rows.iter().map(|&r| self.targets[r]).sum::<f64>() / rows.len() as f64;
        self.nodes.push(Node::Leaf { value });

        if depth >= self.max_depth || rows.len() < self.min_samples_split {
            return index;
        }
        let Some(split) = self.best_split(&rows) else {
            return index;
        };

        let features = self.features;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| features[[r, split.feature]] <= split.threshold);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    /// Exhaustive search over every feature and every boundary between
    /// distinct sorted values, maximizing the reduction in squared error.
    /// Ties keep the first candidate found (lowest feature, lowest threshold).
    fn best_split(&self, rows: &[usize]) -> Option<SplitCandidate> {
        let n = rows.len() as f64;
        let total: f64 = rows.iter().map(|&r| self.targets[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| self.targets[r].powi(2)).sum();
        let parent_score = total * total / n;

        let mut best_gain = MIN_RELATIVE_GAIN * total_sq.max(1.0);
        let mut best = None;
        let mut order = rows.to_vec();

        for feature in 0..self.features.ncols() {
            order.sort_by(|&a, &b| {
                self.features[[a, feature]]
                    .total_cmp(&self.features[[b, feature]])
                    .then(a.cmp(&b))
            });

            let mut left_sum = 0.0;
            for i in 0..order.len() - 1 {
                left_sum += self.targets[order[i]];
                let current = self.features[[order[i], feature]];
                let next = self.features[[order[i + 1], feature]];
                if current == next {
                    continue;
                }

                let n_left = (i + 1) as f64;
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / n_left + right_sum * right_sum / (n - n_left)
                    - parent_score;
                if gain > best_gain {
                    best_gain = gain;
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate { feature, threshold });
                }
            }
        }

        best
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoostedRegressor {
    params: ModelParams,
    initial_prediction: f64,
    trees: Vec<RegressionTree>,
    n_features: Option<usize>,
}

impl GradientBoostedRegressor {
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let boost: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        self.initial_prediction + self.params.learning_rate * boost
    }
}

impl Regressor for GradientBoostedRegressor {
    fn fit(&mut self, features: ArrayView2<f64>, targets: &[f64]) -> Result<()> {
        let n_rows = features.nrows();
        if n_rows == 0 {
            return Err(PipelineError::Model("cannot fit on zero rows".to_string()));
        }
        if n_rows != targets.len() {
            return Err(PipelineError::Model(format!(
                "{} feature rows but {} targets",
                n_rows,
                targets.len()
            )));
        }

        let params = self.params;
        self.initial_prediction = targets.iter().sum::<f64>() / n_rows as f64;
        self.trees.clear();

        let n_inbag = ((params.subsample * n_rows as f64) as usize).clamp(1, n_rows);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut order: Vec<usize> = (0..n_rows).collect();
        let mut fitted = vec![self.initial_prediction; n_rows];

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = targets.iter().zip(&fitted).map(|(y, f)| y - f).collect();

            let sample = if n_inbag < n_rows {
                order.shuffle(&mut rng);
                let mut sample = order[..n_inbag].to_vec();
                sample.sort_unstable();
                sample
            } else {
                order.clone()
            };

            let tree = RegressionTree::fit(
                features,
                &residuals,
                sample,
                params.max_depth,
                params.min_samples_split,
            );
            for (i, value) in fitted.iter_mut().enumerate() {
                *value += params.learning_rate * tree.predict_row(features.row(i));
            }
            self.trees.push(tree);
        }

        self.n_features = Some(features.ncols());

        let train_mse = targets
            .iter()
            .zip(&fitted)
            .map(|(y, f)| (y - f).powi(2))
            .sum::<f64>()
            / n_rows as f64;
        let leaves: usize = self.trees.iter().map(RegressionTree::n_leaves).sum();
        let deepest = self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0);
        debug!(
            rows = n_rows,
            features = features.ncols(),
            trees = self.trees.len(),
            leaves,
            deepest,
            in_bag = n_inbag,
            train_mse,
            "Gradient boosting fit complete"
        );
        Ok(())
    }

    fn predict(&self, features: ArrayView2<f64>) -> Result<Vec<f64>> {
        let expected = self
            .n_features
            .ok_or_else(|| PipelineError::Model("Model not trained".to_string()))?;
        if features.ncols() != expected {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                expected,
                features.ncols()
            )));
        }

        Ok(features.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }
}

impl ModelFactory for GradientBoostedRegressor {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self::ModelType> {
        if params.n_estimators == 0 {
            return Err(PipelineError::InvalidInput("n_estimators must be positive".to_string()));
        }
        if params.max_depth == 0 {
            return Err(PipelineError::InvalidInput("max_depth must be positive".to_string()));
        }
        if !(params.learning_rate > 0.0) {
            return Err(PipelineError::InvalidInput(format!(
                "learning_rate {} must be positive",
                params.learning_rate
            )));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(PipelineError::InvalidInput(format!(
                "subsample {} outside (0, 1]",
                params.subsample
            )));
        }

        Ok(Self {
            params: *params,
            initial_prediction: 0.0,
            trees: Vec::new(),
            n_features: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn step_data() -> (Array2<f64>, Vec<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = (0..40).map(|i| if i < 20 { 10.0 } else { 50.0 }).collect();
        (x, y)
    }

    fn params() -> ModelParams {
        ModelParams {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 0.9,
            min_samples_split: 2,
            seed: 42,
        }
    }

    #[test]
    fn test_tree_finds_step() {
        let (x, y) = step_data();
        let tree = RegressionTree::fit(x.view(), &y, (0..40).collect(), 1, 2);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(array![5.0, 0.0].view()), 10.0);
        assert_eq!(tree.predict_row(array![35.0, 0.0].view()), 50.0);
    }

    #[test]
    fn test_tree_borrows_features_and_targets_separately() {
        let (x, _) = step_data();
        let tree = {
            let residuals: Vec<f64> = (0..40).map(|i| if i < 10 { -1.0 } else { 1.0 }).collect();
            RegressionTree::fit(x.view(), &residuals, (0..40).collect(), 2, 2)
        };
        assert!(tree.depth() <= 2);
        assert_eq!(tree.predict_row(x.row(0)), -1.0);
        assert_eq!(tree.predict_row(x.row(39)), 1.0);
    }

    #[test]
    fn test_tree_on_constant_target_is_single_leaf() {
        let (x, _) = step_data();
        let y = vec![7.0; 40];
        let tree = RegressionTree::fit(x.view(), &y, (0..40).collect(), 4, 2);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(x.row(3)), 7.0);
    }

    #[test]
    fn test_boosting_fits_step_function() {
        let (x, y) = step_data();
        let mut model = GradientBoostedRegressor::create(&params()).unwrap();
        model.fit(x.view(), &y).unwrap();

        let predictions = model.predict(x.view()).unwrap();
        assert_eq!(model.n_trees(), 100);
        assert!((predictions[2] - 10.0).abs() < 1.0);
        assert!((predictions[30] - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_boosting_is_deterministic() {
        let (x, y) = step_data();
        let mut a = GradientBoostedRegressor::create(&params()).unwrap();
        let mut b = GradientBoostedRegressor::create(&params()).unwrap();
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();

        let pa = a.predict(x.view()).unwrap();
        let pb = b.predict(x.view()).unwrap();
        assert!(pa.iter().zip(&pb).all(|(p, q)| p.to_bits() == q.to_bits()));
    }

    #[test]
    fn test_predict_requires_fit_and_matching_width() {
        let (x, y) = step_data();
        let mut model = GradientBoostedRegressor::create(&params()).unwrap();
        assert!(!model.is_fitted());
        assert!(model.predict(x.view()).is_err());

        model.fit(x.view(), &y).unwrap();
        let narrow = Array2::<f64>::zeros((1, 1));
        assert!(matches!(model.predict(narrow.view()), Err(PipelineError::Model(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = ModelParams { subsample: 0.0, ..params() };
        assert!(GradientBoostedRegressor::create(&bad).is_err());
        let bad = ModelParams { n_estimators: 0, ..params() };
        assert!(GradientBoostedRegressor::create(&bad).is_err());
    }
}
