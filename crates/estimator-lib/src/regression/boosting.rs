//! Gradient-boosted regression trees
//!
//! Second-order boosting on squared error with depth-limited trees grown
//! level by level. Split search is exact and greedy over presorted feature
//! columns; leaf weights carry both L2 (`reg_lambda`) and L1 (`reg_alpha`)
//! penalties. There is no row or column subsampling, so a fit is fully
//! determined by its inputs and parameters.
//!
//! [`BoostParams`] is a linfa [`Fit`] and [`BoostedEnsemble`] a linfa
//! [`PredictInplace`], so the learner also composes with linfa datasets.

use super::{FittedModel, Regressor};
use crate::error::{EstimatorError, EstimatorResult};
use linfa::traits::{Fit, PredictInplace};
use linfa::{Dataset, DatasetBase};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters for [`GradientBoostingRegressor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// L1 penalty on leaf weights
    pub reg_alpha: f64,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 5,
            reg_lambda: 0.5,
            reg_alpha: 0.05,
            min_child_weight: 1.0,
        }
    }
}

impl BoostParams {
    /// L1 soft-thresholding of a gradient sum
    fn threshold(&self, g: f64) -> f64 {
        if g > self.reg_alpha {
            g - self.reg_alpha
        } else if g < -self.reg_alpha {
            g + self.reg_alpha
        } else {
            0.0
        }
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let t = self.threshold(g);
        t * t / (h + self.reg_lambda)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -self.threshold(g) / (h + self.reg_lambda)
    }
}

/// Gradient boosting learner with fixed hyperparameters
///
/// Adapts the linfa-style [`BoostParams`] fit to the [`Regressor`] seam.
#[derive(Debug, Clone, Default)]
pub struct GradientBoostingRegressor {
    params: BoostParams,
}

impl GradientBoostingRegressor {
    pub fn new(params: BoostParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BoostParams {
        &self.params
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> EstimatorResult<Box<dyn FittedModel>> {
        if x.nrows() == 0 {
            return Err(EstimatorError::EmptyTrainingSet);
        }
        if y.len() != x.nrows() {
            return Err(EstimatorError::TargetLengthMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        let dataset = Dataset::new(x.clone(), y.clone());
        let ensemble = self.params.fit(&dataset)?;
        Ok(Box::new(ensemble))
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

impl Fit<Array2<f64>, Array1<f64>, EstimatorError> for BoostParams {
    type Object = BoostedEnsemble;

    fn fit(
        &self,
        dataset: &DatasetBase<Array2<f64>, Array1<f64>>,
    ) -> EstimatorResult<BoostedEnsemble> {
        let x = dataset.records();
        let y = dataset.targets();
        let n = x.nrows();
        if n == 0 {
            return Err(EstimatorError::EmptyTrainingSet);
        }

        // Per-feature row order, NaN rows left out of split search
        let sorted: Vec<Vec<usize>> = (0..x.ncols())
            .map(|f| {
                let mut rows: Vec<usize> = (0..n).filter(|&r| !x[[r, f]].is_nan()).collect();
                rows.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
                rows
            })
            .collect();

        let base_score = y.sum() / n as f64;
        let mut preds = vec![base_score; n];
        let hess = vec![1.0; n];
        let builder = TreeBuilder {
            x,
            sorted: &sorted,
            params: self,
        };

        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let grad: Vec<f64> = preds.iter().zip(y.iter()).map(|(p, t)| p - t).collect();
            let tree = builder.build(&grad, &hess);
            for (row, pred) in preds.iter_mut().enumerate() {
                *pred += tree.predict_row(x.row(row));
            }
            trees.push(tree);
        }

        debug!(
            rows = n,
            features = x.ncols(),
            trees = trees.len(),
            "Fitted boosted ensemble"
        );

        Ok(BoostedEnsemble {
            base_score,
            trees,
            n_features: x.ncols(),
        })
    }
}

/// Fitted ensemble of regression trees
#[derive(Debug, Clone)]
pub struct BoostedEnsemble {
    base_score: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl BoostedEnsemble {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

impl PredictInplace<Array2<f64>, Array1<f64>> for BoostedEnsemble {
    fn predict_inplace<'a>(&'a self, x: &'a Array2<f64>, y: &mut Array1<f64>) {
        for (row, target) in x.rows().into_iter().zip(y.iter_mut()) {
            *target = self.predict_row(row);
        }
    }

    fn default_target(&self, x: &Array2<f64>) -> Array1<f64> {
        Array1::zeros(x.nrows())
    }
}

impl FittedModel for BoostedEnsemble {
    fn predict(&self, x: &Array2<f64>) -> EstimatorResult<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(EstimatorError::FeatureShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        let mut y = self.default_target(x);
        self.predict_inplace(x, &mut y);
        Ok(y)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] < threshold` go left; NaN goes right
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left_g: f64,
    left_h: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    g: f64,
    h: f64,
    last_value: Option<f64>,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    sorted: &'a [Vec<usize>],
    params: &'a BoostParams,
}

impl TreeBuilder<'_> {
    fn build(&self, grad: &[f64], hess: &[f64]) -> RegressionTree {
        let n = grad.len();
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stats = vec![(grad.iter().sum::<f64>(), hess.iter().sum::<f64>())];
        let mut row_node: Vec<Option<usize>> = vec![Some(0); n];
        let mut frontier = vec![0usize];

        for _ in 0..self.params.max_depth {
            if frontier.is_empty() {
                break;
            }
            let best = self.find_splits(&frontier, &row_node, &stats, grad, hess, nodes.len());

            let mut next = Vec::new();
            for (slot, &id) in frontier.iter().enumerate() {
                let Some(c) = best[slot] else { continue };
                let (g_total, h_total) = stats[id];
                let left = nodes.len();
                nodes.push(Node::Leaf { value: 0.0 });
                stats.push((c.left_g, c.left_h));
                let right = nodes.len();
                nodes.push(Node::Leaf { value: 0.0 });
                stats.push((g_total - c.left_g, h_total - c.left_h));
                nodes[id] = Node::Split {
                    feature: c.feature,
                    threshold: c.threshold,
                    left,
                    right,
                };
                next.push(left);
                next.push(right);
            }

            for (row, slot) in row_node.iter_mut().enumerate() {
                let Some(node) = *slot else { continue };
                *slot = match nodes[node] {
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => Some(if self.x[[row, feature]] < threshold {
                        left
                    } else {
                        right
                    }),
                    Node::Leaf { .. } => None,
                };
            }
            frontier = next;
        }

        for (node, &(g, h)) in nodes.iter_mut().zip(&stats) {
            if let Node::Leaf { value } = node {
                *value = self.params.leaf_weight(g, h) * self.params.learning_rate;
            }
        }
        RegressionTree { nodes }
    }

    /// Best split per frontier node, scanning every feature once
    fn find_splits(
        &self,
        frontier: &[usize],
        row_node: &[Option<usize>],
        stats: &[(f64, f64)],
        grad: &[f64],
        hess: &[f64],
        node_count: usize,
    ) -> Vec<Option<SplitCandidate>> {
        let mut slot_of = vec![usize::MAX; node_count];
        for (slot, &id) in frontier.iter().enumerate() {
            slot_of[id] = slot;
        }
        let mut best: Vec<Option<SplitCandidate>> = vec![None; frontier.len()];

        for (feature, order) in self.sorted.iter().enumerate() {
            let mut scan = vec![ScanState::default(); frontier.len()];
            for &row in order {
                let Some(node) = row_node[row] else { continue };
                let slot = slot_of[node];
                if slot == usize::MAX {
                    continue;
                }
                let value = self.x[[row, feature]];
                let state = &mut scan[slot];
                if let Some(prev) = state.last_value {
                    if value > prev {
                        let (g_total, h_total) = stats[node];
                        if let Some(gain) = self.gain(state.g, state.h, g_total, h_total) {
                            if best[slot].map_or(true, |b| gain > b.gain) {
                                best[slot] = Some(SplitCandidate {
                                    feature,
                                    threshold: prev + (value - prev) / 2.0,
                                    gain,
                                    left_g: state.g,
                                    left_h: state.h,
                                });
                            }
                        }
                    }
                }
                state.g += grad[row];
                state.h += hess[row];
                state.last_value = Some(value);
            }
        }
        best
    }

    fn gain(&self, left_g: f64, left_h: f64, g_total: f64, h_total: f64) -> Option<f64> {
        let right_g = g_total - left_g;
        let right_h = h_total - left_h;
        if left_h < self.params.min_child_weight || right_h < self.params.min_child_weight {
            return None;
        }
        let gain = 0.5
            * (self.params.score(left_g, left_h) + self.params.score(right_g, right_h)
                - self.params.score(g_total, h_total));
        (gain > 0.0).then_some(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(r, c)| if c == 0 { r as f64 } else { 1.0 });
        let y = Array1::from_shape_fn(n, |r| 3.0 * r as f64 + 10.0);
        (x, y)
    }

    #[test]
    fn test_fit_tracks_linear_target() {
        let (x, y) = linear_data(200);
        let model = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let r2 = super::super::r2_score(&y, &preds).unwrap();
        assert!(r2 > 0.95, "r2 was {}", r2);
    }

    #[test]
    fn test_linfa_fit_and_predict() {
        let (x, y) = linear_data(100);
        let dataset = Dataset::new(x.clone(), y.clone());
        let ensemble = BoostParams::default().fit(&dataset).unwrap();
        assert_eq!(ensemble.n_trees(), 100);

        let preds: Array1<f64> = linfa::traits::Predict::predict(&ensemble, &x);
        let boxed = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        assert_eq!(preds, boxed.predict(&x).unwrap());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = linear_data(50);
        let reg = GradientBoostingRegressor::default();
        let a = reg.fit(&x, &y).unwrap().predict(&x).unwrap();
        let b = reg.fit(&x, &y).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x = Array2::from_shape_fn((10, 3), |(r, c)| (r * c) as f64);
        let y = Array1::from_elem(10, 42.0);
        let model = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        for p in model.predict(&x).unwrap() {
            assert!((p - 42.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_row_fit() {
        let x = Array2::from_elem((1, 7), 1.0);
        let y = Array1::from_elem(1, 5.0);
        let model = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        let p = model.predict(&x).unwrap()[0];
        assert!((p - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_feature_routes_right() {
        let mut x = Array2::from_shape_fn((20, 1), |(r, _)| r as f64);
        x[[19, 0]] = f64::NAN;
        let y = Array1::from_shape_fn(20, |r| if r < 10 { 0.0 } else { 100.0 });
        let model = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        let probe = Array2::from_shape_vec((2, 1), vec![0.0, f64::NAN]).unwrap();
        let preds = model.predict(&probe).unwrap();
        assert!(preds[0] < preds[1]);
        assert!(preds.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_empty_fit_rejected() {
        let x = Array2::<f64>::zeros((0, 7));
        let y = Array1::<f64>::zeros(0);
        let err = GradientBoostingRegressor::default().fit(&x, &y).unwrap_err();
        assert!(matches!(err, EstimatorError::EmptyTrainingSet));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = linear_data(10);
        let model = GradientBoostingRegressor::default().fit(&x, &y).unwrap();
        let wrong = Array2::<f64>::zeros((1, 3));
        let err = model.predict(&wrong).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::FeatureShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_l1_threshold() {
        let p = BoostParams::default();
        assert_eq!(p.threshold(0.01), 0.0);
        assert!((p.threshold(1.0) - 0.95).abs() < 1e-12);
        assert!((p.threshold(-1.0) + 0.95).abs() < 1e-12);
    }
}
