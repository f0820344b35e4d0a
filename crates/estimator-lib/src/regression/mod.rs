//! Pluggable regression backend
//!
//! The predictor only talks to [`Regressor`] and [`FittedModel`], so the
//! boosting implementation can be swapped for any other learner.

mod boosting;
mod metrics;

pub use boosting::{BoostParams, BoostedEnsemble, GradientBoostingRegressor};
pub use metrics::{mean_squared_error, r2_score};

use crate::error::EstimatorResult;
use ndarray::{Array1, Array2};

/// A learner that can be fitted on a feature matrix
pub trait Regressor: Send + Sync {
    /// Fit a fresh model on `x` (rows are samples) against `y`
    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> EstimatorResult<Box<dyn FittedModel>>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// A trained model, valid for the cycle that produced it
pub trait FittedModel: Send + Sync + std::fmt::Debug {
    /// Predict one value per row of `x`
    ///
    /// Fails with `FeatureShapeMismatch` when `x` has a different column
    /// count than the training matrix.
    fn predict(&self, x: &Array2<f64>) -> EstimatorResult<Array1<f64>>;

    /// Number of columns the model was fitted on
    fn n_features(&self) -> usize;
}
