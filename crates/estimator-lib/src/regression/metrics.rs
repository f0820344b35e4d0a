//! Evaluation metrics for held-out predictions

use linfa::prelude::SingleTargetRegression;
use ndarray::Array1;

/// Mean squared error, `None` for empty or mismatched inputs
pub fn mean_squared_error(actual: &Array1<f64>, predicted: &Array1<f64>) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    predicted.mean_squared_error(actual).ok()
}

/// Coefficient of determination
///
/// A constant target yields 1.0 for an exact fit and 0.0 otherwise.
pub fn r2_score(actual: &Array1<f64>, predicted: &Array1<f64>) -> Option<f64> {
    let mse = mean_squared_error(actual, predicted)?;
    let mean = actual.mean()?;
    if actual.iter().all(|a| (a - mean).abs() < f64::EPSILON) {
        return Some(if mse < f64::EPSILON { 1.0 } else { 0.0 });
    }
    predicted.r2(actual).ok()
}
