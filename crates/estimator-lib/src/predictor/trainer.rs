//! Per-regime model training and evaluation

use crate::error::EstimatorResult;
use crate::models::{FeatureVector, Regime, RegimeDiagnostics, RegimeStatus, TrainingSet};
use crate::regression::{mean_squared_error, r2_score, FittedModel, Regressor};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// A regime's training set together with whatever was fitted on it
#[derive(Debug)]
pub struct TrainedRegime {
    pub set: TrainingSet,
    pub model: Option<Box<dyn FittedModel>>,
    pub diagnostics: RegimeDiagnostics,
}

impl TrainedRegime {
    pub fn regime(&self) -> Regime {
        self.set.regime
    }

    /// A regime with no data and no model
    pub fn untrained(regime: Regime) -> Self {
        Self {
            set: TrainingSet::new(regime, Vec::new()),
            model: None,
            diagnostics: RegimeDiagnostics::no_data(regime),
        }
    }
}

/// Fits a fresh model per regime on a deterministic train/test split
pub struct TrendEstimator<'a> {
    regressor: &'a dyn Regressor,
    test_ratio: f64,
    seed: u64,
}

impl<'a> TrendEstimator<'a> {
    pub fn new(regressor: &'a dyn Regressor, test_ratio: f64, seed: u64) -> Self {
        Self {
            regressor,
            test_ratio,
            seed,
        }
    }

    /// Fit and evaluate on one training set
    ///
    /// An empty set is not an error: it comes back as `NoData` without a model.
    pub fn train(&self, set: TrainingSet) -> EstimatorResult<TrainedRegime> {
        if set.is_empty() {
            return Ok(TrainedRegime {
                diagnostics: RegimeDiagnostics::no_data(set.regime),
                set,
                model: None,
            });
        }

        let features: Vec<FeatureVector> = set.rows.iter().map(|r| r.features()).collect();
        let targets = set.targets();
        let (train_idx, test_idx) = train_test_split(set.len(), self.test_ratio, self.seed);

        let x_train = FeatureVector::matrix(train_idx.iter().map(|&i| &features[i]));
        let y_train: Array1<f64> = train_idx.iter().map(|&i| targets[i]).collect();
        let model = self.regressor.fit(&x_train, &y_train)?;

        let (mse, r2) = if test_idx.is_empty() {
            (None, None)
        } else {
            let x_test = FeatureVector::matrix(test_idx.iter().map(|&i| &features[i]));
            let y_test: Array1<f64> = test_idx.iter().map(|&i| targets[i]).collect();
            let predicted = model.predict(&x_test)?;
            (
                mean_squared_error(&y_test, &predicted),
                r2_score(&y_test, &predicted),
            )
        };

        debug!(
            regime = %set.regime,
            backend = self.regressor.name(),
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            "Regime model fitted"
        );

        Ok(TrainedRegime {
            diagnostics: RegimeDiagnostics {
                regime: set.regime,
                status: RegimeStatus::Trained {
                    train_rows: train_idx.len(),
                    test_rows: test_idx.len(),
                    mse,
                    r2,
                },
            },
            set,
            model: Some(model),
        })
    }
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * test_ratio)`
/// indices; with fewer than two rows everything goes to training.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    if n < 2 {
        return (indices, Vec::new());
    }
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_ratio).ceil() as usize).min(n - 1);
    let test = indices.split_off(n - n_test);
    (indices, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeaturedSample, Sample};
    use crate::regression::GradientBoostingRegressor;
    use chrono::{TimeZone, Utc};

    fn charging_set(n: usize) -> TrainingSet {
        let rows = (0..n)
            .map(|i| {
                let soc = 10.0 + i as f64 * 0.5;
                FeaturedSample {
                    sample: Sample::new(
                        Utc.timestamp_opt(i as i64 * 10, 0).unwrap(),
                        3.6 + soc / 200.0,
                        soc,
                        25.0,
                        500.0,
                    ),
                    time_diff: 10.0,
                    soc_diff: Some(0.01),
                    voltage_slope: 0.0001,
                    soc_slope: 0.01,
                    current_change_group: 1,
                    time_since_state_change: i as f64 * 10.0,
                    soc_distance_to_full: 100.0 - soc,
                    soc_distance_to_zero: soc,
                    time_to_full: Some((100.0 - soc) / 0.01),
                    time_to_zero: None,
                }
            })
            .collect();
        TrainingSet::new(Regime::Charging, rows)
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = train_test_split(100, 0.2, 42);
        let (train_b, test_b) = train_test_split(100, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 80);
        assert_eq!(test_a.len(), 20);

        let mut all: Vec<usize> = train_a.iter().chain(&test_a).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let (train, test) = train_test_split(11, 0.2, 42);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_split_small_sets() {
        assert_eq!(train_test_split(0, 0.2, 1), (vec![], vec![]));
        assert_eq!(train_test_split(1, 0.2, 1), (vec![0], vec![]));
        let (train, test) = train_test_split(2, 0.2, 1);
        assert_eq!((train.len(), test.len()), (1, 1));
    }

    #[test]
    fn test_empty_set_reports_no_data() {
        let regressor = GradientBoostingRegressor::default();
        let estimator = TrendEstimator::new(&regressor, 0.2, 42);
        let trained = estimator
            .train(TrainingSet::new(Regime::Discharging, vec![]))
            .unwrap();
        assert!(trained.model.is_none());
        assert_eq!(trained.diagnostics.status, RegimeStatus::NoData);
        assert_eq!(trained.regime(), Regime::Discharging);
    }

    #[test]
    fn test_trained_regime_reports_metrics() {
        let regressor = GradientBoostingRegressor::default();
        let estimator = TrendEstimator::new(&regressor, 0.2, 42);
        let trained = estimator.train(charging_set(150)).unwrap();

        assert!(trained.model.is_some());
        match trained.diagnostics.status {
            RegimeStatus::Trained {
                train_rows,
                test_rows,
                mse,
                r2,
            } => {
                assert_eq!(train_rows, 120);
                assert_eq!(test_rows, 30);
                assert!(mse.unwrap() >= 0.0);
                assert!(r2.unwrap() > 0.9, "r2 was {:?}", r2);
            }
            RegimeStatus::NoData => panic!("expected a trained regime"),
        }
    }

    #[test]
    fn test_single_row_trains_without_metrics() {
        let regressor = GradientBoostingRegressor::default();
        let estimator = TrendEstimator::new(&regressor, 0.2, 42);
        let trained = estimator.train(charging_set(1)).unwrap();
        assert!(trained.model.is_some());
        assert!(matches!(
            trained.diagnostics.status,
            RegimeStatus::Trained {
                train_rows: 1,
                test_rows: 0,
                mse: None,
                r2: None
            }
        ));
    }
}
