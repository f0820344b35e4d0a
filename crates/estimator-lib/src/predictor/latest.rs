//! Prediction for the newest sample
//!
//! A single reading has no history of its own, so slope-type features are
//! filled with defaults and the soc slope falls back to the regime's mean
//! training slope, or to a theoretical rate when there is none.

use super::trainer::TrainedRegime;
use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, EstimatorResult};
use crate::models::{FeatureVector, PredictionRecord, PredictionType, Regime, Sample, TrainingSet};
use crate::regression::FittedModel;
use tracing::debug;

/// Routes the newest sample to the right model or terminal state
#[derive(Debug, Clone)]
pub struct LatestStatePredictor {
    complete_soc_floor: f64,
    complete_slope_ceiling: f64,
    theoretical_soc_slope: f64,
}

impl LatestStatePredictor {
    pub fn new(complete_soc_floor: f64, complete_slope_ceiling: f64, theoretical_soc_slope: f64) -> Self {
        Self {
            complete_soc_floor,
            complete_slope_ceiling,
            theoretical_soc_slope,
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(
            config.complete_soc_floor,
            config.complete_slope_ceiling,
            config.theoretical_soc_slope(),
        )
    }

    /// Soc slope to assume for the latest sample
    ///
    /// Charging uses the charging set's mean slope, discharging the
    /// discharging set's; a missing or zero mean falls back to the signed
    /// theoretical slope. Idle readings get 0.
    pub fn fallback_soc_slope(
        &self,
        current: f64,
        charging: &TrainingSet,
        discharging: &TrainingSet,
    ) -> f64 {
        let empirical = |set: &TrainingSet| set.mean_soc_slope().filter(|m| *m != 0.0);
        if Regime::Charging.matches_current(current) {
            empirical(charging).unwrap_or(self.theoretical_soc_slope)
        } else if Regime::Discharging.matches_current(current) {
            empirical(discharging).unwrap_or(-self.theoretical_soc_slope)
        } else {
            0.0
        }
    }

    /// Model input for a single sample; voltage slope and time since the
    /// last state change cannot be derived from one point and are zero
    pub fn latest_features(&self, latest: &Sample, soc_slope: f64) -> FeatureVector {
        FeatureVector {
            voltage: latest.voltage,
            soc: latest.soc,
            temperature: latest.temperature,
            voltage_slope: 0.0,
            soc_slope,
            time_since_state_change: 0.0,
            soc_distance_to_full: latest.soc_distance_to_full(),
        }
    }

    /// Whether the battery is full and no longer gaining charge
    pub fn is_charging_complete(&self, soc: f64, soc_slope: f64) -> bool {
        soc >= self.complete_soc_floor && soc_slope.abs() < self.complete_slope_ceiling
    }

    /// Classify and predict, in priority order: complete, charging,
    /// discharging, unavailable
    pub fn predict(
        &self,
        latest: &Sample,
        charging: &TrainedRegime,
        discharging: &TrainedRegime,
    ) -> EstimatorResult<PredictionRecord> {
        let latest = latest.clamped();
        let soc_slope = self.fallback_soc_slope(latest.current, &charging.set, &discharging.set);
        let features = self.latest_features(&latest, soc_slope);

        let (prediction_type, predicted_seconds) = if self.is_charging_complete(latest.soc, soc_slope) {
            (PredictionType::ChargingComplete, Some(0.0))
        } else if let (true, Some(model)) = (
            Regime::Charging.matches_current(latest.current),
            charging.model.as_deref(),
        ) {
            (PredictionType::TimeToFullCharge, run_model(model, &features)?)
        } else if let (true, Some(model)) = (
            Regime::Discharging.matches_current(latest.current),
            discharging.model.as_deref(),
        ) {
            (PredictionType::TimeToFullDischarge, run_model(model, &features)?)
        } else {
            (PredictionType::Unavailable, None)
        };

        debug!(
            prediction_type = ?prediction_type,
            soc = latest.soc,
            soc_slope = soc_slope,
            predicted_seconds = ?predicted_seconds,
            "Latest sample classified"
        );

        Ok(PredictionRecord {
            timestamp: latest.timestamp,
            voltage: latest.voltage,
            soc: latest.soc,
            temperature: latest.temperature,
            current: latest.current,
            soc_slope,
            prediction_type,
            predicted_seconds,
        })
    }
}

fn run_model(model: &dyn FittedModel, features: &FeatureVector) -> EstimatorResult<Option<f64>> {
    let x = FeatureVector::matrix([features]);
    if model.n_features() != x.ncols() {
        return Err(EstimatorError::FeatureShapeMismatch {
            expected: model.n_features(),
            actual: x.ncols(),
        });
    }
    Ok(model.predict(&x)?.first().copied())
}
