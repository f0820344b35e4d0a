//! Tunables for the estimation pipeline

use crate::error::{EstimatorError, EstimatorResult};
use crate::regression::BoostParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default retrain interval (5 minutes)
pub const DEFAULT_RETRAIN_INTERVAL_SECS: u64 = 300;

/// Default history window (7 days)
pub const DEFAULT_HISTORY_WINDOW_DAYS: u32 = 7;

/// Largest soc step between consecutive readings accepted as genuine
pub const DEFAULT_GLITCH_THRESHOLD: f64 = 0.05;

pub const DEFAULT_SMOOTHING_WINDOW_SECS: f64 = 300.0;

/// Configuration for one estimator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Seconds between retrain cycles
    pub retrain_interval_secs: u64,
    /// Trailing history used for training
    pub history_window_days: u32,
    /// Absolute soc change above which a reading is rejected
    pub glitch_threshold: f64,
    /// Trailing window for soc slope smoothing
    pub smoothing_window_secs: f64,
    /// Soc at or above which a flat slope means charging is complete
    pub complete_soc_floor: f64,
    /// Slope magnitude below which the battery is considered flat
    pub complete_slope_ceiling: f64,
    /// Reference charge current for the theoretical slope
    pub charge_current_ma: f64,
    /// Reference capacity for the theoretical slope
    pub capacity_mah: f64,
    /// Fraction of each training set held out for evaluation
    pub test_ratio: f64,
    /// Seed for the train/test split
    pub seed: u64,
    pub boost: BoostParams,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            retrain_interval_secs: DEFAULT_RETRAIN_INTERVAL_SECS,
            history_window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            glitch_threshold: DEFAULT_GLITCH_THRESHOLD,
            smoothing_window_secs: DEFAULT_SMOOTHING_WINDOW_SECS,
            complete_soc_floor: 98.0,
            complete_slope_ceiling: 0.001,
            charge_current_ma: 500.0,
            capacity_mah: 2000.0,
            test_ratio: 0.2,
            seed: 42,
            boost: BoostParams::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_secs)
    }

    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.history_window_days))
    }

    /// Soc slope in %/s implied by charging at `charge_current_ma` into
    /// `capacity_mah`; 500 mA into 2000 mAh gives about 0.006944.
    pub fn theoretical_soc_slope(&self) -> f64 {
        (self.charge_current_ma / self.capacity_mah) * (100.0 / 3600.0)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> EstimatorResult<()> {
        if self.retrain_interval_secs == 0 {
            return Err(EstimatorError::InvalidConfig(
                "retrain_interval_secs must be positive".into(),
            ));
        }
        if !(self.capacity_mah > 0.0) {
            return Err(EstimatorError::InvalidConfig(
                "capacity_mah must be positive".into(),
            ));
        }
        if !(self.charge_current_ma > 0.0) {
            return Err(EstimatorError::InvalidConfig(
                "charge_current_ma must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.test_ratio) {
            return Err(EstimatorError::InvalidConfig(format!(
                "test_ratio must be in [0, 1), got {}",
                self.test_ratio
            )));
        }
        if !(self.glitch_threshold >= 0.0) {
            return Err(EstimatorError::InvalidConfig(
                "glitch_threshold must be non-negative".into(),
            ));
        }
        if !(self.smoothing_window_secs > 0.0) {
            return Err(EstimatorError::InvalidConfig(
                "smoothing_window_secs must be positive".into(),
            ));
        }
        if !(self.boost.learning_rate > 0.0) || self.boost.reg_lambda < 0.0 {
            return Err(EstimatorError::InvalidConfig(
                "learning_rate must be positive and reg_lambda non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_theoretical_slope() {
        let config = EstimatorConfig::default();
        assert!((config.theoretical_soc_slope() - 0.006944).abs() < 1e-6);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(EstimatorConfig::default().validate().is_ok());
        assert_eq!(
            EstimatorConfig::default().retrain_interval(),
            Duration::from_secs(300)
        );
        assert_eq!(
            EstimatorConfig::default().history_window(),
            chrono::Duration::days(7)
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = EstimatorConfig {
            capacity_mah: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EstimatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_test_ratio_bounds() {
        let config = EstimatorConfig {
            test_ratio: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: EstimatorConfig =
            serde_json::from_str(r#"{"seed": 7, "boost": {"max_depth": 3}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.boost.max_depth, 3);
        assert_eq!(config.boost.n_estimators, 100);
        assert_eq!(config.glitch_threshold, DEFAULT_GLITCH_THRESHOLD);
    }
}
