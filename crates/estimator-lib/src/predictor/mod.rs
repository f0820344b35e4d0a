//! Time-to-full / time-to-empty estimation pipeline
//!
//! Stages run in order every cycle: feature engineering, regime
//! segmentation, per-regime trend estimation and latest-state prediction.
//! [`PredictionScheduler`] drives them on a timer.

mod features;
mod latest;
mod output;
mod scheduler;
mod segment;
mod trainer;

#[cfg(test)]
mod tests;

pub use features::{seconds_between, FeatureEngineer};
pub use latest::LatestStatePredictor;
pub use output::{describe_diagnostics, format_hours_minutes, render_report, NOT_AVAILABLE};
pub use scheduler::{evaluate_cycle, PredictionScheduler, REPORT_CHANNEL_CAPACITY};
pub use segment::{segment, SegmentedHistory};
pub use trainer::{train_test_split, TrainedRegime, TrendEstimator};
