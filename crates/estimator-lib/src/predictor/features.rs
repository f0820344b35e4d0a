//! Feature engineering for the trend models
//!
//! Turns an ordered window of raw samples into per-sample trend features
//! (slopes, time since the current last changed, distance to full/empty)
//! and the raw regression targets. Samples must arrive in non-decreasing
//! timestamp order for the differences to mean anything.

use crate::config::EstimatorConfig;
use crate::models::{FeaturedSample, Sample};
use chrono::{DateTime, Utc};

/// Derives trend features from a window of samples
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    glitch_threshold: f64,
    smoothing_window_secs: f64,
}

/// A clamped sample with its differences against the unfiltered predecessor
struct Staged {
    sample: Sample,
    time_diff: f64,
    soc_diff: Option<f64>,
}

impl FeatureEngineer {
    pub fn new(glitch_threshold: f64, smoothing_window_secs: f64) -> Self {
        Self {
            glitch_threshold,
            smoothing_window_secs,
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(config.glitch_threshold, config.smoothing_window_secs)
    }

    /// Run the full feature pipeline; an empty window yields no rows
    pub fn engineer(&self, samples: &[Sample]) -> Vec<FeaturedSample> {
        let staged = self.reject_glitches(stage(samples));
        if staged.is_empty() {
            return Vec::new();
        }

        // Value differences are taken against the retained predecessor while
        // time_diff still refers to the unfiltered one.
        let mut voltage_slopes = Vec::with_capacity(staged.len());
        let mut soc_slopes = Vec::with_capacity(staged.len());
        for (i, row) in staged.iter().enumerate() {
            if i == 0 {
                voltage_slopes.push(0.0);
                soc_slopes.push(0.0);
                continue;
            }
            let prev = &staged[i - 1].sample;
            voltage_slopes.push(finite_or_zero(
                (row.sample.voltage - prev.voltage) / row.time_diff,
            ));
            soc_slopes.push(finite_or_zero((row.sample.soc - prev.soc) / row.time_diff));
        }

        let timestamps: Vec<DateTime<Utc>> = staged.iter().map(|r| r.sample.timestamp).collect();
        let soc_slopes = self.smooth(&timestamps, &soc_slopes);

        let mut group = 0u64;
        let mut time_since_state_change = 0.0;
        let mut rows = Vec::with_capacity(staged.len());

        for (i, row) in staged.iter().enumerate() {
            let sample = row.sample;
            // Exact comparison on the raw reading; NaN always opens a new group
            if i == 0 || sample.current != staged[i - 1].sample.current {
                group += 1;
                time_since_state_change = 0.0;
            }
            time_since_state_change += row.time_diff;

            let soc_slope = soc_slopes[i];
            let soc_distance_to_full = sample.soc_distance_to_full();
            let soc_distance_to_zero = sample.soc_distance_to_zero();
            let has_trend = soc_slope != 0.0;

            rows.push(FeaturedSample {
                sample,
                time_diff: row.time_diff,
                soc_diff: row.soc_diff,
                voltage_slope: voltage_slopes[i],
                soc_slope,
                current_change_group: group,
                time_since_state_change,
                soc_distance_to_full,
                soc_distance_to_zero,
                time_to_full: (sample.current > 0.0 && has_trend)
                    .then(|| soc_distance_to_full / soc_slope),
                time_to_zero: (sample.current < 0.0 && has_trend)
                    .then(|| soc_distance_to_zero / soc_slope.abs()),
            });
        }
        rows
    }

    /// Drop rows whose soc jumped by more than the glitch threshold
    fn reject_glitches(&self, mut staged: Vec<Staged>) -> Vec<Staged> {
        let threshold = self.glitch_threshold;
        staged.retain(|r| !matches!(r.soc_diff, Some(d) if d > threshold));
        staged
    }

    /// Trailing mean over the rows within the smoothing window of each row,
    /// always including the row itself
    ///
    /// Each mean is summed afresh from its window so a window of zeros is
    /// exactly zero.
    fn smooth(&self, timestamps: &[DateTime<Utc>], values: &[f64]) -> Vec<f64> {
        let mut smoothed = Vec::with_capacity(values.len());
        let mut start = 0;
        for i in 0..values.len() {
            while start < i
                && seconds_between(timestamps[start], timestamps[i]) >= self.smoothing_window_secs
            {
                start += 1;
            }
            let window = &values[start..=i];
            smoothed.push(window.iter().sum::<f64>() / window.len() as f64);
        }
        smoothed
    }
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}

fn stage(samples: &[Sample]) -> Vec<Staged> {
    let mut staged: Vec<Staged> = Vec::with_capacity(samples.len());
    let mut prev: Option<Sample> = None;
    for raw in samples {
        let sample = raw.clamped();
        let (time_diff, soc_diff) = match prev {
            None => (0.0, None),
            Some(p) => (
                seconds_between(p.timestamp, sample.timestamp),
                Some((sample.soc - p.soc).abs()),
            ),
        };
        staged.push(Staged {
            sample,
            time_diff,
            soc_diff,
        });
        prev = Some(sample);
    }
    staged
}

/// Signed seconds from `from` to `to`
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 / 1000.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
