//! Core data models for the battery estimator

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// State of charge ceiling in percent
pub const SOC_FULL: f64 = 100.0;

/// Number of model input features
pub const NUM_FEATURES: usize = 7;

/// Column order of the model input; training and inference both go through
/// [`FeatureVector::to_row`] so the order cannot drift between them.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "voltage",
    "soc",
    "temperature",
    "voltage_slope",
    "soc_slope",
    "time_since_state_change",
    "soc_distance_to_full",
];

/// One telemetry reading from the battery monitor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    /// State of charge in percent
    pub soc: f64,
    pub temperature: f64,
    /// Positive while charging, negative while discharging
    pub current: f64,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        voltage: f64,
        soc: f64,
        temperature: f64,
        current: f64,
    ) -> Self {
        Self {
            timestamp,
            voltage,
            soc,
            temperature,
            current,
        }
    }

    /// Copy of the sample with soc capped at 100%
    pub fn clamped(self) -> Self {
        Self {
            soc: if self.soc > SOC_FULL { SOC_FULL } else { self.soc },
            ..self
        }
    }

    pub fn soc_distance_to_full(&self) -> f64 {
        SOC_FULL - self.soc
    }

    pub fn soc_distance_to_zero(&self) -> f64 {
        self.soc
    }
}

/// A sample augmented with derived trend features and regression targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedSample {
    pub sample: Sample,
    /// Seconds since the previous reading, 0 for the first one
    pub time_diff: f64,
    /// Absolute soc change from the previous reading, `None` for the first one
    pub soc_diff: Option<f64>,
    pub voltage_slope: f64,
    pub soc_slope: f64,
    pub current_change_group: u64,
    pub time_since_state_change: f64,
    pub soc_distance_to_full: f64,
    pub soc_distance_to_zero: f64,
    pub time_to_full: Option<f64>,
    pub time_to_zero: Option<f64>,
}

impl FeaturedSample {
    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            voltage: self.sample.voltage,
            soc: self.sample.soc,
            temperature: self.sample.temperature,
            voltage_slope: self.voltage_slope,
            soc_slope: self.soc_slope,
            time_since_state_change: self.time_since_state_change,
            soc_distance_to_full: self.soc_distance_to_full,
        }
    }
}

/// Feature vector for model training and inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub voltage: f64,
    pub soc: f64,
    pub temperature: f64,
    pub voltage_slope: f64,
    pub soc_slope: f64,
    pub time_since_state_change: f64,
    pub soc_distance_to_full: f64,
}

impl FeatureVector {
    pub fn to_row(&self) -> [f64; NUM_FEATURES] {
        [
            self.voltage,
            self.soc,
            self.temperature,
            self.voltage_slope,
            self.soc_slope,
            self.time_since_state_change,
            self.soc_distance_to_full,
        ]
    }

    /// Stack feature vectors into an `n x NUM_FEATURES` matrix
    pub fn matrix<'a, I>(vectors: I) -> Array2<f64>
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let data: Vec<f64> = vectors.into_iter().flat_map(|v| v.to_row()).collect();
        let rows = data.len() / NUM_FEATURES;
        Array2::from_shape_vec((rows, NUM_FEATURES), data)
            .unwrap_or_else(|_| Array2::zeros((0, NUM_FEATURES)))
    }
}

/// Charging or discharging regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Charging,
    Discharging,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Charging => "charging",
            Regime::Discharging => "discharging",
        }
    }

    /// Whether a current reading belongs to this regime
    pub fn matches_current(&self, current: f64) -> bool {
        match self {
            Regime::Charging => current > 0.0,
            Regime::Discharging => current < 0.0,
        }
    }

    /// Regression target for this regime
    pub fn target(&self, row: &FeaturedSample) -> Option<f64> {
        match self {
            Regime::Charging => row.time_to_full,
            Regime::Discharging => row.time_to_zero,
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows of one regime that carry a usable regression target
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub regime: Regime,
    pub rows: Vec<FeaturedSample>,
}

impl TrainingSet {
    pub fn new(regime: Regime, rows: Vec<FeaturedSample>) -> Self {
        Self { regime, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| self.regime.target(r).unwrap_or(f64::NAN))
            .collect()
    }

    /// Mean smoothed soc slope, `None` when empty or not finite
    pub fn mean_soc_slope(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let mean = self.rows.iter().map(|r| r.soc_slope).sum::<f64>() / self.rows.len() as f64;
        mean.is_finite().then_some(mean)
    }
}

/// Outcome classification for the newest sample, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    ChargingComplete,
    TimeToFullCharge,
    TimeToFullDischarge,
    Unavailable,
}

impl PredictionType {
    pub fn label(&self) -> &'static str {
        match self {
            PredictionType::ChargingComplete => "Charging Complete",
            PredictionType::TimeToFullCharge => "Time to Full Charge",
            PredictionType::TimeToFullDischarge => "Time to Full Discharge",
            PredictionType::Unavailable => "No prediction available (insufficient data)",
        }
    }
}

impl std::fmt::Display for PredictionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Prediction for the latest sample, alongside its raw readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub soc: f64,
    pub temperature: f64,
    pub current: f64,
    /// Slope the prediction was made with, after fallbacks
    pub soc_slope: f64,
    pub prediction_type: PredictionType,
    pub predicted_seconds: Option<f64>,
}

/// Training outcome for one regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegimeStatus {
    Trained {
        train_rows: usize,
        test_rows: usize,
        /// Held-out metrics, absent when the evaluation split is empty
        mse: Option<f64>,
        r2: Option<f64>,
    },
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDiagnostics {
    pub regime: Regime,
    #[serde(flatten)]
    pub status: RegimeStatus,
}

impl RegimeDiagnostics {
    pub fn no_data(regime: Regime) -> Self {
        Self {
            regime,
            status: RegimeStatus::NoData,
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.status, RegimeStatus::Trained { .. })
    }
}

/// Everything one retrain cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub generated_at: DateTime<Utc>,
    /// Rows returned by the windowed history query
    pub window_rows: usize,
    /// Rows left after glitch rejection
    pub featured_rows: usize,
    pub charging: RegimeDiagnostics,
    pub discharging: RegimeDiagnostics,
    pub prediction: Option<PredictionRecord>,
}
