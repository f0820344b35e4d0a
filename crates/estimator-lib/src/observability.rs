//! Observability infrastructure for the battery estimator
//!
//! Provides:
//! - Prometheus metrics (cycle latency, cycle outcomes, per-regime fit quality, latest prediction)
//! - Structured JSON logging with tracing

use crate::models::{CycleReport, PredictionRecord, PredictionType, RegimeDiagnostics, RegimeStatus};
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge_vec, Gauge, GaugeVec, Histogram, IntCounter, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for a full retrain cycle (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

const PREDICTION_TYPES: [PredictionType; 4] = [
    PredictionType::ChargingComplete,
    PredictionType::TimeToFullCharge,
    PredictionType::TimeToFullDischarge,
    PredictionType::Unavailable,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EstimatorMetricsInner> = OnceLock::new();

struct EstimatorMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    training_rows: IntGaugeVec,
    model_mse: GaugeVec,
    model_r2: GaugeVec,
    predicted_seconds: Gauge,
    prediction_type_info: GaugeVec,
}

impl EstimatorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "battery_estimator_cycle_latency_seconds",
                "Time spent on one fetch, train and predict cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "battery_estimator_cycles_completed_total",
                "Retrain cycles that produced a report"
            )
            .expect("Failed to register cycles_completed"),

            cycles_failed: register_int_counter!(
                "battery_estimator_cycles_failed_total",
                "Retrain cycles aborted by a store or model error"
            )
            .expect("Failed to register cycles_failed"),

            training_rows: register_int_gauge_vec!(
                "battery_estimator_training_rows",
                "Rows in the latest training set per regime",
                &["regime"]
            )
            .expect("Failed to register training_rows"),

            model_mse: register_gauge_vec!(
                "battery_estimator_model_mse",
                "Held-out mean squared error of the latest model per regime",
                &["regime"]
            )
            .expect("Failed to register model_mse"),

            model_r2: register_gauge_vec!(
                "battery_estimator_model_r2",
                "Held-out coefficient of determination of the latest model per regime",
                &["regime"]
            )
            .expect("Failed to register model_r2"),

            predicted_seconds: register_gauge!(
                "battery_estimator_predicted_seconds",
                "Predicted seconds until full or empty for the latest sample"
            )
            .expect("Failed to register predicted_seconds"),

            prediction_type_info: register_gauge_vec!(
                "battery_estimator_prediction_type_info",
                "Classification of the latest sample (1 for the active type)",
                &["type"]
            )
            .expect("Failed to register prediction_type_info"),
        }
    }
}

/// Lightweight handle to the process-wide estimator metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct EstimatorMetrics {
    inner: &'static EstimatorMetricsInner,
}

impl Default for EstimatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EstimatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimatorMetrics").finish_non_exhaustive()
    }
}

impl EstimatorMetrics {
    /// Get the metrics handle, registering collectors on first use
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new),
        }
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner.cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_failed(&self) {
        self.inner.cycles_failed.inc();
    }

    /// Publish everything a successful cycle produced
    pub fn record_report(&self, report: &CycleReport) {
        self.inner.cycles_completed.inc();
        for diagnostics in [&report.charging, &report.discharging] {
            self.record_regime(diagnostics);
        }

        let active = report.prediction.as_ref().map(|p| p.prediction_type);
        for kind in PREDICTION_TYPES {
            let value = if Some(kind) == active { 1.0 } else { 0.0 };
            self.inner
                .prediction_type_info
                .with_label_values(&[prediction_type_key(kind)])
                .set(value);
        }
        self.inner.predicted_seconds.set(
            report
                .prediction
                .as_ref()
                .and_then(|p| p.predicted_seconds)
                .unwrap_or(f64::NAN),
        );
    }

    fn record_regime(&self, diagnostics: &RegimeDiagnostics) {
        let label = [diagnostics.regime.as_str()];
        match &diagnostics.status {
            RegimeStatus::Trained {
                train_rows,
                test_rows,
                mse,
                r2,
            } => {
                self.inner
                    .training_rows
                    .with_label_values(&label)
                    .set((train_rows + test_rows) as i64);
                self.inner
                    .model_mse
                    .with_label_values(&label)
                    .set(mse.unwrap_or(f64::NAN));
                self.inner
                    .model_r2
                    .with_label_values(&label)
                    .set(r2.unwrap_or(f64::NAN));
            }
            RegimeStatus::NoData => {
                self.inner.training_rows.with_label_values(&label).set(0);
                self.inner.model_mse.with_label_values(&label).set(f64::NAN);
                self.inner.model_r2.with_label_values(&label).set(f64::NAN);
            }
        }
    }

    #[cfg(test)]
    fn cycles_completed(&self) -> u64 {
        self.inner.cycles_completed.get()
    }
}

fn prediction_type_key(kind: PredictionType) -> &'static str {
    match kind {
        PredictionType::ChargingComplete => "charging_complete",
        PredictionType::TimeToFullCharge => "time_to_full_charge",
        PredictionType::TimeToFullDischarge => "time_to_full_discharge",
        PredictionType::Unavailable => "unavailable",
    }
}

/// Structured logger for estimator events
///
/// Every event carries a stable `event` field so log pipelines can filter
/// on it without parsing messages.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn log_startup(&self, version: &str, db_path: &str, retrain_interval_secs: u64) {
        info!(
            event = "agent_started",
            device = %self.device,
            agent_version = %version,
            db_path = %db_path,
            retrain_interval_secs = retrain_interval_secs,
            "Battery agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            device = %self.device,
            reason = %reason,
            "Battery agent shutting down"
        );
    }

    /// Log a regime's training outcome; a regime without data gets the
    /// explicit "no valid data" notice
    pub fn log_regime(&self, diagnostics: &RegimeDiagnostics) {
        match &diagnostics.status {
            RegimeStatus::Trained {
                train_rows,
                test_rows,
                mse,
                r2,
            } => info!(
                event = "regime_trained",
                device = %self.device,
                regime = %diagnostics.regime,
                train_rows = train_rows,
                test_rows = test_rows,
                mse = ?mse,
                r2 = ?r2,
                "Regime model trained"
            ),
            RegimeStatus::NoData => info!(
                event = "regime_skipped",
                device = %self.device,
                regime = %diagnostics.regime,
                "No valid data for {} prediction",
                diagnostics.regime
            ),
        }
    }

    pub fn log_prediction(&self, record: &PredictionRecord) {
        info!(
            event = "prediction_generated",
            device = %self.device,
            timestamp = %record.timestamp.to_rfc3339(),
            voltage = record.voltage,
            soc = record.soc,
            temperature = record.temperature,
            current = record.current,
            soc_slope = record.soc_slope,
            prediction_type = %record.prediction_type,
            predicted_seconds = ?record.predicted_seconds,
            "Generated battery prediction"
        );
    }

    pub fn log_cycle_failed(&self, error: &dyn std::fmt::Display) {
        warn!(
            event = "cycle_failed",
            device = %self.device,
            error = %error,
            "Retrain cycle failed, retrying next interval"
        );
    }

    /// Log the whole report: both regimes, then the prediction if any
    pub fn log_report(&self, report: &CycleReport) {
        for diagnostics in [&report.charging, &report.discharging] {
            self.log_regime(diagnostics);
        }
        if let Some(record) = &report.prediction {
            self.log_prediction(record);
        }
    }
}
