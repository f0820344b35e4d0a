//! Retrain-and-predict scheduling loop
//!
//! Every tick fetches the history window and the newest sample, rebuilds
//! features, retrains both regime models from scratch and classifies the
//! newest sample. Nothing but the last report survives a cycle.

use super::{segment, FeatureEngineer, LatestStatePredictor, TrendEstimator};
use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, EstimatorResult};
use crate::health::{components, HealthRegistry};
use crate::models::{CycleReport, Sample};
use crate::observability::{EstimatorMetrics, StructuredLogger};
use crate::regression::Regressor;
use crate::store::TelemetryStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the report channel handed out by [`PredictionScheduler::new`]
pub const REPORT_CHANNEL_CAPACITY: usize = 16;

/// Drives the retrain cycle at the configured interval
pub struct PredictionScheduler {
    store: Arc<dyn TelemetryStore>,
    regressor: Arc<dyn Regressor>,
    config: EstimatorConfig,
    report_tx: mpsc::Sender<CycleReport>,
    latest: RwLock<Option<CycleReport>>,
    metrics: EstimatorMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl PredictionScheduler {
    /// Create a scheduler and the receiving end of its report channel
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        regressor: Arc<dyn Regressor>,
        config: EstimatorConfig,
    ) -> (Self, mpsc::Receiver<CycleReport>) {
        let (tx, rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let scheduler = Self {
            store,
            regressor,
            config,
            report_tx: tx,
            latest: RwLock::new(None),
            metrics: EstimatorMetrics::new(),
            logger: StructuredLogger::new("battery"),
            health: HealthRegistry::new(),
        };
        (scheduler, rx)
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Report of the most recent successful cycle
    pub async fn latest_report(&self) -> Option<CycleReport> {
        self.latest.read().await.clone()
    }

    /// Run cycles until shutdown; the first tick fires immediately
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.retrain_interval_secs,
            history_window_days = self.config.history_window_days,
            "Starting prediction scheduler"
        );

        let mut ticker = interval(self.config.retrain_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and counted inside; retry next tick
                    let _ = self.run_cycle(Utc::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down prediction scheduler");
                    break;
                }
            }
        }
    }

    /// Run one full cycle as of `now`
    ///
    /// Errors are reported to health, metrics and logs before being
    /// returned, so callers may drop them.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> EstimatorResult<CycleReport> {
        let start = Instant::now();
        match self.try_cycle(now).await {
            Ok(report) => {
                self.metrics.observe_cycle_latency(start.elapsed().as_secs_f64());
                self.publish(&report).await;
                Ok(report)
            }
            Err(e) => {
                self.metrics.inc_cycles_failed();
                self.logger.log_cycle_failed(&e);
                self.health
                    .set_unhealthy(failed_component(&e), e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    async fn try_cycle(&self, now: DateTime<Utc>) -> EstimatorResult<CycleReport> {
        let since = now - self.config.history_window();
        let window = self.store.fetch_window(since).await?;
        let latest = self.store.fetch_latest().await?;
        self.health.set_healthy(components::STORE).await;
        debug!(window_rows = window.len(), has_latest = latest.is_some(), "Telemetry fetched");

        let config = self.config.clone();
        let regressor = Arc::clone(&self.regressor);
        tokio::task::spawn_blocking(move || {
            evaluate_cycle(&config, regressor.as_ref(), &window, latest.as_ref(), now)
        })
        .await
        .map_err(|e| EstimatorError::Task(e.to_string()))?
    }

    async fn publish(&self, report: &CycleReport) {
        if report.charging.is_trained() || report.discharging.is_trained() {
            self.health.set_healthy(components::TRAINER).await;
        } else {
            self.health
                .set_degraded(components::TRAINER, "No valid data for either regime")
                .await;
        }
        self.health.set_healthy(components::PREDICTOR).await;

        self.metrics.record_report(report);
        self.logger.log_report(report);
        *self.latest.write().await = Some(report.clone());

        if let Err(e) = self.report_tx.try_send(report.clone()) {
            warn!(error = %e, "Dropping cycle report, no consumer keeping up");
        }
    }
}

/// Health component blamed for a failed cycle
fn failed_component(error: &EstimatorError) -> &'static str {
    match error {
        EstimatorError::Sqlite(_)
        | EstimatorError::StoreUnavailable(_)
        | EstimatorError::TimestampParse { .. } => components::STORE,
        EstimatorError::FeatureShapeMismatch { .. } => components::PREDICTOR,
        _ => components::TRAINER,
    }
}

/// The synchronous part of a cycle: engineer, segment, train, predict
///
/// An empty window yields two `NoData` regimes; a missing latest sample
/// yields no prediction. Neither is an error.
pub fn evaluate_cycle(
    config: &EstimatorConfig,
    regressor: &dyn Regressor,
    window: &[Sample],
    latest: Option<&Sample>,
    now: DateTime<Utc>,
) -> EstimatorResult<CycleReport> {
    let featured = FeatureEngineer::from_config(config).engineer(window);
    let history = segment(&featured);

    let estimator = TrendEstimator::new(regressor, config.test_ratio, config.seed);
    let charging = estimator.train(history.charging)?;
    let discharging = estimator.train(history.discharging)?;

    let prediction = latest
        .map(|sample| LatestStatePredictor::from_config(config).predict(sample, &charging, &discharging))
        .transpose()?;

    Ok(CycleReport {
        generated_at: now,
        window_rows: window.len(),
        featured_rows: featured.len(),
        charging: charging.diagnostics,
        discharging: discharging.diagnostics,
        prediction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::models::{PredictionType, RegimeStatus};
    use crate::regression::GradientBoostingRegressor;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Discharging at a steady 0.005 %/s sampled every 2 s
    fn discharging_series(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let soc = 80.0 - i as f64 * 0.01;
                Sample::new(at(i as i64 * 2), 3.7 + soc / 500.0, soc, 31.0, -250.0)
            })
            .collect()
    }

    fn scheduler(store: Arc<dyn TelemetryStore>) -> (PredictionScheduler, mpsc::Receiver<CycleReport>) {
        PredictionScheduler::new(
            store,
            Arc::new(GradientBoostingRegressor::default()),
            EstimatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_store_reports_no_data() {
        let (scheduler, mut rx) = scheduler(Arc::new(MemoryStore::default()));
        let report = scheduler.run_cycle(at(0)).await.unwrap();

        assert_eq!(report.window_rows, 0);
        assert!(report.prediction.is_none());
        assert_eq!(report.charging.status, RegimeStatus::NoData);
        assert_eq!(report.discharging.status, RegimeStatus::NoData);
        assert_eq!(rx.try_recv().unwrap(), report);
    }

    #[tokio::test]
    async fn test_discharging_cycle() {
        let store = Arc::new(MemoryStore::new(discharging_series(400)));
        let (scheduler, _rx) = scheduler(store);
        let report = scheduler.run_cycle(at(800)).await.unwrap();

        assert!(report.discharging.is_trained());
        assert!(!report.charging.is_trained());
        let prediction = report.prediction.expect("latest sample present");
        assert_eq!(prediction.prediction_type, PredictionType::TimeToFullDischarge);
        assert!(prediction.predicted_seconds.unwrap() > 0.0);
        assert_eq!(scheduler.latest_report().await.unwrap().generated_at, at(800));
    }

    #[tokio::test]
    async fn test_history_window_excludes_old_rows() {
        let mut samples = discharging_series(50);
        let stale = Sample::new(at(-30 * 86_400), 3.9, 90.0, 25.0, -250.0);
        samples.insert(0, stale);
        let (scheduler, _rx) = scheduler(Arc::new(MemoryStore::new(samples)));

        let report = scheduler.run_cycle(at(100)).await.unwrap();
        assert_eq!(report.window_rows, 50);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_marks_unhealthy() {
        let store = Arc::new(MemoryStore::new(discharging_series(10)));
        store.set_failing(true);
        let health = HealthRegistry::new();
        let (scheduler, mut rx) = scheduler(store.clone());
        let scheduler = scheduler.with_health(health.clone());

        let err = scheduler.run_cycle(at(20)).await.unwrap_err();
        assert!(matches!(err, EstimatorError::StoreUnavailable(_)));
        assert!(scheduler.latest_report().await.is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(
            health.health().await.components[components::STORE].status,
            ComponentStatus::Unhealthy
        );

        store.set_failing(false);
        scheduler.run_cycle(at(20)).await.unwrap();
        assert_eq!(
            health.health().await.components[components::STORE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        // The loop evaluates as of the wall clock, so shift the series into
        // the last minute
        let offset = Utc::now() - at(60);
        let recent = discharging_series(20)
            .into_iter()
            .map(|mut s| {
                s.timestamp = s.timestamp + offset;
                s
            })
            .collect();
        let (scheduler, mut rx) = scheduler(Arc::new(MemoryStore::new(recent)));
        let scheduler = Arc::new(scheduler);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));
        let first = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("first tick runs immediately")
            .expect("channel open");
        assert_eq!(first.window_rows, 20);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler exits on shutdown")
            .unwrap();
    }

    #[test]
    fn test_failed_component_mapping() {
        assert_eq!(
            failed_component(&EstimatorError::StoreUnavailable("x".into())),
            components::STORE
        );
        assert_eq!(
            failed_component(&EstimatorError::FeatureShapeMismatch {
                expected: 7,
                actual: 6
            }),
            components::PREDICTOR
        );
        assert_eq!(
            failed_component(&EstimatorError::EmptyTrainingSet),
            components::TRAINER
        );
    }
}
