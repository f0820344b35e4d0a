//! Battery agent
//!
//! Retrains the charging and discharging models on a fixed interval against
//! the telemetry database and serves health, metrics and the latest
//! prediction over HTTP.

use anyhow::{Context, Result};
use battery_agent::{api, config};
use estimator_lib::{
    health::HealthRegistry,
    observability::{EstimatorMetrics, StructuredLogger},
    predictor::format_hours_minutes,
    GradientBoostingRegressor, PredictionScheduler, SqliteStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::AgentConfig::load().context("loading configuration")?;
    info!(
        device = %config.device_name,
        db_path = %config.db_path.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = EstimatorMetrics::new();
    let logger = StructuredLogger::new(&config.device_name);
    logger.log_startup(
        AGENT_VERSION,
        &config.db_path.display().to_string(),
        config.estimator.retrain_interval_secs,
    );

    let store = Arc::new(SqliteStore::new(&config.db_path));
    let regressor = Arc::new(GradientBoostingRegressor::new(config.estimator.boost.clone()));
    let (scheduler, mut reports) = PredictionScheduler::new(store, regressor, config.estimator.clone());
    let scheduler = Arc::new(
        scheduler
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_tx.subscribe()));

    // Reports are already logged per event; keep a compact summary line too
    let report_handle = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            if let Some(p) = &report.prediction {
                info!(
                    prediction_type = %p.prediction_type,
                    predicted = %format_hours_minutes(p.predicted_seconds),
                    soc = p.soc,
                    "Cycle complete"
                );
            }
        }
    });

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        Arc::clone(&scheduler),
    ));
    health_registry.set_ready(true).await;
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    scheduler_handle.await?;
    api_handle.abort();
    report_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
