//! One-shot prediction against a local telemetry database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use estimator_lib::{
    store::parse_timestamp, EstimatorConfig, GradientBoostingRegressor, PredictionScheduler,
    SqliteStore,
};
use std::path::Path;
use std::sync::Arc;

use super::report::print_report;
use crate::client::ReportView;
use crate::output::{print_info, print_warning, OutputFormat};

/// Parse the `--at` argument
pub fn parse_at(value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).with_context(|| format!("Invalid --at timestamp {:?}", value))
}

/// Run exactly one retrain cycle against `db` and print the report
pub async fn run_predict(
    db: &Path,
    at: Option<DateTime<Utc>>,
    estimator: EstimatorConfig,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    estimator.validate()?;
    if !db.exists() {
        anyhow::bail!("Telemetry database {} does not exist", db.display());
    }

    let now = at.unwrap_or_else(Utc::now);
    if verbose {
        print_info(&format!(
            "Evaluating {} as of {} over {} day(s) of history",
            db.display(),
            now.to_rfc3339(),
            estimator.history_window_days
        ));
    }

    let regressor = Arc::new(GradientBoostingRegressor::new(estimator.boost.clone()));
    let history_days = estimator.history_window_days;
    let (scheduler, _reports) =
        PredictionScheduler::new(Arc::new(SqliteStore::new(db)), regressor, estimator);
    let report = scheduler
        .run_cycle(now)
        .await
        .context("Prediction cycle failed")?;

    print_report(&ReportView::from(&report), format, verbose)?;
    if report.window_rows == 0 && report.prediction.is_some() {
        if let OutputFormat::Table = format {
            print_warning(&format!(
                "No samples in the last {} day(s) before {}; pass --at to evaluate older data",
                history_days,
                now.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }
    Ok(())
}
