//! End-to-end pipeline tests over synthetic telemetry

use super::*;
use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, EstimatorResult};
use crate::models::{PredictionType, RegimeStatus, Sample, NUM_FEATURES};
use crate::regression::{FittedModel, GradientBoostingRegressor, Regressor};
use crate::store::{SqliteStore, TelemetryStore};
use chrono::{DateTime, TimeZone, Utc};
use ndarray::{Array1, Array2};
use std::sync::Arc;
use tempfile::TempDir;

fn at(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::milliseconds((secs * 1000.0) as i64)
}

/// soc rising linearly 0 -> 100 over 10000 s at +500 mA, sampled every 2 s
fn charging_series() -> Vec<Sample> {
    (0..=5000)
        .map(|i| {
            let t = i as f64 * 2.0;
            let soc = t / 100.0;
            Sample::new(at(t), 3.3 + soc * 0.009, soc, 25.0 + soc * 0.05, 500.0)
        })
        .collect()
}

/// Near-full trickle: soc 97 -> 99 at 0.0005 %/s
fn trickle_series() -> Vec<Sample> {
    (0..=2000)
        .map(|i| {
            let t = i as f64 * 2.0;
            let soc = 97.0 + t * 0.0005;
            Sample::new(at(t), 4.18, soc, 29.0, 100.0)
        })
        .collect()
}

fn evaluate(window: &[Sample], latest: &Sample) -> EstimatorResult<crate::models::CycleReport> {
    let config = EstimatorConfig::default();
    let regressor = GradientBoostingRegressor::new(config.boost.clone());
    evaluate_cycle(&config, &regressor, window, Some(latest), latest.timestamp)
}

#[test]
fn test_charging_series_trains_and_predicts_time_to_full() {
    let series = charging_series();
    let report = evaluate(&series, &series[2500]).unwrap();

    assert_eq!(report.window_rows, series.len());
    assert_eq!(report.featured_rows, series.len());
    assert_eq!(report.discharging.status, RegimeStatus::NoData);
    match report.charging.status {
        RegimeStatus::Trained { r2, test_rows, .. } => {
            assert!(test_rows > 0);
            let r2 = r2.expect("held-out split is non-empty");
            assert!(r2 > 0.9, "r2 was {}", r2);
        }
        RegimeStatus::NoData => panic!("charging model expected"),
    }

    let prediction = report.prediction.unwrap();
    assert_eq!(prediction.prediction_type, PredictionType::TimeToFullCharge);
    assert!(prediction.predicted_seconds.unwrap() > 0.0);
    assert!((prediction.soc_slope - 0.01).abs() < 0.001);
}

#[test]
fn test_fast_charge_near_full_is_not_complete() {
    let series = charging_series();
    // soc 98.5 but still climbing at 0.01 %/s
    let report = evaluate(&series[..=4925], &series[4925]).unwrap();
    assert_eq!(
        report.prediction.unwrap().prediction_type,
        PredictionType::TimeToFullCharge
    );
}

#[test]
fn test_trickle_near_full_switches_to_complete() {
    let series = trickle_series();
    let latest = *series.last().unwrap();
    let report = evaluate(&series, &latest).unwrap();

    let prediction = report.prediction.unwrap();
    assert!(prediction.soc >= 98.0);
    assert!(prediction.soc_slope.abs() < 0.001);
    assert_eq!(prediction.prediction_type, PredictionType::ChargingComplete);
    assert_eq!(prediction.predicted_seconds, Some(0.0));
}

#[test]
fn test_charge_then_discharge_trains_both_regimes() {
    let mut series: Vec<Sample> = charging_series().into_iter().take(1000).collect();
    let top = series.last().unwrap().soc;
    let offset = series.len() as f64 * 2.0;
    series.extend((0..1000).map(|i| {
        let t = offset + i as f64 * 2.0;
        let soc = top - i as f64 * 0.02;
        Sample::new(at(t), 3.3 + soc * 0.009, soc, 27.0, -400.0)
    }));

    let latest = *series.last().unwrap();
    let report = evaluate(&series, &latest).unwrap();
    assert!(report.charging.is_trained());
    assert!(report.discharging.is_trained());
    assert_eq!(
        report.prediction.unwrap().prediction_type,
        PredictionType::TimeToFullDischarge
    );
}

#[test]
fn test_cycle_is_deterministic() {
    let series: Vec<Sample> = charging_series().into_iter().take(800).collect();
    let latest = *series.last().unwrap();
    assert_eq!(evaluate(&series, &latest).unwrap(), evaluate(&series, &latest).unwrap());
}

#[test]
fn test_idle_history_leaves_prediction_unavailable() {
    let series: Vec<Sample> = (0..100)
        .map(|i| Sample::new(at(i as f64 * 2.0), 3.9, 60.0, 25.0, 0.0))
        .collect();
    let latest = *series.last().unwrap();
    let report = evaluate(&series, &latest).unwrap();

    assert_eq!(report.charging.status, RegimeStatus::NoData);
    assert_eq!(report.discharging.status, RegimeStatus::NoData);
    let prediction = report.prediction.unwrap();
    assert_eq!(prediction.prediction_type, PredictionType::Unavailable);
    assert_eq!(prediction.soc_slope, 0.0);
}

/// Regressor whose models claim a different input width than they get
struct SkewedRegressor;

#[derive(Debug)]
struct SkewedModel;

impl FittedModel for SkewedModel {
    fn predict(&self, x: &Array2<f64>) -> EstimatorResult<Array1<f64>> {
        Ok(Array1::zeros(x.nrows()))
    }

    fn n_features(&self) -> usize {
        NUM_FEATURES + 1
    }
}

impl Regressor for SkewedRegressor {
    fn fit(&self, _x: &Array2<f64>, _y: &Array1<f64>) -> EstimatorResult<Box<dyn FittedModel>> {
        Ok(Box::new(SkewedModel))
    }

    fn name(&self) -> &str {
        "skewed"
    }
}

#[test]
fn test_feature_width_mismatch_fails_the_cycle() {
    let series: Vec<Sample> = charging_series().into_iter().take(200).collect();
    let latest = *series.last().unwrap();
    let err = evaluate_cycle(
        &EstimatorConfig::default(),
        &SkewedRegressor,
        &series,
        Some(&latest),
        latest.timestamp,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EstimatorError::FeatureShapeMismatch {
            expected: 8,
            actual: 7
        }
    ));
}

#[tokio::test]
async fn test_scheduler_over_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(dir.path().join("battery_data.db"));
    store.ensure_schema().await.unwrap();
    let series: Vec<Sample> = charging_series().into_iter().take(1500).collect();
    store.insert(&series).await.unwrap();
    assert_eq!(store.fetch_latest().await.unwrap().unwrap().soc, series[1499].soc);

    let (scheduler, _rx) = PredictionScheduler::new(
        Arc::new(store),
        Arc::new(GradientBoostingRegressor::default()),
        EstimatorConfig::default(),
    );
    let report = scheduler.run_cycle(series[1499].timestamp).await.unwrap();

    assert_eq!(report.window_rows, 1500);
    assert!(report.charging.is_trained());
    assert_eq!(
        report.prediction.unwrap().prediction_type,
        PredictionType::TimeToFullCharge
    );
}
