//! Battery time-to-full / time-to-empty estimation
//!
//! This crate provides the core functionality for:
//! - Reading battery telemetry from a SQLite store
//! - Feature engineering and charging/discharging segmentation
//! - Per-regime gradient-boosted trend models
//! - Classifying and predicting the newest sample
//! - Health checks and observability

pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod regression;
pub mod store;

pub use config::EstimatorConfig;
pub use error::{EstimatorError, EstimatorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EstimatorMetrics, StructuredLogger};
pub use predictor::{format_hours_minutes, PredictionScheduler};
pub use regression::{GradientBoostingRegressor, Regressor};
pub use store::{MemoryStore, SqliteStore, TelemetryStore};
