//! Read access to the battery telemetry store
//!
//! The estimator only reads: one windowed history query and one
//! latest-row query per cycle. `SqliteStore` reads the on-disk database the
//! ingestion service writes; `MemoryStore` backs tests and dry runs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{parse_timestamp, SqliteStore};

use crate::error::EstimatorResult;
use crate::models::Sample;
use chrono::{DateTime, Utc};

pub use async_trait::async_trait;

/// Trait for telemetry sources
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// All samples with `timestamp >= since`, oldest first
    async fn fetch_window(&self, since: DateTime<Utc>) -> EstimatorResult<Vec<Sample>>;

    /// The most recent sample, if the store has any
    async fn fetch_latest(&self) -> EstimatorResult<Option<Sample>>;
}
