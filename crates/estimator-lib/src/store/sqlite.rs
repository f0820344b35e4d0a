//! SQLite-backed telemetry store

use super::{async_trait, TelemetryStore};
use crate::error::{EstimatorError, EstimatorResult};
use crate::models::Sample;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, Params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS battery_data (
    timestamp TEXT NOT NULL,
    voltage REAL,
    soc REAL,
    temperature REAL,
    current REAL
)";

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_battery_data_timestamp ON battery_data(timestamp)";

// julianday() accepts both the space- and T-separated forms, so rows written
// by different producers still compare chronologically.
const WINDOW_SQL: &str = "SELECT timestamp, voltage, soc, temperature, current FROM battery_data
    WHERE julianday(timestamp) >= julianday(?1)
    ORDER BY julianday(timestamp) ASC";

const LATEST_SQL: &str = "SELECT timestamp, voltage, soc, temperature, current FROM battery_data
    ORDER BY julianday(timestamp) DESC LIMIT 1";

const INSERT_SQL: &str =
    "INSERT INTO battery_data (timestamp, voltage, soc, temperature, current) VALUES (?1, ?2, ?3, ?4, ?5)";

/// Format used when writing timestamps
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Naive formats accepted on read, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Telemetry store reading the `battery_data` table of a SQLite file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table and index if they are missing
    pub async fn ensure_schema(&self) -> EstimatorResult<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.execute(CREATE_TABLE_SQL, [])?;
            conn.execute(CREATE_INDEX_SQL, [])?;
            info!(path = %path.display(), "Telemetry schema ready");
            Ok(())
        })
        .await
    }

    /// Append samples; only tooling and tests write, the estimator never does
    pub async fn insert(&self, samples: &[Sample]) -> EstimatorResult<usize> {
        let path = self.path.clone();
        let samples = samples.to_vec();
        run_blocking(move || {
            let mut conn = Connection::open(&path)?;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(INSERT_SQL)?;
                for s in &samples {
                    stmt.execute(params![
                        s.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                        s.voltage,
                        s.soc,
                        nan_to_null(s.temperature),
                        s.current,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(samples.len())
        })
        .await
    }
}

#[async_trait]
impl TelemetryStore for SqliteStore {
    async fn fetch_window(&self, since: DateTime<Utc>) -> EstimatorResult<Vec<Sample>> {
        let path = self.path.clone();
        let since = since.format(TIMESTAMP_FORMAT).to_string();
        let samples = run_blocking(move || {
            let conn = open_read_only(&path)?;
            query_samples(&conn, WINDOW_SQL, params![since])
        })
        .await?;
        debug!(rows = samples.len(), "Fetched history window");
        Ok(samples)
    }

    async fn fetch_latest(&self) -> EstimatorResult<Option<Sample>> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open_read_only(&path)?;
            Ok(query_samples(&conn, LATEST_SQL, [])?.into_iter().next())
        })
        .await
    }
}

/// Parse a stored timestamp: RFC 3339, or a naive date-time taken as UTC
pub fn parse_timestamp(value: &str) -> EstimatorResult<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| EstimatorError::TimestampParse {
            value: value.to_string(),
        })
}

/// A missing file is a store failure, not an empty store
fn open_read_only(path: &Path) -> EstimatorResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(Connection::open_with_flags(path, flags)?)
}

fn query_samples<P: Params>(conn: &Connection, sql: &str, params: P) -> EstimatorResult<Vec<Sample>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut samples = Vec::new();
    while let Some(row) = rows.next()? {
        samples.push(Sample::new(
            timestamp_from_value(row.get(0)?)?,
            real_or_nan(row.get(1)?),
            real_or_nan(row.get(2)?),
            real_or_nan(row.get(3)?),
            real_or_nan(row.get(4)?),
        ));
    }
    Ok(samples)
}

fn timestamp_from_value(value: Value) -> EstimatorResult<DateTime<Utc>> {
    let parsed = match &value {
        Value::Text(text) => return parse_timestamp(text),
        Value::Integer(secs) => Utc.timestamp_opt(*secs, 0).single(),
        Value::Real(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            Utc.timestamp_opt(whole as i64, nanos).single()
        }
        _ => None,
    };
    parsed.ok_or_else(|| EstimatorError::TimestampParse {
        value: format!("{:?}", value),
    })
}

fn real_or_nan(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn nan_to_null(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

async fn run_blocking<T, F>(f: F) -> EstimatorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> EstimatorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EstimatorError::Task(e.to_string()))?
}
