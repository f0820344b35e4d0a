//! In-memory telemetry store

use super::{async_trait, TelemetryStore};
use crate::error::{EstimatorError, EstimatorResult};
use crate::models::Sample;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Telemetry held in a vector; can be switched into a failing mode to
/// exercise the driver's error path
#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: RwLock<Vec<Sample>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: RwLock::new(samples),
            failing: AtomicBool::new(false),
        }
    }

    /// Append a sample, recovering a poisoned lock
    pub fn push(&self, sample: Sample) {
        self.samples
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sample);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> EstimatorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EstimatorError::StoreUnavailable(
                "memory store set to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn snapshot(&self) -> EstimatorResult<Vec<Sample>> {
        self.check()?;
        let samples = self
            .samples
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut sorted = samples.clone();
        sorted.sort_by_key(|s| s.timestamp);
        Ok(sorted)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn fetch_window(&self, since: DateTime<Utc>) -> EstimatorResult<Vec<Sample>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|s| s.timestamp >= since)
            .collect())
    }

    async fn fetch_latest(&self) -> EstimatorResult<Option<Sample>> {
        Ok(self.snapshot()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, soc: f64) -> Sample {
        Sample::new(Utc.timestamp_opt(secs, 0).unwrap(), 3.8, soc, 25.0, -100.0)
    }

    #[tokio::test]
    async fn test_window_and_latest() {
        let store = MemoryStore::new(vec![at(30, 47.0), at(10, 49.0)]);
        store.push(at(20, 48.0));

        let window = store.fetch_window(Utc.timestamp_opt(15, 0).unwrap()).await.unwrap();
        assert_eq!(window.iter().map(|s| s.soc).collect::<Vec<_>>(), vec![48.0, 47.0]);
        assert_eq!(store.fetch_latest().await.unwrap().unwrap().soc, 47.0);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let store = MemoryStore::new(vec![at(0, 50.0)]);
        store.set_failing(true);
        assert!(matches!(
            store.fetch_latest().await,
            Err(EstimatorError::StoreUnavailable(_))
        ));
        store.set_failing(false);
        assert!(store.fetch_latest().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_push_survives_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryStore::new(vec![at(0, 50.0)]));
        let writer = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.samples.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(store.samples.is_poisoned());

        store.push(at(10, 49.5));
        assert_eq!(store.fetch_latest().await.unwrap().unwrap().soc, 49.5);
        assert_eq!(store.fetch_window(Utc.timestamp_opt(0, 0).unwrap()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::default();
        assert!(store.fetch_latest().await.unwrap().is_none());
    }
}
