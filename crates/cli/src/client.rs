//! API client for a running battery agent

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use estimator_lib::{
    health::{HealthResponse, ReadinessResponse},
    CycleReport, PredictionType, RegimeDiagnostics,
};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the agent's HTTP surface
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path`, failing on any non-2xx status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.fetch(path).await?;
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        serde_json::from_str(&body).context("Failed to parse response")
    }

    /// GET `path` and parse the body whatever the status; health probes
    /// answer 503 with a meaningful JSON body
    pub async fn get_with_status<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let (status, body) = self.fetch(path).await?;
        let parsed = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse response ({})", status))?;
        Ok((status, parsed))
    }

    async fn fetch(&self, path: &str) -> Result<(StatusCode, String)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;
        Ok((status, body))
    }

    pub async fn latest_report(&self) -> Result<ReportView> {
        self.get("api/v1/prediction").await
    }

    pub async fn health(&self) -> Result<(StatusCode, HealthResponse)> {
        self.get_with_status("healthz").await
    }

    pub async fn readiness(&self) -> Result<(StatusCode, ReadinessResponse)> {
        self.get_with_status("readyz").await
    }
}

// API response types
//
// Sensor readings may be missing (NULL in the store, NaN in memory, null on
// the wire), so the display types carry them as options.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportView {
    pub generated_at: DateTime<Utc>,
    pub window_rows: usize,
    pub featured_rows: usize,
    pub charging: RegimeDiagnostics,
    pub discharging: RegimeDiagnostics,
    pub prediction: Option<PredictionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionView {
    pub timestamp: DateTime<Utc>,
    pub voltage: Option<f64>,
    pub soc: Option<f64>,
    pub temperature: Option<f64>,
    pub current: Option<f64>,
    pub soc_slope: Option<f64>,
    pub prediction_type: PredictionType,
    pub predicted_seconds: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl From<&CycleReport> for ReportView {
    fn from(report: &CycleReport) -> Self {
        Self {
            generated_at: report.generated_at,
            window_rows: report.window_rows,
            featured_rows: report.featured_rows,
            charging: report.charging.clone(),
            discharging: report.discharging.clone(),
            prediction: report.prediction.as_ref().map(|p| PredictionView {
                timestamp: p.timestamp,
                voltage: finite(p.voltage),
                soc: finite(p.soc),
                temperature: finite(p.temperature),
                current: finite(p.current),
                soc_slope: finite(p.soc_slope),
                prediction_type: p.prediction_type,
                predicted_seconds: p.predicted_seconds.and_then(finite),
            }),
        }
    }
}
