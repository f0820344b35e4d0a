//! Configuration management for the CLI

use anyhow::{Context, Result};
use estimator_lib::EstimatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_DB_PATH: &str = "battery_data.db";

/// CLI configuration, read from `~/.config/bte/config.json` when present
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Agent endpoint URL
    pub api_url: Option<String>,
    /// Telemetry database for `bte predict`
    pub db_path: Option<PathBuf>,
    /// Estimator tunables for `bte predict`
    pub estimator: Option<EstimatorConfig>,
}

impl Config {
    /// Load configuration from the default location; a missing file is
    /// an empty configuration
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("bte").join("config.json"))
    }

    /// Flag or environment value first, then the file, then the default
    pub fn resolve_api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn resolve_db_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }

    pub fn estimator(&self) -> EstimatorConfig {
        self.estimator.clone().unwrap_or_default()
    }
}
