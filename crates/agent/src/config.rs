//! Agent configuration

use anyhow::{Context, Result};
use estimator_lib::EstimatorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "BATTERY_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Label attached to every structured log event
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// SQLite file holding the `battery_data` table
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// API server port for health/metrics/prediction
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub estimator: EstimatorConfig,
}

fn default_device_name() -> String {
    "battery".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("battery_data.db")
}

fn default_api_port() -> u16 {
    8080
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            db_path: default_db_path(),
            api_port: default_api_port(),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the `BATTERY_CONFIG` file (if set) and
    /// `BATTERY_*` environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Layer environment variables over an optional file; nested keys use
    /// `__`, e.g. `BATTERY_ESTIMATOR__SEED=7`
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("BATTERY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read agent configuration")?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("invalid agent configuration")?;
        agent.estimator.validate()?;
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.db_path, PathBuf::from("battery_data.db"));
        assert_eq!(config.estimator.retrain_interval_secs, 300);
    }

    #[test]
    fn test_file_overrides_nested_estimator_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "api_port = 9191\ndb_path = \"/var/lib/bms/battery_data.db\"\n\n[estimator]\nseed = 7\nretrain_interval_secs = 60\n\n[estimator.boost]\nmax_depth = 3"
        )
        .unwrap();

        let config = AgentConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.api_port, 9191);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/bms/battery_data.db"));
        assert_eq!(config.estimator.seed, 7);
        assert_eq!(config.estimator.retrain_interval_secs, 60);
        assert_eq!(config.estimator.boost.max_depth, 3);
        assert_eq!(config.estimator.boost.n_estimators, 100);
        assert_eq!(config.estimator.glitch_threshold, 0.05);
    }

    #[test]
    fn test_invalid_estimator_settings_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[estimator]\ncapacity_mah = 0").unwrap();
        assert!(AgentConfig::load_from(Some(file.path())).is_err());
    }
}
