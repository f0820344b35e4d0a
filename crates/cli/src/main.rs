//! Battery Time Estimator CLI
//!
//! Runs a one-shot prediction against a local telemetry database, or
//! queries a running battery agent for its latest report and health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{predict, status};
use std::path::PathBuf;

/// Battery Time Estimator CLI
#[derive(Parser)]
#[command(name = "bte")]
#[command(author, version, about = "CLI for the Battery Time Estimator", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via BATTERY_API_URL env var)
    #[arg(long, env = "BATTERY_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one retrain-and-predict cycle against a SQLite telemetry file
    Predict {
        /// Path to the telemetry database
        #[arg(long, env = "BATTERY_DB_PATH")]
        db: Option<PathBuf>,

        /// Evaluate as of this time instead of now (RFC 3339 or "YYYY-MM-DD HH:MM:SS")
        #[arg(long, value_parser = predict::parse_at)]
        at: Option<DateTime<Utc>>,

        /// Days of history to train on
        #[arg(long)]
        window_days: Option<u32>,
    },

    /// Show the latest report from a running agent
    Latest,

    /// Show component health and readiness of a running agent
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;

    match cli.command {
        Commands::Predict {
            db,
            at,
            window_days,
        } => {
            let mut estimator = config.estimator();
            if let Some(days) = window_days {
                estimator.history_window_days = days;
            }
            predict::run_predict(
                &config.resolve_db_path(db),
                at,
                estimator,
                cli.format,
                cli.verbose,
            )
            .await?;
        }
        Commands::Latest => {
            let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;
            status::show_latest(&client, cli.format, cli.verbose).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;
            status::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
