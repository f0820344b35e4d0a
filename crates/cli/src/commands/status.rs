//! Commands that query a running agent

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use super::report::print_report;
use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_success, print_warning, OutputFormat};

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show the agent's most recent cycle report
pub async fn show_latest(client: &ApiClient, format: OutputFormat, verbose: bool) -> Result<()> {
    let report = client.latest_report().await?;
    print_report(&report, format, verbose)
}

/// Show component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health) = client.health().await?;
    let (_, readiness) = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Agent Health".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:   {}", color_status(health.status.as_str()));
            if readiness.ready {
                println!("Readiness: {}", color_status("ready"));
            } else {
                println!("Readiness: {}", color_status("not ready"));
            }
            println!();

            if health.components.is_empty() {
                print_warning("No components registered");
                return Ok(());
            }

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(c.status.as_str()),
                    message: c.message.clone().unwrap_or_else(|| "-".to_string()),
                    last_check: chrono::DateTime::from_timestamp(c.last_check_timestamp, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            match readiness.reason {
                Some(reason) => print_warning(&reason),
                None => print_success("Agent is ready"),
            }
        }
    }

    Ok(())
}
