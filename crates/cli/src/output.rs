//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use estimator_lib::PredictionType;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Fixed-precision number, `-` when missing
pub fn format_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "trained" | "ready" => status.green().to_string(),
        "degraded" | "no_data" | "not ready" => status.yellow().to_string(),
        "unhealthy" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

pub fn color_prediction_type(kind: PredictionType) -> String {
    let label = kind.label();
    match kind {
        PredictionType::ChargingComplete => label.green().bold().to_string(),
        PredictionType::TimeToFullCharge => label.cyan().to_string(),
        PredictionType::TimeToFullDischarge => label.yellow().to_string(),
        PredictionType::Unavailable => label.red().to_string(),
    }
}

/// Color an R² value: green when the fit is good, red when it is poor
pub fn color_r2(r2: Option<f64>) -> String {
    let formatted = format_optional(r2, 4);
    match r2 {
        Some(v) if v >= 0.9 => formatted.green().to_string(),
        Some(v) if v >= 0.5 => formatted.yellow().to_string(),
        Some(_) => formatted.red().to_string(),
        None => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(Some(3.14159), 2), "3.14");
        assert_eq!(format_optional(None, 2), "-");
    }

    #[test]
    fn test_color_helpers_keep_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("degraded"), "degraded");
        assert_eq!(
            color_prediction_type(PredictionType::ChargingComplete),
            "Charging Complete"
        );
        assert_eq!(color_r2(Some(0.95)), "0.9500");
    }
}
