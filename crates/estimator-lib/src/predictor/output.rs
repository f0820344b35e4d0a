//! Human-readable rendering of cycle results
//!
//! Durations are shown as whole hours and minutes; regime diagnostics as
//! a one-line metric summary or an explicit no-data notice.

use crate::models::{CycleReport, RegimeDiagnostics, RegimeStatus};

/// Placeholder for a missing or non-finite duration
pub const NOT_AVAILABLE: &str = "n/a";

/// Render seconds as `"{h}h {m}m"`, flooring to whole minutes
///
/// Missing or non-finite values render as `"n/a"`; negative model outputs
/// clamp to `0h 0m`.
pub fn format_hours_minutes(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() => {
            let total_minutes = (s.max(0.0) / 60.0).floor() as u64;
            format!("{}h {}m", total_minutes / 60, total_minutes % 60)
        }
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// One-line summary of a regime's training outcome
pub fn describe_diagnostics(diagnostics: &RegimeDiagnostics) -> String {
    match &diagnostics.status {
        RegimeStatus::Trained {
            train_rows,
            test_rows,
            mse,
            r2,
        } => format!(
            "{} model: MSE {}, R² {} ({} train / {} test rows)",
            diagnostics.regime,
            format_metric(*mse),
            format_metric(*r2),
            train_rows,
            test_rows
        ),
        RegimeStatus::NoData => {
            format!("No valid data for {} prediction", diagnostics.regime)
        }
    }
}

/// Multi-line summary of a full cycle, used for console output
pub fn render_report(report: &CycleReport) -> String {
    let mut lines = vec![
        describe_diagnostics(&report.charging),
        describe_diagnostics(&report.discharging),
    ];
    match &report.prediction {
        Some(p) => {
            lines.push(format!(
                "Latest {}: voltage {:.3} V, soc {:.2}%, temperature {}, current {:.1} mA",
                p.timestamp.format("%Y-%m-%d %H:%M:%S"),
                p.voltage,
                p.soc,
                if p.temperature.is_nan() {
                    NOT_AVAILABLE.to_string()
                } else {
                    format!("{:.1} °C", p.temperature)
                },
                p.current
            ));
            lines.push(format!(
                "{}: {}",
                p.prediction_type,
                format_hours_minutes(p.predicted_seconds)
            ));
        }
        None => lines.push("No telemetry available".to_string()),
    }
    lines.join("\n")
}

fn format_metric(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
