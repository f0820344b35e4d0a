//! Rendering of cycle reports, shared by `predict` and `latest`

use anyhow::Result;
use colored::Colorize;
use estimator_lib::{format_hours_minutes, RegimeDiagnostics, RegimeStatus};
use tabled::Tabled;

use crate::client::ReportView;
use crate::output::{
    color_prediction_type, color_r2, color_status, format_optional, print_json, print_warning,
    OutputFormat,
};

/// Row for the regime diagnostics table
#[derive(Tabled)]
struct RegimeRow {
    #[tabled(rename = "Regime")]
    regime: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Train")]
    train_rows: String,
    #[tabled(rename = "Test")]
    test_rows: String,
    #[tabled(rename = "MSE")]
    mse: String,
    #[tabled(rename = "R²")]
    r2: String,
}

impl From<&RegimeDiagnostics> for RegimeRow {
    fn from(d: &RegimeDiagnostics) -> Self {
        match &d.status {
            RegimeStatus::Trained {
                train_rows,
                test_rows,
                mse,
                r2,
            } => Self {
                regime: d.regime.to_string(),
                status: color_status("trained"),
                train_rows: train_rows.to_string(),
                test_rows: test_rows.to_string(),
                mse: format_optional(*mse, 2),
                r2: color_r2(*r2),
            },
            RegimeStatus::NoData => Self {
                regime: d.regime.to_string(),
                status: color_status("no_data"),
                train_rows: "-".to_string(),
                test_rows: "-".to_string(),
                mse: "-".to_string(),
                r2: "-".to_string(),
            },
        }
    }
}

pub fn print_report(report: &ReportView, format: OutputFormat, verbose: bool) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    println!("{}", "Battery Prediction".bold());
    println!("{}", "=".repeat(60));
    println!(
        "Generated:   {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if verbose {
        println!("Window rows: {}", report.window_rows);
        println!("Kept rows:   {}", report.featured_rows);
    }
    println!();

    let rows = vec![
        RegimeRow::from(&report.charging),
        RegimeRow::from(&report.discharging),
    ];
    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    for d in [&report.charging, &report.discharging] {
        if !d.is_trained() {
            print_warning(&format!("No valid data for {} prediction", d.regime));
        }
    }
    println!();

    let Some(p) = &report.prediction else {
        print_warning("No telemetry available");
        return Ok(());
    };

    println!("{}", "Latest Sample".bold());
    println!("{}", "-".repeat(60));
    println!("Timestamp:   {}", p.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("Voltage:     {} V", format_optional(p.voltage, 3));
    println!("SOC:         {} %", format_optional(p.soc, 2));
    println!("Temperature: {} °C", format_optional(p.temperature, 1));
    println!("Current:     {} mA", format_optional(p.current, 1));
    if verbose {
        println!("SOC slope:   {} %/s", format_optional(p.soc_slope, 6));
    }
    println!();
    println!(
        "{}: {}",
        color_prediction_type(p.prediction_type),
        format_hours_minutes(p.predicted_seconds).bold()
    );

    Ok(())
}
