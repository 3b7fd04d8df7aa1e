//! Format validation command.
//!
//! Reports formatting problems in a trade file without aggregating it.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use trade_etl_core::{ConfigLoader, FormatReport};
use trade_etl_data::CsvTradeSource;

/// Arguments for the validate command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Input trade CSV (defaults to the configured input)
    #[arg(short, long)]
    pub data: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit with an error if any issue is found
    #[arg(long)]
    pub strict: bool,
}

/// Runs the validate command.
///
/// # Errors
/// Returns an error if the file cannot be read, or if `--strict` is set and
/// the file has issues.
pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config))?;
    let path = args.data.unwrap_or(config.input.data_path);

    let rows = CsvTradeSource::read_path(&path)?;
    let report = FormatReport::check(
        &rows,
        Utc::now().naive_utc(),
        config.pipeline.forbid_future_timestamps,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report(&path, &report));
    }

    if args.strict && !report.is_clean() {
        bail!("{} has formatting issues", path);
    }
    Ok(())
}

fn format_report(path: &str, report: &FormatReport) -> String {
    let mut output = format!("Checked {} rows in {}\n", report.rows_checked, path);
    if report.is_clean() {
        output.push_str("No formatting issues found\n");
        return output;
    }

    for (issue, rows) in &report.issues {
        let samples: Vec<String> = rows.sample_rows.iter().map(ToString::to_string).collect();
        output.push_str(&format!(
            "{:<26} {:>6}  rows {}\n",
            issue.as_str(),
            rows.count,
            samples.join(", ")
        ));
    }
    output
}
