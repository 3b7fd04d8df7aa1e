//! Aggregation run command.
//!
//! Loads the trade file, runs the pipeline and, only when the whole run
//! succeeds, writes the SQLite table, the ranked report and the chart data.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use trade_etl_core::{
    AppConfig, ConfigLoader, FormatReport, Pipeline, PipelineConfig, RawTrade, Report,
    SummaryFormatter,
};
use trade_etl_data::{
    validate_table_name, ChartExporter, CsvTradeSource, ReportExporter, SqliteStore,
};

/// Arguments for the run command. Flags override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Input trade CSV
    #[arg(short, long)]
    pub data: Option<String>,

    /// SQLite database file
    #[arg(long)]
    pub db: Option<String>,

    /// Table name for the weekly aggregates
    #[arg(long)]
    pub table: Option<String>,

    /// Path prefix for the ranked report (.csv and .xlsx are appended)
    #[arg(long)]
    pub top: Option<String>,

    /// Output path for the weekly volume chart data
    #[arg(long)]
    pub chart_weekly: Option<String>,

    /// Output path for the per-symbol volume chart data
    #[arg(long)]
    pub chart_symbols: Option<String>,

    /// Disable PnL aggregation
    #[arg(long)]
    pub no_pnl: bool,

    /// Null timestamp policy: drop, fill or error
    #[arg(long)]
    pub null_timestamp: Option<String>,

    /// Timestamp substituted under the fill policy (default: earliest in batch)
    #[arg(long)]
    pub fill_timestamp: Option<String>,

    /// Number of bronze entries to rank
    #[arg(long)]
    pub top_k: Option<usize>,

    /// First day of the aggregation week (e.g. monday, sunday)
    #[arg(long)]
    pub week_anchor: Option<String>,

    /// Ranking granularity: symbol or client
    #[arg(long)]
    pub rank_level: Option<String>,

    /// PnL source: column or cashflow
    #[arg(long)]
    pub pnl_source: Option<String>,

    /// Remove exact duplicate trades
    #[arg(long)]
    pub dedupe: bool,

    /// Keep rows whose client type is not gold, silver or bronze
    #[arg(long)]
    pub keep_unknown_clients: bool,
}

impl RunArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        let set = |target: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                target.clone_from(value);
            }
        };

        set(&mut config.input.data_path, &self.data);
        set(&mut config.output.db_path, &self.db);
        set(&mut config.output.table, &self.table);
        set(&mut config.output.top_report, &self.top);
        set(&mut config.output.chart_weekly, &self.chart_weekly);
        set(&mut config.output.chart_symbols, &self.chart_symbols);

        let pipeline = &mut config.pipeline;
        set(&mut pipeline.null_timestamp_policy, &self.null_timestamp);
        set(&mut pipeline.week_anchor, &self.week_anchor);
        set(&mut pipeline.rank_level, &self.rank_level);
        set(&mut pipeline.pnl_source, &self.pnl_source);
        if self.fill_timestamp.is_some() {
            pipeline.fill_timestamp.clone_from(&self.fill_timestamp);
        }
        if let Some(top_k) = self.top_k {
            pipeline.top_k = top_k;
        }
        if self.no_pnl {
            pipeline.enable_pnl = false;
        }
        if self.dedupe {
            pipeline.deduplicate = true;
        }
        if self.keep_unknown_clients {
            pipeline.keep_unknown_clients = true;
        }
    }
}

/// Runs the run command.
///
/// # Errors
/// Returns an error if configuration is invalid, the input cannot be read,
/// the pipeline fails, or an output cannot be written.
pub async fn run_aggregate(args: RunArgs) -> Result<()> {
    let mut config = ConfigLoader::load_from(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config))?;
    args.apply(&mut config);

    let report = execute(&config).await?;
    println!("{}", SummaryFormatter::format(&report));
    Ok(())
}

/// Runs one batch for `config` and writes every output.
///
/// # Errors
/// Returns an error from any stage. Outputs are written only after the
/// pipeline has completed.
pub async fn execute(config: &AppConfig) -> Result<Report> {
    let pipeline_config = PipelineConfig::from_settings(&config.pipeline)?;
    validate_table_name(&config.output.table)?;
    tracing::info!(data = %config.input.data_path, "starting run");

    let rows = CsvTradeSource::read_path(&config.input.data_path)?;
    log_format_issues(&rows, config.pipeline.forbid_future_timestamps);
    let report = Pipeline::new(pipeline_config).run(&rows)?;

    let store = SqliteStore::connect(&config.output.db_path).await?;
    store
        .replace_table(&config.output.table, &report.table)
        .await
        .with_context(|| format!("Failed to write table '{}'", config.output.table))?;
    store.close().await;

    ReportExporter::write_all(
        &config.output.top_report,
        &report.ranked,
        report.table.pnl_enabled(),
    )?;
    ChartExporter::write_weekly(&config.output.chart_weekly, &report.charts)?;
    ChartExporter::write_symbols(&config.output.chart_symbols, &report.charts)?;

    tracing::info!(
        db = %config.output.db_path,
        table = %config.output.table,
        ranked = report.ranked.len(),
        "run complete"
    );
    Ok(report)
}

fn log_format_issues(rows: &[RawTrade], forbid_future: bool) {
    let report = FormatReport::check(rows, Utc::now().naive_utc(), forbid_future);
    for (issue, affected) in &report.issues {
        tracing::warn!(
            issue = issue.as_str(),
            count = affected.count,
            sample_rows = ?affected.sample_rows,
            "format issue in input"
        );
    }
}
