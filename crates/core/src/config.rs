use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::trade::parse_timestamp;
use crate::week::WeekAnchor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub data_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub db_path: String,
    pub table: String,
    /// Path prefix for the ranked report; `.csv` and `.xlsx` are appended.
    pub top_report: String,
    pub chart_weekly: String,
    pub chart_symbols: String,
}

/// Pipeline options as they appear in config files and the environment.
///
/// Enumerated options are kept as text here and checked by
/// [`PipelineConfig::from_settings`], so a bad value surfaces as a
/// configuration error rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub enable_pnl: bool,
    pub pnl_source: String,
    pub null_timestamp_policy: String,
    pub fill_timestamp: Option<String>,
    pub week_anchor: String,
    pub deduplicate: bool,
    pub keep_unknown_clients: bool,
    pub rank_level: String,
    pub forbid_future_timestamps: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_path: "data/trades.csv".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            db_path: "output/agg_result.db".to_string(),
            table: "agg_trades_weekly".to_string(),
            top_report: "output/top_clients".to_string(),
            chart_weekly: "output/weekly_volume.json".to_string(),
            chart_symbols: "output/symbols_total_volume.json".to_string(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            enable_pnl: true,
            pnl_source: "column".to_string(),
            null_timestamp_policy: "drop".to_string(),
            fill_timestamp: None,
            week_anchor: "monday".to_string(),
            deduplicate: false,
            keep_unknown_clients: false,
            rank_level: "symbol".to_string(),
            forbid_future_timestamps: true,
        }
    }
}

/// What to do with a record whose timestamp is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullTimestampPolicy {
    /// Discard the record.
    #[default]
    Drop,
    /// Substitute a timestamp so the record still aggregates.
    Fill(FillValue),
    /// Abort the run.
    Error,
}

impl NullTimestampPolicy {
    /// Returns the configuration label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Fill(_) => "fill",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NullTimestampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp substituted under [`NullTimestampPolicy::Fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillValue {
    /// The earliest valid timestamp in the batch, or the Unix epoch if the
    /// batch has none.
    EarliestObserved,
    /// A fixed timestamp.
    Fixed(NaiveDateTime),
}

/// Granularity of the bronze ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankLevel {
    /// One entry per aggregation row (week, client, symbol).
    #[default]
    Symbol,
    /// One entry per client, summed across weeks and symbols.
    Client,
}

impl FromStr for RankLevel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "symbol" | "row" => Ok(Self::Symbol),
            "client" | "user" => Ok(Self::Client),
            _ => Err(PipelineError::configuration(format!(
                "invalid rank_level: '{s}'. Valid values: symbol, client"
            ))),
        }
    }
}

/// Where per-trade PnL comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PnlSource {
    /// The `pnl` column of the input.
    #[default]
    Column,
    /// Signed cashflow: `price * quantity`, positive for sells and negative
    /// otherwise.
    Cashflow,
}

impl FromStr for PnlSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "column" => Ok(Self::Column),
            "cashflow" => Ok(Self::Cashflow),
            _ => Err(PipelineError::configuration(format!(
                "invalid pnl_source: '{s}'. Valid values: column, cashflow"
            ))),
        }
    }
}

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub enable_pnl: bool,
    pub pnl_source: PnlSource,
    pub null_timestamp_policy: NullTimestampPolicy,
    pub week_anchor: WeekAnchor,
    pub deduplicate: bool,
    pub keep_unknown_clients: bool,
    pub rank_level: RankLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            enable_pnl: true,
            pnl_source: PnlSource::Column,
            null_timestamp_policy: NullTimestampPolicy::Drop,
            week_anchor: WeekAnchor::default(),
            deduplicate: false,
            keep_unknown_clients: false,
            rank_level: RankLevel::Symbol,
        }
    }
}

impl PipelineConfig {
    /// Validates raw settings into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for unknown enum values,
    /// `top_k == 0`, an unparseable `fill_timestamp`, or a `fill_timestamp`
    /// given without the `fill` policy.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, PipelineError> {
        if settings.top_k == 0 {
            return Err(PipelineError::configuration("top_k must be at least 1"));
        }

        let fill_timestamp = match settings.fill_timestamp.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                PipelineError::configuration(format!("invalid fill_timestamp: '{raw}'"))
            })?),
        };

        let policy = settings.null_timestamp_policy.trim().to_lowercase();
        let null_timestamp_policy = match policy.as_str() {
            "drop" => NullTimestampPolicy::Drop,
            "error" => NullTimestampPolicy::Error,
            "fill" => NullTimestampPolicy::Fill(
                fill_timestamp.map_or(FillValue::EarliestObserved, FillValue::Fixed),
            ),
            other => {
                return Err(PipelineError::configuration(format!(
                    "invalid null_timestamp_policy: '{other}'. Valid values: drop, fill, error"
                )))
            }
        };

        let is_fill = matches!(null_timestamp_policy, NullTimestampPolicy::Fill(_));
        if fill_timestamp.is_some() && !is_fill {
            return Err(PipelineError::configuration(format!(
                "fill_timestamp is only valid with null_timestamp_policy=fill (got {null_timestamp_policy})"
            )));
        }

        Ok(Self {
            top_k: settings.top_k,
            enable_pnl: settings.enable_pnl,
            pnl_source: settings.pnl_source.parse()?,
            null_timestamp_policy,
            week_anchor: settings.week_anchor.parse()?,
            deduplicate: settings.deduplicate,
            keep_unknown_clients: settings.keep_unknown_clients,
            rank_level: settings.rank_level.parse()?,
        })
    }
}
