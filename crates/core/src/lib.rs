//! Core of the weekly trade aggregation job.
//!
//! Raw rows flow through [`Normalizer`] → [`Aggregator`] → [`Ranker`] and are
//! packaged into a [`Report`]. [`Pipeline`] runs the stages in order. Nothing
//! here touches the filesystem; loading and exporting live in the data crate.

pub mod aggregator;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod summary_formatter;
pub mod trade;
pub mod validation;
pub mod week;

pub use aggregator::{AggregatedMetrics, AggregationKey, AggregationTable, Aggregator};
pub use config::{
    AppConfig, FillValue, InputConfig, NullTimestampPolicy, OutputConfig, PipelineConfig,
    PipelineSettings, PnlSource, RankLevel,
};
pub use config_loader::ConfigLoader;
pub use error::{PipelineError, RecordError};
pub use normalizer::{NormalizationStats, NormalizedBatch, Normalizer};
pub use pipeline::Pipeline;
pub use ranker::{RankedEntry, Ranker};
pub use report::{ChartData, Report, RunSummary, SymbolVolume, TierSeries, WeeklyVolume};
pub use summary_formatter::SummaryFormatter;
pub use trade::{ClientType, RawTrade, Side, Trade};
pub use validation::{FormatIssue, FormatReport};
pub use week::WeekAnchor;
