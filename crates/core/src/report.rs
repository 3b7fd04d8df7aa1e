//! Report assembly.
//!
//! Packages everything the export adapters need from one run: the
//! aggregation table, the ranked bronze entries, chart projections and the
//! normalization counts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregator::AggregationTable;
use crate::error::{checked_accumulate, PipelineError};
use crate::normalizer::NormalizationStats;
use crate::ranker::RankedEntry;
use crate::trade::ClientType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyVolume {
    pub week_start: NaiveDate,
    pub total_volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolVolume {
    pub symbol: String,
    pub total_volume: Decimal,
}

/// Weekly volume series for one client tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierSeries {
    pub client_type: ClientType,
    pub points: Vec<WeeklyVolume>,
}

/// Projections of the aggregation table for chart rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartData {
    /// Volume summed over all groups, by week ascending
    pub weekly_volume: Vec<WeeklyVolume>,
    /// Volume summed over all groups, by symbol ascending
    pub symbol_volume: Vec<SymbolVolume>,
    /// Weekly volume per client tier, tiers in key order
    pub weekly_by_client_type: Vec<TierSeries>,
}

impl ChartData {
    /// Sums the table into chart series.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if a series total leaves the
    /// decimal range.
    pub fn from_table(table: &AggregationTable) -> Result<Self, PipelineError> {
        let mut weekly: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        let mut symbols: BTreeMap<&str, Decimal> = BTreeMap::new();
        let mut tiers: BTreeMap<ClientType, BTreeMap<NaiveDate, Decimal>> = BTreeMap::new();

        for (key, metrics) in table {
            let volume = metrics.total_volume;
            checked_accumulate(weekly.entry(key.week_start).or_default(), volume, || {
                format!("weekly volume for {}", key.week_start)
            })?;
            checked_accumulate(symbols.entry(key.symbol.as_str()).or_default(), volume, || {
                format!("symbol volume for {}", key.symbol)
            })?;
            let tier = tiers.entry(key.client_type).or_default();
            checked_accumulate(tier.entry(key.week_start).or_default(), volume, || {
                format!("{} volume for {}", key.client_type, key.week_start)
            })?;
        }

        Ok(Self {
            weekly_volume: weekly_points(weekly),
            symbol_volume: symbols
                .into_iter()
                .map(|(symbol, total_volume)| SymbolVolume {
                    symbol: symbol.to_string(),
                    total_volume,
                })
                .collect(),
            weekly_by_client_type: tiers
                .into_iter()
                .map(|(client_type, series)| TierSeries {
                    client_type,
                    points: weekly_points(series),
                })
                .collect(),
        })
    }
}

fn weekly_points(series: BTreeMap<NaiveDate, Decimal>) -> Vec<WeeklyVolume> {
    series
        .into_iter()
        .map(|(week_start, total_volume)| WeeklyVolume {
            week_start,
            total_volume,
        })
        .collect()
}

/// Counts describing a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub null_timestamp_filled: usize,
    pub aggregated_rows: usize,
    pub ranked_entries: usize,
    pub pnl_enabled: bool,
}

/// Everything one successful run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub table: AggregationTable,
    pub ranked: Vec<RankedEntry>,
    pub charts: ChartData,
    pub stats: NormalizationStats,
}

impl Report {
    /// Assembles a report, deriving chart data from the table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if chart totals leave the decimal
    /// range.
    pub fn assemble(
        table: AggregationTable,
        ranked: Vec<RankedEntry>,
        stats: NormalizationStats,
    ) -> Result<Self, PipelineError> {
        let charts = ChartData::from_table(&table)?;
        Ok(Self {
            table,
            ranked,
            charts,
            stats,
        })
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_rows: self.stats.total_rows,
            accepted: self.stats.accepted,
            rejected: self.stats.rejected(),
            null_timestamp_filled: self.stats.null_timestamp_filled,
            aggregated_rows: self.table.len(),
            ranked_entries: self.ranked.len(),
            pnl_enabled: self.table.pnl_enabled(),
        }
    }
}
