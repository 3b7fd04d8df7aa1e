//! JSON series for the weekly and per-symbol volume charts.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use trade_etl_core::{ChartData, SymbolVolume, TierSeries, WeeklyVolume};

use crate::report_export::ensure_parent;

#[derive(Debug, Serialize)]
struct WeeklyChart<'a> {
    title: &'static str,
    total: &'a [WeeklyVolume],
    by_client_type: &'a [TierSeries],
}

#[derive(Debug, Serialize)]
struct SymbolChart<'a> {
    title: &'static str,
    symbols: &'a [SymbolVolume],
}

pub struct ChartExporter;

impl ChartExporter {
    /// Writes the weekly volume series, overall and per client tier.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or serialized
    pub fn write_weekly(path: impl AsRef<Path>, charts: &ChartData) -> Result<()> {
        let chart = WeeklyChart {
            title: "Weekly trading volume",
            total: &charts.weekly_volume,
            by_client_type: &charts.weekly_by_client_type,
        };
        write_json(path.as_ref(), &chart)
    }

    /// Writes total volume per symbol.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or serialized
    pub fn write_symbols(path: impl AsRef<Path>, charts: &ChartData) -> Result<()> {
        let chart = SymbolChart {
            title: "Total volume by symbol",
            symbols: &charts.symbol_volume,
        };
        write_json(path.as_ref(), &chart)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create chart file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write chart file: {}", path.display()))?;
    writer.flush()?;

    tracing::debug!(path = %path.display(), "wrote chart data");
    Ok(())
}
