use anyhow::{Context, Result};
use csv::Writer;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::path::{Path, PathBuf};
use trade_etl_core::RankedEntry;

const SHEET_NAME: &str = "top_clients";

pub struct ReportExporter;

impl ReportExporter {
    /// Writes the ranked report to `<prefix>.csv` and `<prefix>.xlsx`.
    ///
    /// Returns the two paths written.
    ///
    /// # Errors
    /// Returns error if either file cannot be written
    pub fn write_all(
        prefix: impl AsRef<Path>,
        entries: &[RankedEntry],
        include_pnl: bool,
    ) -> Result<(PathBuf, PathBuf)> {
        let prefix = prefix.as_ref();
        let csv_path = with_suffix(prefix, ".csv");
        let xlsx_path = with_suffix(prefix, ".xlsx");

        Self::write_csv(&csv_path, entries, include_pnl)?;
        Self::write_xlsx(&xlsx_path, entries, include_pnl)?;

        tracing::info!(
            csv = %csv_path.display(),
            xlsx = %xlsx_path.display(),
            entries = entries.len(),
            "wrote ranked report"
        );
        Ok((csv_path, xlsx_path))
    }

    /// Writes ranked entries as CSV.
    ///
    /// Format: rank,client_type,user_id,symbol,week_start_date,total_volume[,total_pnl]
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_csv(
        path: impl AsRef<Path>,
        entries: &[RankedEntry],
        include_pnl: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);

        writer.write_record(headers(include_pnl))?;
        for entry in entries {
            let mut record = vec![
                entry.rank.to_string(),
                entry.client_type.to_string(),
                entry.user_id.clone(),
                entry.symbol.clone().unwrap_or_default(),
                entry.week_start.map(|w| w.to_string()).unwrap_or_default(),
                entry.total_volume.to_string(),
            ];
            if include_pnl {
                record.push(entry.total_pnl.map(|p| p.to_string()).unwrap_or_default());
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Writes ranked entries as a single-sheet XLSX workbook.
    ///
    /// # Errors
    /// Returns error if a value cannot be converted or the workbook cannot be saved
    pub fn write_xlsx(
        path: impl AsRef<Path>,
        entries: &[RankedEntry],
        include_pnl: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, header) in headers(include_pnl).iter().enumerate() {
            worksheet.write_string_with_format(0, u16::try_from(col)?, *header, &bold)?;
        }

        for (index, entry) in entries.iter().enumerate() {
            let row = u32::try_from(index + 1)?;
            worksheet.write_number(row, 0, u32::try_from(entry.rank)?)?;
            worksheet.write_string(row, 1, entry.client_type.as_str())?;
            worksheet.write_string(row, 2, entry.user_id.as_str())?;
            if let Some(symbol) = &entry.symbol {
                worksheet.write_string(row, 3, symbol.as_str())?;
            }
            if let Some(week) = entry.week_start {
                worksheet.write_string(row, 4, week.to_string())?;
            }
            worksheet.write_number(row, 5, to_number(entry.total_volume)?)?;
            if include_pnl {
                if let Some(pnl) = entry.total_pnl {
                    worksheet.write_number(row, 6, to_number(pnl)?)?;
                }
            }
        }

        workbook
            .save(path)
            .with_context(|| format!("Failed to save workbook: {}", path.display()))?;
        Ok(())
    }
}

/// Appends `suffix` to the last path component, keeping any dots already in it.
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

fn headers(include_pnl: bool) -> Vec<&'static str> {
    let mut headers = vec![
        "rank",
        "client_type",
        "user_id",
        "symbol",
        "week_start_date",
        "total_volume",
    ];
    if include_pnl {
        headers.push("total_pnl");
    }
    headers
}

fn to_number(value: rust_decimal::Decimal) -> Result<f64> {
    value
        .to_f64()
        .with_context(|| format!("value {value} cannot be written as a number"))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
