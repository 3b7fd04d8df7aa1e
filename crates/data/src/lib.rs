//! Input and output adapters for the weekly trade aggregation job.
//!
//! This crate provides:
//! - CSV ingestion of raw trade rows
//! - SQLite persistence of the aggregation table
//! - CSV and XLSX export of the ranked report
//! - JSON chart series

pub mod chart_export;
pub mod csv_source;
pub mod report_export;
pub mod sqlite_store;

pub use chart_export::ChartExporter;
pub use csv_source::{CsvTradeSource, REQUIRED_COLUMNS};
pub use report_export::ReportExporter;
pub use sqlite_store::{validate_table_name, SqliteStore, StoredAggregateRow};
