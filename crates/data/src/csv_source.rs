use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use trade_etl_core::RawTrade;

/// Columns every trade file must carry. `side` and `pnl` are optional.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "timestamp",
    "user_id",
    "client_type",
    "symbol",
    "price",
    "quantity",
];

pub struct CsvTradeSource;

impl CsvTradeSource {
    /// Reads raw trade rows from a CSV file with a header row.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened, a required column is
    /// missing, or a row is structurally malformed
    pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<RawTrade>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open trade file: {}", path.display()))?;
        let rows = Self::read(file)
            .with_context(|| format!("Failed to read trade file: {}", path.display()))?;

        tracing::info!(path = %path.display(), rows = rows.len(), "loaded trade rows");
        Ok(rows)
    }

    /// Reads raw trade rows from any CSV source.
    ///
    /// Header names are trimmed and lowercased before matching, and unknown
    /// columns are ignored. Field values are kept as text; coercion happens
    /// in the normalizer.
    ///
    /// # Errors
    /// Returns error if a required column is missing or a row cannot be read
    pub fn read<R: Read>(reader: R) -> Result<Vec<RawTrade>> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

        let headers: StringRecord = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();
        if !missing.is_empty() {
            bail!("missing required columns: {}", missing.join(", "));
        }
        reader.set_headers(headers);

        let mut rows = Vec::new();
        for (index, result) in reader.deserialize::<RawTrade>().enumerate() {
            let row = result.with_context(|| format!("Malformed CSV record {}", index + 1))?;
            rows.push(row);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_rows_with_normalized_headers() {
        let data = "\
 Timestamp ,USER_ID,client_type,Symbol,side,price,quantity,pnl,extra
2025-03-04 10:00:00,u1,bronze,aapl,buy,10.5,2,1.25,x
,u2,gold,MSFT,,20,1,,y
";
        let rows = CsvTradeSource::read(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp.as_deref(), Some("2025-03-04 10:00:00"));
        assert_eq!(rows[0].user_id.as_deref(), Some("u1"));
        assert_eq!(rows[0].symbol.as_deref(), Some("aapl"));
        assert_eq!(rows[0].pnl.as_deref(), Some("1.25"));
        assert!(rows[1].has_null_timestamp());
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let data = "timestamp,user_id,client_type,symbol,price,quantity\n\
                    2025-03-04,u1,bronze,AAPL,1,1\n";
        let rows = CsvTradeSource::read(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].side, None);
        assert_eq!(rows[0].pnl, None);
    }

    #[test]
    fn test_missing_required_column() {
        let data = "timestamp,user_id,symbol,price\n2025-03-04,u1,AAPL,1\n";
        let err = CsvTradeSource::read(data.as_bytes()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("client_type"));
        assert!(message.contains("quantity"));
    }

    #[test]
    fn test_read_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,user_id,client_type,symbol,price,quantity").unwrap();
        writeln!(file, "2025-03-04,u1,bronze,AAPL,1,1").unwrap();
        let rows = CsvTradeSource::read_path(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = CsvTradeSource::read_path("/nonexistent/trades.csv").unwrap_err();
        assert!(err.to_string().contains("Failed to open trade file"));
    }
}
