//! SQLite persistence for the weekly aggregation table.
//!
//! Each run replaces the table wholesale: the previous table is dropped and
//! rebuilt inside one transaction, so readers see either the old table or
//! the complete new one.

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use trade_etl_core::AggregationTable;

/// A row read back from an aggregation table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredAggregateRow {
    pub week_start_date: String,
    pub client_type: String,
    pub user_id: String,
    pub symbol: String,
    pub total_volume: f64,
    pub avg_price: f64,
    pub trade_count: i64,
    /// Absent when the table was written with PnL disabled
    #[sqlx(default)]
    pub total_pnl: Option<f64>,
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn in_memory() -> Result<Self> {
        Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        // one long-lived connection, so an in-memory database survives
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Replaces `table` with the rows of `aggregates`.
    ///
    /// The `total_pnl` column is created only when the table carries PnL.
    /// Returns the number of rows written.
    ///
    /// # Errors
    /// Returns an error if the table name is not a plain identifier, a value
    /// cannot be represented, or the transaction fails.
    pub async fn replace_table(&self, table: &str, aggregates: &AggregationTable) -> Result<u64> {
        validate_table_name(table)?;
        let with_pnl = aggregates.pnl_enabled();

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{table}""#))
            .execute(&mut *tx)
            .await?;

        let pnl_column = if with_pnl { ",\n                total_pnl REAL" } else { "" };
        sqlx::query(&format!(
            r#"
            CREATE TABLE "{table}" (
                week_start_date TEXT NOT NULL,
                client_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                total_volume REAL NOT NULL,
                avg_price REAL NOT NULL,
                trade_count INTEGER NOT NULL{pnl_column},
                PRIMARY KEY (week_start_date, client_type, user_id, symbol)
            )
            "#
        ))
        .execute(&mut *tx)
        .await?;

        let insert = if with_pnl {
            format!(
                r#"INSERT INTO "{table}"
                   (week_start_date, client_type, user_id, symbol, total_volume, avg_price, trade_count, total_pnl)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#
            )
        } else {
            format!(
                r#"INSERT INTO "{table}"
                   (week_start_date, client_type, user_id, symbol, total_volume, avg_price, trade_count)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#
            )
        };

        let mut written = 0u64;
        for (key, metrics) in aggregates {
            let trade_count = i64::try_from(metrics.trade_count)
                .context("trade_count does not fit in an INTEGER column")?;
            let mut query = sqlx::query(&insert)
                .bind(key.week_start.to_string())
                .bind(key.client_type.as_str())
                .bind(&key.user_id)
                .bind(&key.symbol)
                .bind(to_real("total_volume", metrics.total_volume)?)
                .bind(to_real("avg_price", metrics.avg_price)?)
                .bind(trade_count);
            if with_pnl {
                let pnl = metrics
                    .total_pnl
                    .map(|pnl| to_real("total_pnl", pnl))
                    .transpose()?;
                query = query.bind(pnl);
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        tracing::info!(table, rows = written, with_pnl, "wrote aggregation table");
        Ok(written)
    }

    /// Reads every row of `table`, ordered by key.
    ///
    /// # Errors
    /// Returns an error if the table name is invalid or the query fails.
    pub async fn load_table(&self, table: &str) -> Result<Vec<StoredAggregateRow>> {
        validate_table_name(table)?;
        let rows = sqlx::query_as::<_, StoredAggregateRow>(&format!(
            r#"
            SELECT *
            FROM "{table}"
            ORDER BY week_start_date, client_type, user_id, symbol
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns the column names of `table` in declaration order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the only names interpolated into SQL.
///
/// # Errors
/// Returns an error for any other name.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("invalid table name: '{table}'");
    }
    Ok(())
}

fn to_real(column: &str, value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .with_context(|| format!("{column} value {value} cannot be stored as REAL"))
}
