//! Record normalization.
//!
//! Turns raw rows into validated [`Trade`]s. Malformed rows are dropped and
//! counted in [`NormalizationStats`]; only the null-timestamp policy can fail
//! the whole batch.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{FillValue, NullTimestampPolicy, PipelineConfig};
use crate::error::{PipelineError, RecordError};
use crate::trade::{non_blank, parse_decimal, parse_timestamp, ClientType, RawTrade, Side, Trade};

/// Number of offending rows quoted in a validation error.
const MAX_REPORTED_ROWS: usize = 5;

/// Accepted and rejected row counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationStats {
    /// Rows received
    pub total_rows: usize,
    /// Trades passed on to aggregation
    pub accepted: usize,
    /// Rows whose timestamp was present but unparseable
    pub invalid_timestamp: usize,
    pub invalid_price: usize,
    pub invalid_quantity: usize,
    pub invalid_pnl: usize,
    pub invalid_side: usize,
    /// Rows whose `price * quantity` does not fit in a decimal
    pub notional_overflow: usize,
    /// Rows with a blank user id or symbol
    pub missing_identity: usize,
    /// Rows dropped under the `drop` null-timestamp policy
    pub null_timestamp_dropped: usize,
    /// Rows kept with a substituted timestamp under the `fill` policy
    pub null_timestamp_filled: usize,
    /// Rows with an unrecognised client tier
    pub unknown_client_dropped: usize,
    pub duplicates_removed: usize,
}

impl NormalizationStats {
    /// Returns the number of per-record parse failures.
    #[must_use]
    pub fn parse_errors(&self) -> usize {
        self.invalid_timestamp
            + self.invalid_price
            + self.invalid_quantity
            + self.invalid_pnl
            + self.invalid_side
            + self.notional_overflow
            + self.missing_identity
    }

    /// Returns the number of rows that did not reach aggregation.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.parse_errors()
            + self.null_timestamp_dropped
            + self.unknown_client_dropped
            + self.duplicates_removed
    }

    fn record(&mut self, err: &RecordError) {
        match err.field() {
            "timestamp" => self.invalid_timestamp += 1,
            "price" => self.invalid_price += 1,
            "quantity" => self.invalid_quantity += 1,
            "pnl" => self.invalid_pnl += 1,
            "side" => self.invalid_side += 1,
            "notional" => self.notional_overflow += 1,
            _ => self.missing_identity += 1,
        }
    }
}

/// The output of [`Normalizer::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub trades: Vec<Trade>,
    pub stats: NormalizationStats,
}

/// State of a row's timestamp before the policy is applied.
enum TimestampState {
    Null,
    Parsed(NaiveDateTime),
    Invalid,
}

impl TimestampState {
    fn of(raw: &RawTrade) -> Self {
        match non_blank(raw.timestamp.as_deref()) {
            None => Self::Null,
            Some(s) => parse_timestamp(s).map_or(Self::Invalid, Self::Parsed),
        }
    }
}

/// Cleans and validates raw trade rows.
#[derive(Debug, Clone)]
pub struct Normalizer {
    policy: NullTimestampPolicy,
    deduplicate: bool,
    keep_unknown_clients: bool,
}

impl Normalizer {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            policy: config.null_timestamp_policy,
            deduplicate: config.deduplicate,
            keep_unknown_clients: config.keep_unknown_clients,
        }
    }

    /// Normalizes a batch of raw rows.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] if the policy is `error` and any
    /// row has a null timestamp. Nothing is returned for the batch in that
    /// case.
    pub fn normalize(&self, rows: &[RawTrade]) -> Result<NormalizedBatch, PipelineError> {
        let states: Vec<TimestampState> = rows.iter().map(TimestampState::of).collect();

        let fill = match self.policy {
            NullTimestampPolicy::Error => {
                check_no_null_timestamps(&states)?;
                None
            }
            NullTimestampPolicy::Drop => None,
            NullTimestampPolicy::Fill(FillValue::Fixed(ts)) => Some(ts),
            NullTimestampPolicy::Fill(FillValue::EarliestObserved) => {
                Some(self.earliest_accepted(rows, &states))
            }
        };

        let mut stats = NormalizationStats {
            total_rows: rows.len(),
            ..NormalizationStats::default()
        };
        let mut trades = Vec::with_capacity(rows.len());
        let mut seen = HashSet::new();

        for (index, (raw, state)) in rows.iter().zip(states).enumerate() {
            let row = index + 1;

            let timestamp = match state {
                TimestampState::Parsed(ts) => ts,
                TimestampState::Invalid => {
                    let value = raw.timestamp.clone().unwrap_or_default();
                    let err = RecordError::invalid("timestamp", value);
                    tracing::debug!(row, error = %err, "rejected trade row");
                    stats.record(&err);
                    continue;
                }
                TimestampState::Null => match fill {
                    Some(ts) => {
                        stats.null_timestamp_filled += 1;
                        ts
                    }
                    None => {
                        tracing::debug!(row, "dropped trade row with null timestamp");
                        stats.null_timestamp_dropped += 1;
                        continue;
                    }
                },
            };

            let trade = match coerce(raw, timestamp) {
                Ok(trade) => trade,
                Err(err) => {
                    tracing::debug!(row, error = %err, "rejected trade row");
                    stats.record(&err);
                    continue;
                }
            };

            if !self.admits(&trade) {
                tracing::debug!(
                    row,
                    client_type = ?raw.client_type,
                    "dropped trade row with unknown client type"
                );
                stats.unknown_client_dropped += 1;
                continue;
            }

            if self.deduplicate && !seen.insert(trade.clone()) {
                stats.duplicates_removed += 1;
                continue;
            }

            trades.push(trade);
        }

        stats.accepted = trades.len();

        if stats.rejected() > 0 {
            tracing::warn!(
                total = stats.total_rows,
                accepted = stats.accepted,
                rejected = stats.rejected(),
                "some trade rows were rejected"
            );
        }
        if stats.null_timestamp_filled > 0 {
            tracing::info!(
                filled = stats.null_timestamp_filled,
                fill_timestamp = ?fill,
                "filled null timestamps"
            );
        }

        Ok(NormalizedBatch { trades, stats })
    }

    fn admits(&self, trade: &Trade) -> bool {
        self.keep_unknown_clients || trade.client_type.is_known()
    }

    /// Earliest timestamp among rows that will reach aggregation, or the
    /// Unix epoch if there are none.
    fn earliest_accepted(&self, rows: &[RawTrade], states: &[TimestampState]) -> NaiveDateTime {
        rows.iter()
            .zip(states)
            .filter_map(|(raw, state)| match state {
                TimestampState::Parsed(ts) => Some((raw, *ts)),
                _ => None,
            })
            .filter(|(raw, ts)| coerce(raw, *ts).is_ok_and(|trade| self.admits(&trade)))
            .map(|(_, ts)| ts)
            .min()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH.naive_utc())
    }
}

fn check_no_null_timestamps(states: &[TimestampState]) -> Result<(), PipelineError> {
    let rows: Vec<usize> = states
        .iter()
        .enumerate()
        .filter(|(_, state)| matches!(state, TimestampState::Null))
        .map(|(index, _)| index + 1)
        .collect();

    if rows.is_empty() {
        return Ok(());
    }

    Err(PipelineError::Validation {
        policy: NullTimestampPolicy::Error.as_str(),
        count: rows.len(),
        rows: rows.into_iter().take(MAX_REPORTED_ROWS).collect(),
    })
}

/// Coerces every field except the timestamp, which the caller resolved.
fn coerce(raw: &RawTrade, timestamp: NaiveDateTime) -> Result<Trade, RecordError> {
    let user_id = non_blank(raw.user_id.as_deref())
        .ok_or(RecordError::Missing { field: "user_id" })?
        .to_string();
    let symbol = non_blank(raw.symbol.as_deref())
        .ok_or(RecordError::Missing { field: "symbol" })?
        .to_uppercase();
    let client_type = raw
        .client_type
        .as_deref()
        .map_or(ClientType::Unknown, ClientType::parse);

    let price = non_negative("price", raw.price.as_deref())?;
    let quantity = non_negative("quantity", raw.quantity.as_deref())?;
    if price.checked_mul(quantity).is_none() {
        return Err(RecordError::Overflow { field: "notional" });
    }

    let pnl = non_blank(raw.pnl.as_deref())
        .map(|s| parse_decimal("pnl", s))
        .transpose()?;
    let side = non_blank(raw.side.as_deref())
        .map(str::parse::<Side>)
        .transpose()?;

    Ok(Trade {
        timestamp,
        user_id,
        client_type,
        symbol,
        side,
        price,
        quantity,
        pnl,
    })
}

fn non_negative(field: &'static str, raw: Option<&str>) -> Result<Decimal, RecordError> {
    let value = parse_decimal(field, non_blank(raw).ok_or(RecordError::Missing { field })?)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(RecordError::Negative { field, value });
    }
    Ok(value)
}
