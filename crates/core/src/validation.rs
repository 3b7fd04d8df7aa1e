//! Format validation report.
//!
//! A read-only pass over raw rows that lists formatting problems by category
//! without rejecting anything. The normalizer applies its own, narrower rules;
//! this report is stricter (zero or fractional quantities are flagged, for
//! instance) and is meant for inspecting a source file.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::trade::{non_blank, parse_decimal, parse_timestamp, ClientType, RawTrade, Side};

/// Number of sample rows kept per issue.
const MAX_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatIssue {
    /// Timestamp absent or unparseable
    InvalidTimestamp,
    /// Timestamp later than the reference time
    FutureTimestamp,
    /// Quantity absent, non-numeric, non-positive or fractional
    InvalidQuantity,
    /// Price absent, non-numeric or non-positive
    InvalidPrice,
    /// Side other than buy or sell
    InvalidSide,
    /// Client type other than gold, silver or bronze
    InvalidClientType,
}

impl FormatIssue {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTimestamp => "invalid_timestamp_format",
            Self::FutureTimestamp => "timestamp_in_future",
            Self::InvalidQuantity => "invalid_quantity",
            Self::InvalidPrice => "invalid_price",
            Self::InvalidSide => "invalid_side",
            Self::InvalidClientType => "invalid_client_type",
        }
    }
}

/// Rows affected by one issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueRows {
    pub count: usize,
    /// First affected rows (1-based)
    pub sample_rows: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatReport {
    pub rows_checked: usize,
    pub issues: BTreeMap<FormatIssue, IssueRows>,
}

impl FormatReport {
    /// Checks every row. Timestamps after `now` are flagged only when
    /// `forbid_future` is set.
    #[must_use]
    pub fn check(rows: &[RawTrade], now: NaiveDateTime, forbid_future: bool) -> Self {
        let mut report = Self {
            rows_checked: rows.len(),
            issues: BTreeMap::new(),
        };

        for (index, raw) in rows.iter().enumerate() {
            let row = index + 1;

            match non_blank(raw.timestamp.as_deref()).and_then(parse_timestamp) {
                None => report.flag(FormatIssue::InvalidTimestamp, row),
                Some(ts) if forbid_future && ts > now => {
                    report.flag(FormatIssue::FutureTimestamp, row);
                }
                Some(_) => {}
            }

            let quantity = positive(raw.quantity.as_deref());
            if !quantity.is_some_and(|q| q.fract().is_zero()) {
                report.flag(FormatIssue::InvalidQuantity, row);
            }

            if positive(raw.price.as_deref()).is_none() {
                report.flag(FormatIssue::InvalidPrice, row);
            }

            let side_ok = raw
                .side
                .as_deref()
                .is_some_and(|s| s.parse::<Side>().is_ok());
            if !side_ok {
                report.flag(FormatIssue::InvalidSide, row);
            }

            let client_ok = raw
                .client_type
                .as_deref()
                .is_some_and(|c| ClientType::parse(c).is_known());
            if !client_ok {
                report.flag(FormatIssue::InvalidClientType, row);
            }
        }

        report
    }

    /// Returns true if no issue was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of rows affected by `issue`.
    #[must_use]
    pub fn count(&self, issue: FormatIssue) -> usize {
        self.issues.get(&issue).map_or(0, |rows| rows.count)
    }

    fn flag(&mut self, issue: FormatIssue, row: usize) {
        let entry = self.issues.entry(issue).or_default();
        entry.count += 1;
        if entry.sample_rows.len() < MAX_SAMPLE_ROWS {
            entry.sample_rows.push(row);
        }
    }
}

fn positive(raw: Option<&str>) -> Option<Decimal> {
    non_blank(raw)
        .and_then(|s| parse_decimal("value", s).ok())
        .filter(|v| *v > Decimal::ZERO)
}
