//! Trade data model.
//!
//! [`RawTrade`] is a row exactly as read from the source, every field still
//! text. [`Trade`] is the validated, typed record the aggregator consumes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Naive layouts accepted for the timestamp column, tried in order.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// A raw trade row with every field still unparsed.
///
/// Missing columns deserialize to `None`, so the same type works for sources
/// with or without the optional `side` and `pnl` columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrade {
    pub timestamp: Option<String>,
    pub user_id: Option<String>,
    pub client_type: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub pnl: Option<String>,
}

impl RawTrade {
    /// Returns true if the timestamp is absent or blank.
    #[must_use]
    pub fn has_null_timestamp(&self) -> bool {
        non_blank(self.timestamp.as_deref()).is_none()
    }
}

/// Client tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Gold,
    Silver,
    Bronze,
    Unknown,
}

impl ClientType {
    /// Maps a raw tier label onto a tier; unrecognised labels become `Unknown`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "gold" => Self::Gold,
            "silver" => Self::Silver,
            "bronze" => Self::Bronze,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Bronze => "bronze",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for gold, silver and bronze.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(RecordError::invalid("side", s)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub user_id: String,
    pub client_type: ClientType,
    /// Uppercased ticker
    pub symbol: String,
    pub side: Option<Side>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pnl: Option<Decimal>,
}

impl Trade {
    /// Returns the traded notional (`price * quantity`), or `None` if it
    /// does not fit in a decimal.
    #[must_use]
    pub fn notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.quantity)
    }

    /// Returns the calendar date of the trade.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Parses a timestamp in any of the accepted layouts.
///
/// RFC 3339 values carrying an offset are converted to UTC and stripped of
/// the offset; a bare date maps to midnight.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parses a decimal, accepting scientific notation.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, RecordError> {
    let s = raw.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| RecordError::invalid(field, raw))
}

/// Returns the trimmed value if it is present and not blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
