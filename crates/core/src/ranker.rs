//! Top-K ranking of bronze clients.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregator::AggregationTable;
use crate::config::{PipelineConfig, RankLevel};
use crate::error::{checked_accumulate, PipelineError};
use crate::trade::ClientType;

/// Tier the ranking is restricted to.
const RANKED_TIER: ClientType = ClientType::Bronze;

/// One ranked row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    /// 1-based position
    pub rank: usize,
    pub client_type: ClientType,
    pub user_id: String,
    /// `None` for client-level rankings
    pub symbol: Option<String>,
    /// `None` for client-level rankings
    pub week_start: Option<NaiveDate>,
    pub total_volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<Decimal>,
}

/// Selects the top bronze entries from an aggregation table.
///
/// Order: `total_volume` descending, then `total_pnl` descending when both
/// entries carry PnL, then `user_id`, `symbol` and `week_start` ascending.
#[derive(Debug, Clone)]
pub struct Ranker {
    top_k: usize,
    level: RankLevel,
}

impl Ranker {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            top_k: config.top_k,
            level: config.rank_level,
        }
    }

    /// Ranks bronze rows and returns at most `top_k` entries.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if a client-level total leaves
    /// the decimal range.
    pub fn rank(&self, table: &AggregationTable) -> Result<Vec<RankedEntry>, PipelineError> {
        let mut candidates = match self.level {
            RankLevel::Symbol => per_row(table),
            RankLevel::Client => per_client(table)?,
        };

        candidates.sort_by(compare);
        candidates.truncate(self.top_k);
        for (index, entry) in candidates.iter_mut().enumerate() {
            entry.rank = index + 1;
        }

        tracing::debug!(
            ranked = candidates.len(),
            top_k = self.top_k,
            "ranked bronze clients"
        );
        Ok(candidates)
    }
}

fn per_row(table: &AggregationTable) -> Vec<RankedEntry> {
    table
        .iter()
        .filter(|(key, _)| key.client_type == RANKED_TIER)
        .map(|(key, metrics)| RankedEntry {
            rank: 0,
            client_type: key.client_type,
            user_id: key.user_id.clone(),
            symbol: Some(key.symbol.clone()),
            week_start: Some(key.week_start),
            total_volume: metrics.total_volume,
            total_pnl: metrics.total_pnl,
        })
        .collect()
}

fn per_client(table: &AggregationTable) -> Result<Vec<RankedEntry>, PipelineError> {
    let mut clients: BTreeMap<&str, (Decimal, Option<Decimal>)> = BTreeMap::new();
    for (key, metrics) in table.iter().filter(|(key, _)| key.client_type == RANKED_TIER) {
        let (volume, pnl) = clients
            .entry(key.user_id.as_str())
            .or_insert((Decimal::ZERO, metrics.total_pnl.map(|_| Decimal::ZERO)));
        checked_accumulate(volume, metrics.total_volume, || {
            format!("client volume for {}", key.user_id)
        })?;
        if let (Some(sum), Some(value)) = (pnl.as_mut(), metrics.total_pnl) {
            checked_accumulate(sum, value, || format!("client pnl for {}", key.user_id))?;
        }
    }

    Ok(clients
        .into_iter()
        .map(|(user_id, (total_volume, total_pnl))| RankedEntry {
            rank: 0,
            client_type: RANKED_TIER,
            user_id: user_id.to_string(),
            symbol: None,
            week_start: None,
            total_volume,
            total_pnl,
        })
        .collect())
}

fn compare(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.total_volume
        .cmp(&a.total_volume)
        .then_with(|| match (a.total_pnl, b.total_pnl) {
            (Some(pa), Some(pb)) => pb.cmp(&pa),
            _ => Ordering::Equal,
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.week_start.cmp(&b.week_start))
}
