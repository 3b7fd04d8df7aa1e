//! Weekly aggregation.
//!
//! Trades are grouped by `(week_start, client_type, user_id, symbol)`. Each
//! group keeps an [`Accumulator`] of running sums, finalized into
//! [`AggregatedMetrics`] once every trade has been seen.
//!
//! `avg_price` is the plain mean of trade prices, not a volume-weighted
//! price. Accumulators hold sums and counts only, so partial aggregations
//! merge to exactly the single-pass result.

use std::collections::btree_map::{self, BTreeMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{PipelineConfig, PnlSource};
use crate::error::{checked_accumulate, PipelineError};
use crate::trade::{ClientType, Side, Trade};
use crate::week::WeekAnchor;

/// Identifies one output row.
///
/// Ordering is by week, then tier, user and symbol; the aggregation table is
/// emitted in this order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AggregationKey {
    pub week_start: NaiveDate,
    pub client_type: ClientType,
    pub user_id: String,
    pub symbol: String,
}

/// Metrics for one aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedMetrics {
    /// Sum of `price * quantity`
    pub total_volume: Decimal,
    /// Unweighted mean of trade prices
    pub avg_price: Decimal,
    pub trade_count: u64,
    /// `None` when PnL is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<Decimal>,
}

/// Running sums for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    volume_sum: Decimal,
    price_sum: Decimal,
    count: u64,
    pnl_sum: Option<Decimal>,
}

impl Accumulator {
    fn new(track_pnl: bool) -> Self {
        Self {
            volume_sum: Decimal::ZERO,
            price_sum: Decimal::ZERO,
            count: 0,
            pnl_sum: track_pnl.then_some(Decimal::ZERO),
        }
    }

    fn add(
        &mut self,
        key: &AggregationKey,
        trade: &Trade,
        pnl: Option<Decimal>,
    ) -> Result<(), PipelineError> {
        let notional = trade
            .notional()
            .ok_or_else(|| overflow("trade notional", key))?;
        checked_accumulate(&mut self.volume_sum, notional, || context("total_volume", key))?;
        checked_accumulate(&mut self.price_sum, trade.price, || context("price", key))?;
        if let (Some(sum), Some(pnl)) = (self.pnl_sum.as_mut(), pnl) {
            checked_accumulate(sum, pnl, || context("total_pnl", key))?;
        }
        self.count += 1;
        Ok(())
    }

    /// Folds another accumulator for the same key into this one.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if a combined sum leaves the
    /// decimal range; `self` may then hold partially merged sums.
    pub fn merge(
        &mut self,
        key: &AggregationKey,
        other: &Accumulator,
    ) -> Result<(), PipelineError> {
        checked_accumulate(&mut self.volume_sum, other.volume_sum, || {
            context("total_volume", key)
        })?;
        checked_accumulate(&mut self.price_sum, other.price_sum, || context("price", key))?;
        self.pnl_sum = match (self.pnl_sum, other.pnl_sum) {
            (Some(mut a), Some(b)) => {
                checked_accumulate(&mut a, b, || context("total_pnl", key))?;
                Some(a)
            }
            (a, b) => a.or(b),
        };
        self.count += other.count;
        Ok(())
    }

    /// Number of trades folded in so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    fn finalize(&self) -> AggregatedMetrics {
        AggregatedMetrics {
            total_volume: self.volume_sum,
            avg_price: self.price_sum / Decimal::from(self.count),
            trade_count: self.count,
            total_pnl: self.pnl_sum,
        }
    }
}

/// Partial aggregation state, keyed like the final table.
pub type PartialAggregation = BTreeMap<AggregationKey, Accumulator>;

/// The aggregation result: one row per key, in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationTable {
    rows: BTreeMap<AggregationKey, AggregatedMetrics>,
    pnl_enabled: bool,
}

impl AggregationTable {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true if rows carry `total_pnl`.
    #[must_use]
    pub fn pnl_enabled(&self) -> bool {
        self.pnl_enabled
    }

    #[must_use]
    pub fn get(&self, key: &AggregationKey) -> Option<&AggregatedMetrics> {
        self.rows.get(key)
    }

    /// Iterates rows in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, AggregationKey, AggregatedMetrics> {
        self.rows.iter()
    }

    /// Sum of `trade_count` over all rows.
    #[must_use]
    pub fn total_trades(&self) -> u64 {
        self.rows.values().map(|m| m.trade_count).sum()
    }
}

impl<'a> IntoIterator for &'a AggregationTable {
    type Item = (&'a AggregationKey, &'a AggregatedMetrics);
    type IntoIter = btree_map::Iter<'a, AggregationKey, AggregatedMetrics>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Groups normalized trades into weekly metrics.
#[derive(Debug, Clone)]
pub struct Aggregator {
    anchor: WeekAnchor,
    pnl: Option<PnlSource>,
}

impl Aggregator {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            anchor: config.week_anchor,
            pnl: config.enable_pnl.then_some(config.pnl_source),
        }
    }

    /// Returns the key a trade belongs to.
    #[must_use]
    pub fn key_for(&self, trade: &Trade) -> AggregationKey {
        AggregationKey {
            week_start: self.anchor.week_start(trade.date()),
            client_type: trade.client_type,
            user_id: trade.user_id.clone(),
            symbol: trade.symbol.clone(),
        }
    }

    /// Aggregates trades in a single pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if a group's sums leave the
    /// decimal range.
    pub fn aggregate(&self, trades: &[Trade]) -> Result<AggregationTable, PipelineError> {
        Ok(self.finalize(&self.accumulate(trades)?))
    }

    /// Folds trades into per-key accumulators without finalizing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if a group's sums leave the
    /// decimal range.
    pub fn accumulate(&self, trades: &[Trade]) -> Result<PartialAggregation, PipelineError> {
        let mut groups = PartialAggregation::new();
        for trade in trades {
            let key = self.key_for(trade);
            let pnl = self.trade_pnl(trade, &key)?;
            groups
                .entry(key.clone())
                .or_insert_with(|| Accumulator::new(self.pnl.is_some()))
                .add(&key, trade, pnl)?;
        }
        Ok(groups)
    }

    /// Merges partial aggregations, e.g. from separately processed chunks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Overflow`] if merged sums leave the decimal
    /// range.
    pub fn merge(
        parts: impl IntoIterator<Item = PartialAggregation>,
    ) -> Result<PartialAggregation, PipelineError> {
        let mut merged = PartialAggregation::new();
        for part in parts {
            for (key, acc) in part {
                if let Some(existing) = merged.get_mut(&key) {
                    existing.merge(&key, &acc)?;
                } else {
                    merged.insert(key, acc);
                }
            }
        }
        Ok(merged)
    }

    /// Turns accumulators into final metrics. Empty groups are skipped.
    #[must_use]
    pub fn finalize(&self, groups: &PartialAggregation) -> AggregationTable {
        let rows: BTreeMap<_, _> = groups
            .iter()
            .filter(|(_, acc)| acc.count() > 0)
            .map(|(key, acc)| (key.clone(), acc.finalize()))
            .collect();

        tracing::debug!(rows = rows.len(), "aggregated weekly metrics");

        AggregationTable {
            rows,
            pnl_enabled: self.pnl.is_some(),
        }
    }

    fn trade_pnl(
        &self,
        trade: &Trade,
        key: &AggregationKey,
    ) -> Result<Option<Decimal>, PipelineError> {
        let Some(source) = self.pnl else {
            return Ok(None);
        };
        Ok(match source {
            PnlSource::Column => trade.pnl,
            PnlSource::Cashflow => {
                let notional = trade
                    .notional()
                    .ok_or_else(|| overflow("trade notional", key))?;
                Some(match trade.side {
                    Some(Side::Sell) => notional,
                    _ => -notional,
                })
            }
        })
    }
}

fn context(what: &str, key: &AggregationKey) -> String {
    format!(
        "{what} for {} {} {} week {}",
        key.client_type, key.user_id, key.symbol, key.week_start
    )
}

fn overflow(what: &str, key: &AggregationKey) -> PipelineError {
    PipelineError::overflow(context(what, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};
    use rust_decimal_macros::dec;

    fn trade(
        day: u32,
        user: &str,
        client: ClientType,
        symbol: &str,
        price: Decimal,
        qty: Decimal,
    ) -> Trade {
        Trade {
            timestamp: NaiveDate::from_ymd_opt(2025, 3, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            user_id: user.to_string(),
            client_type: client,
            symbol: symbol.to_string(),
            side: Some(Side::Buy),
            price,
            quantity: qty,
            pnl: None,
        }
    }

    fn key(week_day: u32, client: ClientType, user: &str, symbol: &str) -> AggregationKey {
        AggregationKey {
            week_start: NaiveDate::from_ymd_opt(2025, 3, week_day).unwrap(),
            client_type: client,
            user_id: user.to_string(),
            symbol: symbol.to_string(),
        }
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        let table = Aggregator::new(&PipelineConfig::default()).aggregate(&[]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.total_trades(), 0);
    }

    #[test]
    fn test_avg_price_is_unweighted_mean() {
        // weighted mean would be (10*1 + 20*3) / 4 = 17.5
        let trades = vec![
            trade(4, "u1", ClientType::Gold, "AAPL", dec!(10), dec!(1)),
            trade(5, "u1", ClientType::Gold, "AAPL", dec!(20), dec!(3)),
        ];
        let table = Aggregator::new(&PipelineConfig::default()).aggregate(&trades).unwrap();

        assert_eq!(table.len(), 1);
        let metrics = table.get(&key(3, ClientType::Gold, "u1", "AAPL")).unwrap();
        assert_eq!(metrics.avg_price, dec!(15));
        assert_eq!(metrics.total_volume, dec!(70));
        assert_eq!(metrics.trade_count, 2);
    }

    #[test]
    fn test_groups_split_by_week_client_user_symbol() {
        let trades = vec![
            trade(3, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(9, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(10, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(4, "u1", ClientType::Gold, "MSFT", dec!(1), dec!(1)),
            trade(4, "u2", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(4, "u1", ClientType::Silver, "AAPL", dec!(1), dec!(1)),
        ];
        let table = Aggregator::new(&PipelineConfig::default()).aggregate(&trades).unwrap();

        assert_eq!(table.len(), 5);
        assert_eq!(
            table.get(&key(3, ClientType::Gold, "u1", "AAPL")).unwrap().trade_count,
            2
        );
        assert_eq!(
            table.get(&key(10, ClientType::Gold, "u1", "AAPL")).unwrap().trade_count,
            1
        );
        assert_eq!(table.total_trades(), trades.len() as u64);
    }

    #[test]
    fn test_rows_emitted_in_key_order() {
        let trades = vec![
            trade(10, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(3, "u2", ClientType::Gold, "AAPL", dec!(1), dec!(1)),
            trade(3, "u1", ClientType::Gold, "MSFT", dec!(1), dec!(1)),
        ];
        let table = Aggregator::new(&PipelineConfig::default()).aggregate(&trades).unwrap();
        let keys: Vec<_> = table.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                key(3, ClientType::Gold, "u1", "MSFT"),
                key(3, ClientType::Gold, "u2", "AAPL"),
                key(10, ClientType::Gold, "u1", "AAPL"),
            ]
        );
    }

    #[test]
    fn test_pnl_sums_present_values_only() {
        let mut with_pnl = trade(4, "u1", ClientType::Bronze, "AAPL", dec!(1), dec!(1));
        with_pnl.pnl = Some(dec!(2.5));
        let mut other = with_pnl.clone();
        other.pnl = Some(dec!(-1));
        let without = trade(4, "u1", ClientType::Bronze, "AAPL", dec!(1), dec!(1));

        let table = Aggregator::new(&PipelineConfig::default())
            .aggregate(&[with_pnl, other, without])
            .unwrap();
        let metrics = table.get(&key(3, ClientType::Bronze, "u1", "AAPL")).unwrap();
        assert_eq!(metrics.total_pnl, Some(dec!(1.5)));
        assert_eq!(metrics.trade_count, 3);
    }

    #[test]
    fn test_disabled_pnl_is_absent() {
        let mut t = trade(4, "u1", ClientType::Bronze, "AAPL", dec!(1), dec!(1));
        t.pnl = Some(dec!(9));
        let config = PipelineConfig {
            enable_pnl: false,
            ..PipelineConfig::default()
        };
        let table = Aggregator::new(&config).aggregate(&[t]).unwrap();

        assert!(!table.pnl_enabled());
        assert!(table.iter().all(|(_, m)| m.total_pnl.is_none()));

        let json = serde_json::to_value(table.iter().next().unwrap().1).unwrap();
        assert!(json.get("total_pnl").is_none());
    }

    #[test]
    fn test_cashflow_pnl_source() {
        let buy = trade(4, "u1", ClientType::Gold, "AAPL", dec!(10), dec!(2));
        let mut sell = trade(4, "u1", ClientType::Gold, "AAPL", dec!(12), dec!(2));
        sell.side = Some(Side::Sell);
        let mut unsided = trade(4, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1));
        unsided.side = None;

        let config = PipelineConfig {
            pnl_source: PnlSource::Cashflow,
            ..PipelineConfig::default()
        };
        let table = Aggregator::new(&config).aggregate(&[buy, sell, unsided]).unwrap();
        let metrics = table.get(&key(3, ClientType::Gold, "u1", "AAPL")).unwrap();
        // -20 + 24 - 1
        assert_eq!(metrics.total_pnl, Some(dec!(3)));
    }

    #[test]
    fn test_week_anchor_applied() {
        let config = PipelineConfig {
            week_anchor: WeekAnchor::new(Weekday::Sun),
            ..PipelineConfig::default()
        };
        // 2025-03-09 is a Sunday
        let trades = vec![trade(9, "u1", ClientType::Gold, "AAPL", dec!(1), dec!(1))];
        let table = Aggregator::new(&config).aggregate(&trades).unwrap();
        assert!(table.get(&key(9, ClientType::Gold, "u1", "AAPL")).is_some());
    }

    #[test]
    fn test_merged_partials_match_single_pass() {
        let trades: Vec<Trade> = (0..9u32)
            .map(|i| {
                let mut t = trade(
                    3 + i % 7,
                    if i % 2 == 0 { "u1" } else { "u2" },
                    ClientType::Bronze,
                    "AAPL",
                    Decimal::from(i + 1) / dec!(4),
                    Decimal::from(i + 2),
                );
                t.pnl = Some(Decimal::from(i));
                t
            })
            .collect();

        let aggregator = Aggregator::new(&PipelineConfig::default());
        let single = aggregator.aggregate(&trades).unwrap();

        let parts: Vec<PartialAggregation> = trades
            .chunks(4)
            .map(|chunk| aggregator.accumulate(chunk))
            .collect::<Result<_, _>>()
            .unwrap();
        let merged = aggregator.finalize(&Aggregator::merge(parts).unwrap());

        assert_eq!(single, merged);
    }

    #[test]
    fn test_volume_overflow_is_an_error() {
        let huge = Decimal::from_str_exact("70000000000000000000000000000").unwrap();
        let trades = vec![
            trade(4, "u1", ClientType::Bronze, "AAPL", huge, dec!(1)),
            trade(5, "u1", ClientType::Bronze, "AAPL", huge, dec!(1)),
        ];
        let err = Aggregator::new(&PipelineConfig::default())
            .aggregate(&trades)
            .unwrap_err();

        match err {
            PipelineError::Overflow { context } => {
                assert!(context.contains("total_volume"));
                assert!(context.contains("u1"));
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_unrepresentable_notional_is_an_error() {
        let big = Decimal::from(1_000_000_000_000_000_i64);
        let trades = vec![trade(4, "u1", ClientType::Gold, "AAPL", big, big)];
        let result = Aggregator::new(&PipelineConfig::default()).aggregate(&trades);
        assert!(matches!(result, Err(PipelineError::Overflow { .. })));
    }

    #[test]
    fn test_pnl_overflow_is_an_error() {
        let mut first = trade(4, "u1", ClientType::Bronze, "AAPL", dec!(1), dec!(1));
        first.pnl = Some(Decimal::MAX);
        let mut second = first.clone();
        second.pnl = Some(Decimal::ONE);

        let err = Aggregator::new(&PipelineConfig::default())
            .aggregate(&[first, second])
            .unwrap_err();
        assert!(err.to_string().contains("total_pnl"));
    }

    #[test]
    fn test_merge_overflow_is_an_error() {
        let huge = Decimal::from_str_exact("70000000000000000000000000000").unwrap();
        let aggregator = Aggregator::new(&PipelineConfig::default());
        let part = aggregator
            .accumulate(&[trade(4, "u1", ClientType::Gold, "AAPL", huge, dec!(1))])
            .unwrap();

        let result = Aggregator::merge([part.clone(), part]);
        assert!(matches!(result, Err(PipelineError::Overflow { .. })));
    }
}
