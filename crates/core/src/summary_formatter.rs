#![allow(clippy::format_push_string)]

use crate::normalizer::NormalizationStats;
use crate::ranker::RankedEntry;
use crate::report::Report;

pub struct SummaryFormatter;

impl SummaryFormatter {
    #[must_use]
    pub fn format(report: &Report) -> String {
        let summary = report.summary();
        let mut output = String::new();

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                 WEEKLY TRADE AGGREGATION                      \n");
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push('\n');

        output.push_str("Records\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str(&format!("Rows Read:             {}\n", summary.total_rows));
        output.push_str(&format!("Accepted:              {}\n", summary.accepted));
        output.push_str(&format!("Rejected:              {}\n", summary.rejected));
        if summary.null_timestamp_filled > 0 {
            output.push_str(&format!(
                "Timestamps Filled:     {}\n",
                summary.null_timestamp_filled
            ));
        }
        Self::push_rejections(&mut output, &report.stats);
        output.push('\n');

        output.push_str("Aggregation\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        output.push_str(&format!("Weekly Rows:           {}\n", summary.aggregated_rows));
        output.push_str(&format!("Weeks Covered:         {}\n", report.charts.weekly_volume.len()));
        output.push_str(&format!("Symbols:               {}\n", report.charts.symbol_volume.len()));
        output.push_str(&format!(
            "PnL:                   {}\n",
            if summary.pnl_enabled { "enabled" } else { "disabled" }
        ));
        output.push('\n');

        output.push_str("Top Bronze Clients\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        if report.ranked.is_empty() {
            output.push_str("(no bronze activity)\n");
        }
        for entry in &report.ranked {
            output.push_str(&Self::format_entry(entry));
        }
        output.push('\n');

        output
    }

    fn push_rejections(output: &mut String, stats: &NormalizationStats) {
        let reasons = [
            ("invalid timestamp", stats.invalid_timestamp),
            ("null timestamp", stats.null_timestamp_dropped),
            ("invalid price", stats.invalid_price),
            ("invalid quantity", stats.invalid_quantity),
            ("notional overflow", stats.notional_overflow),
            ("invalid pnl", stats.invalid_pnl),
            ("invalid side", stats.invalid_side),
            ("missing user/symbol", stats.missing_identity),
            ("unknown client type", stats.unknown_client_dropped),
            ("duplicate", stats.duplicates_removed),
        ];
        for (reason, count) in reasons.into_iter().filter(|(_, count)| *count > 0) {
            output.push_str(&format!("  - {reason:<20} {count}\n"));
        }
    }

    fn format_entry(entry: &RankedEntry) -> String {
        let scope = match (&entry.symbol, entry.week_start) {
            (Some(symbol), Some(week)) => format!("{symbol} wk {week}"),
            (Some(symbol), None) => symbol.clone(),
            _ => "all symbols".to_string(),
        };
        let pnl = entry
            .total_pnl
            .map(|pnl| format!("  pnl {pnl:.2}"))
            .unwrap_or_default();
        format!(
            "#{:<3} {:<12} {:<24} volume {:.2}{}\n",
            entry.rank, entry.user_id, scope, entry.total_volume, pnl
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregationTable;
    use crate::trade::ClientType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_lists_ranked_entries_and_rejections() {
        let ranked = vec![RankedEntry {
            rank: 1,
            client_type: ClientType::Bronze,
            user_id: "u7".to_string(),
            symbol: Some("AAPL".to_string()),
            week_start: NaiveDate::from_ymd_opt(2025, 3, 3),
            total_volume: dec!(1234.5),
            total_pnl: Some(dec!(-3)),
        }];
        let stats = NormalizationStats {
            total_rows: 4,
            accepted: 2,
            invalid_price: 2,
            ..NormalizationStats::default()
        };
        let report = Report::assemble(AggregationTable::default(), ranked, stats).unwrap();
        let text = SummaryFormatter::format(&report);

        assert!(text.contains("Rows Read:             4"));
        assert!(text.contains("invalid price"));
        assert!(!text.contains("invalid quantity"));
        assert!(text.contains("u7"));
        assert!(text.contains("AAPL wk 2025-03-03"));
        assert!(text.contains("volume 1234.50"));
        assert!(text.contains("pnl -3.00"));
    }

    #[test]
    fn test_format_without_bronze() {
        let report = Report::assemble(
            AggregationTable::default(),
            Vec::new(),
            NormalizationStats::default(),
        )
        .unwrap();
        assert!(SummaryFormatter::format(&report).contains("(no bronze activity)"));
    }
}
