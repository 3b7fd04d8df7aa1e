use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trade_etl_core::{
    AggregationKey, ClientType, FillValue, NullTimestampPolicy, Pipeline, PipelineConfig,
    PipelineError, RankLevel, RawTrade,
};

fn row(
    ts: &str,
    user: &str,
    client: &str,
    symbol: &str,
    price: &str,
    qty: &str,
    pnl: &str,
) -> RawTrade {
    RawTrade {
        timestamp: Some(ts.to_string()),
        user_id: Some(user.to_string()),
        client_type: Some(client.to_string()),
        symbol: Some(symbol.to_string()),
        side: Some("buy".to_string()),
        price: Some(price.to_string()),
        quantity: Some(qty.to_string()),
        pnl: Some(pnl.to_string()),
    }
}

fn week(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_batch() -> Vec<RawTrade> {
    vec![
        row("2025-03-03 09:00:00", "alice", "bronze", "aapl", "10", "5", "1"),
        row("2025-03-04 10:30:00", "alice", "bronze", "AAPL", "20", "1", "-2"),
        row("2025-03-05 11:00:00", "bob", "bronze", "MSFT", "300", "1", "4"),
        row("2025-03-10 12:00:00", "carol", "gold", "MSFT", "310", "2", ""),
        row("2025-03-11 13:00:00", "dave", "silver", "TSLA", "200", "1", "7"),
        row("2025-03-12 14:00:00", "erin", "bronze", "TSLA", "abc", "1", "0"),
        row("2025-03-12 15:00:00", "frank", "bronze", "TSLA", "150", "-1", "0"),
        row("", "gina", "bronze", "AAPL", "12", "3", "2"),
    ]
}

fn config(policy: NullTimestampPolicy) -> PipelineConfig {
    PipelineConfig {
        null_timestamp_policy: policy,
        ..PipelineConfig::default()
    }
}

#[test]
fn trade_counts_sum_to_accepted_trades() {
    let report = Pipeline::new(PipelineConfig::default())
        .run(&sample_batch())
        .unwrap();

    assert_eq!(report.stats.accepted, 5);
    assert_eq!(report.table.total_trades(), report.stats.accepted as u64);
    assert_eq!(
        report.stats.accepted + report.stats.rejected(),
        report.stats.total_rows
    );
    assert!(report.table.iter().all(|(_, m)| m.trade_count >= 1));
}

#[test]
fn volume_and_unweighted_mean_reconstruct_from_members() {
    let report = Pipeline::new(PipelineConfig::default())
        .run(&sample_batch())
        .unwrap();

    let key = AggregationKey {
        week_start: week(2025, 3, 3),
        client_type: ClientType::Bronze,
        user_id: "alice".to_string(),
        symbol: "AAPL".to_string(),
    };
    let metrics = report.table.get(&key).unwrap();

    assert_eq!(metrics.trade_count, 2);
    assert_eq!(metrics.total_volume, dec!(70));
    // (10 + 20) / 2, not (10*5 + 20*1) / 6
    assert_eq!(metrics.avg_price, dec!(15));
    assert_eq!(metrics.total_pnl, Some(dec!(-1)));
}

#[test]
fn repeated_runs_are_identical() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let first = pipeline.run(&sample_batch()).unwrap();
    let second = pipeline.run(&sample_batch()).unwrap();
    assert_eq!(first, second);
}

fn three_rows_one_null() -> Vec<RawTrade> {
    vec![
        row("2025-03-05 10:00:00", "u1", "bronze", "AAPL", "10", "1", "1"),
        row("", "u2", "bronze", "AAPL", "20", "1", "1"),
        row("2025-03-12 10:00:00", "u3", "bronze", "AAPL", "30", "1", "1"),
    ]
}

#[test]
fn null_timestamp_drop_policy() {
    let report = Pipeline::new(config(NullTimestampPolicy::Drop))
        .run(&three_rows_one_null())
        .unwrap();
    assert_eq!(report.table.total_trades(), 2);
    assert_eq!(report.stats.null_timestamp_dropped, 1);
}

#[test]
fn null_timestamp_fill_policy_groups_into_earliest_week() {
    let policy = NullTimestampPolicy::Fill(FillValue::EarliestObserved);
    let report = Pipeline::new(config(policy))
        .run(&three_rows_one_null())
        .unwrap();

    assert_eq!(report.table.total_trades(), 3);
    let filled = AggregationKey {
        week_start: week(2025, 3, 3),
        client_type: ClientType::Bronze,
        user_id: "u2".to_string(),
        symbol: "AAPL".to_string(),
    };
    assert_eq!(report.table.get(&filled).unwrap().trade_count, 1);
}

#[test]
fn null_timestamp_error_policy_is_fatal() {
    let result = Pipeline::new(config(NullTimestampPolicy::Error)).run(&three_rows_one_null());
    match result {
        Err(PipelineError::Validation { policy, count, rows }) => {
            assert_eq!(policy, "error");
            assert_eq!(count, 1);
            assert_eq!(rows, vec![2]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

fn bronze_rows(volumes: &[u32], pnls: &[i32]) -> Vec<RawTrade> {
    volumes
        .iter()
        .zip(pnls)
        .enumerate()
        .map(|(i, (volume, pnl))| {
            row(
                "2025-03-04",
                &format!("user{i}"),
                "bronze",
                "AAPL",
                &volume.to_string(),
                "1",
                &pnl.to_string(),
            )
        })
        .collect()
}

#[test]
fn ranker_breaks_volume_ties_on_pnl() {
    let rows = bronze_rows(&[100, 100, 90, 80, 70], &[5, 10, 1, 2, 3]);
    let report = Pipeline::new(PipelineConfig::default()).run(&rows).unwrap();

    let ranked: Vec<(Decimal, Option<Decimal>)> = report
        .ranked
        .iter()
        .map(|e| (e.total_volume, e.total_pnl))
        .collect();
    assert_eq!(
        ranked,
        vec![
            (dec!(100), Some(dec!(10))),
            (dec!(100), Some(dec!(5))),
            (dec!(90), Some(dec!(1))),
        ]
    );
}

#[test]
fn ranker_returns_fewer_than_k_without_error() {
    let rows = bronze_rows(&[100, 50], &[1, 1]);
    let report = Pipeline::new(PipelineConfig::default()).run(&rows).unwrap();
    assert_eq!(report.ranked.len(), 2);
}

#[test]
fn disabling_pnl_removes_column_and_pnl_tie_break() {
    let rows = bronze_rows(&[100, 100, 90], &[5, 10, 1]);
    let report = Pipeline::new(PipelineConfig {
        enable_pnl: false,
        ..PipelineConfig::default()
    })
    .run(&rows)
    .unwrap();

    assert!(!report.table.pnl_enabled());
    assert!(report.table.iter().all(|(_, m)| m.total_pnl.is_none()));
    // user0 and user1 tie on volume; without PnL the user id decides
    assert_eq!(report.ranked[0].user_id, "user0");
    assert_eq!(report.ranked[1].user_id, "user1");
    assert!(report.ranked.iter().all(|e| e.total_pnl.is_none()));
}

#[test]
fn client_level_ranking_matches_per_user_totals() {
    let report = Pipeline::new(PipelineConfig {
        rank_level: RankLevel::Client,
        ..PipelineConfig::default()
    })
    .run(&sample_batch())
    .unwrap();

    let users: Vec<&str> = report.ranked.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(users, vec!["bob", "alice"]);
    assert_eq!(report.ranked[1].total_volume, dec!(70));
}
