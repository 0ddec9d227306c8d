//! End-to-end pipeline runs over a static market and an in-memory store

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use engine::strategies::Bar;
use engine::{
    Category, EngineConfig, Pipeline, SignalExitReason, SignalStatus, StaticProvider, StrategyDef,
    StrategyRegistry, SyntheticProvider, TradeExitReason,
};
use persistence::repository::{
    ResultsRepository, SignalRepository, TournamentEntryRecord, TournamentRecord, TournamentRepository,
};
use persistence::Database;
use rust_decimal::Decimal;

const HOUR_MS: i64 = 3_600_000;

fn config(pairs: &[&str]) -> EngineConfig {
    EngineConfig {
        pairs: pairs.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

/// Flat at 100 through bar 59, then rising 0.1 per bar with a constant
/// two-point range
fn ema_cross_series() -> Vec<engine::Candle> {
    (0..100)
        .map(|i| {
            let close = if i < 60 { 100.0 } else { 100.0 + 0.1 * (i as f64 - 59.0) };
            let open = if i <= 60 { 100.0 } else { 100.0 + 0.1 * (i as f64 - 60.0) };
            engine::Candle::new(i * HOUR_MS, open, close + 1.0, close - 1.0, close, 1_000.0)
        })
        .collect()
}

fn flat_series(n: i64) -> Vec<engine::Candle> {
    (0..n)
        .map(|i| engine::Candle::new(i * HOUR_MS, 100.0, 101.0, 99.0, 100.0, 1_000.0))
        .collect()
}

#[tokio::test]
async fn ema_cross_produces_one_deterministic_trade() {
    let db = Database::in_memory().await.unwrap();
    let provider = StaticProvider::new().with_candles("X", ema_cross_series());
    let registry = StrategyRegistry::builtin().subset(["ema_cross_9_21"]);
    let pipeline = Pipeline::new(config(&["X"]), Arc::new(provider), db.pool_clone(), registry);

    let report = pipeline.run_backtest("X", 60).await;
    assert!(report.run.is_clean());
    assert_eq!(report.results.len(), 1);

    let result = &report.results[0];
    assert_eq!(result.total_trades, 1);
    let trade = &result.trades[0];
    assert_eq!(trade.entry_index, 60);
    assert!((trade.entry_price - 100.1).abs() < 1e-9);
    // ATR is a constant 2: TP at +6, initial stop at -3
    assert!((trade.tp_price - 106.1).abs() < 1e-9);
    assert!((trade.initial_sl - 97.1).abs() < 1e-9);
    // Neither level is reached before the data ends
    assert_eq!(trade.exit_reason, TradeExitReason::End);
    assert_eq!(trade.exit_index, 99);
    assert_eq!(trade.bars_held, 39);
    let expected = (104.0 - 100.1) / 100.1 * 100.0;
    assert!((trade.pnl_pct - expected).abs() < 1e-9, "pnl {}", trade.pnl_pct);
    assert!((result.total_return - expected).abs() < 1e-9);
    assert_eq!(result.wins, 1);
    assert_eq!(result.profit_factor, 99.0);

    let stored = ResultsRepository::new(db.pool()).get_for_pair("X", 60).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].strategy_id, "ema_cross_9_21");
    assert_eq!(stored[0].total_trades, 1);
}

fn on_last(b: &Bar) -> bool {
    b.i + 1 == b.ind.len()
}

fn one_back(b: &Bar) -> bool {
    b.i + 2 == b.ind.len()
}

fn two_back(b: &Bar) -> bool {
    b.i + 3 == b.ind.len()
}

fn confluence_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    for def in [
        StrategyDef::new("s1", "Survivor One", Category::Trend, 2.0, 1.0, on_last),
        StrategyDef::new("s2", "Survivor Two", Category::Momentum, 3.0, 1.5, one_back),
        StrategyDef::new("s3", "Survivor Three", Category::Volume, 4.0, 2.0, two_back),
    ] {
        registry.register(Arc::new(def)).unwrap();
    }
    registry
}

async fn seed_tournament(db: &Database, ids: &[&str]) {
    let header = TournamentRecord {
        tournament_id: "seeded".to_string(),
        strategies_tested: ids.len() as i64,
        survivors: ids.len() as i64,
        winners: ids.len() as i64,
        survivors_per_round: "[]".to_string(),
        config_json: "{}".to_string(),
        created_at: 1,
    };
    let entries: Vec<TournamentEntryRecord> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| TournamentEntryRecord {
            id: None,
            tournament_id: "seeded".to_string(),
            strategy_id: id.to_string(),
            strategy_name: id.to_string(),
            category: "trend".to_string(),
            pairs_tested: 1,
            pairs_profitable: 1,
            total_trades: 20,
            avg_win_rate: 55.0,
            avg_profit_factor: 1.5,
            avg_sharpe: 0.5,
            avg_return: 5.0,
            avg_max_drawdown: 5.0,
            final_action: "WINNER".to_string(),
            eliminated_round: None,
            composite_score: Some(40.0 - i as f64),
            rank: Some(i as i64 + 1),
        })
        .collect();
    TournamentRepository::new(db.pool())
        .save(&header, &entries, &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn confluence_creates_single_signal_and_monitor_resolves_once() {
    let db = Database::in_memory().await.unwrap();
    seed_tournament(&db, &["s1", "s2", "s3"]).await;
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let scanner = Pipeline::new(
        config(&["X"]),
        Arc::new(StaticProvider::new().with_candles("X", flat_series(80))),
        db.pool_clone(),
        confluence_registry(),
    );
    let report = scanner.live_scan(created).await.unwrap();
    assert_eq!(report.tournament_id.as_deref(), Some("seeded"));
    assert_eq!(report.survivors, 3);
    assert_eq!(report.signals.len(), 1);

    let signal = &report.signals[0];
    assert_eq!(signal.status, SignalStatus::Active);
    assert_eq!(signal.confluence_count, 3);
    assert_eq!(signal.confidence, 80);
    assert_eq!(
        signal.contributing_strategies,
        vec!["Survivor One", "Survivor Two", "Survivor Three"]
    );

    // A second scan while the signal is open is suppressed
    let again = scanner.live_scan(created + Duration::hours(1)).await.unwrap();
    assert!(again.signals.is_empty());
    assert_eq!(again.run.skipped.len(), 1);
    let signals = SignalRepository::new(db.pool());
    assert_eq!(signals.get_all().await.unwrap().len(), 1);

    // Price through the take-profit
    let tp = signal.tp_price;
    let price: f64 = (tp + Decimal::ONE).to_string().parse().unwrap();
    let monitor = Pipeline::new(
        config(&["X"]),
        Arc::new(StaticProvider::new().with_price("X", price)),
        db.pool_clone(),
        confluence_registry(),
    );
    let first = monitor.monitor(created + Duration::hours(2)).await.unwrap();
    assert_eq!(first.checked, 1);
    assert_eq!(first.resolved.len(), 1);
    assert_eq!(first.resolved[0].exit_reason, Some(SignalExitReason::TpHit));

    let second = monitor.monitor(created + Duration::hours(3)).await.unwrap();
    assert_eq!(second.checked, 0);
    assert!(second.resolved.is_empty());

    let stored = signals.get_all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, "RESOLVED");
    assert_eq!(stored[0].exit_reason.as_deref(), Some("TP_HIT"));
    assert_eq!(stored[0].check_count, 1);

    let stats = monitor.signal_stats().await.unwrap();
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.tp_hits, 1);
    assert_eq!(stats.wins, 1);

    // With the signal resolved, a fresh confluence opens a new one
    let reopened = scanner.live_scan(created + Duration::hours(4)).await.unwrap();
    assert_eq!(reopened.signals.len(), 1);
}

#[tokio::test]
async fn expired_signal_resolves_at_max_hold() {
    let db = Database::in_memory().await.unwrap();
    seed_tournament(&db, &["s1", "s2"]).await;
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let scanner = Pipeline::new(
        config(&["X"]),
        Arc::new(StaticProvider::new().with_candles("X", flat_series(80))),
        db.pool_clone(),
        confluence_registry(),
    );
    assert_eq!(scanner.live_scan(created).await.unwrap().signals.len(), 1);

    let monitor = Pipeline::new(
        config(&["X"]),
        Arc::new(StaticProvider::new().with_price("X", 100.5)),
        db.pool_clone(),
        confluence_registry(),
    );
    let early = monitor.monitor(created + Duration::hours(10)).await.unwrap();
    assert_eq!(early.still_active, 1);
    let late = monitor.monitor(created + Duration::hours(72)).await.unwrap();
    assert_eq!(late.resolved.len(), 1);
    assert_eq!(late.resolved[0].exit_reason, Some(SignalExitReason::Expired));
    assert_eq!(late.resolved[0].check_count, 2);
}

#[tokio::test]
async fn full_cycle_over_synthetic_market() {
    let db = Database::in_memory().await.unwrap();
    let provider = SyntheticProvider::new(11, 600, 1_760_000_000_000);
    let pairs = ["BTCUSDT", "ETHUSDT"];
    let pipeline = Pipeline::new(
        config(&pairs),
        Arc::new(provider),
        db.pool_clone(),
        StrategyRegistry::builtin(),
    );

    let backtests = pipeline.run_backtests().await;
    assert!(backtests.run.is_clean());
    assert_eq!(backtests.rows_written, 200);

    let first = pipeline.run_tournament().await.unwrap();
    let second = pipeline.run_tournament().await.unwrap();
    assert_eq!(first.rows_loaded, 200);
    assert_eq!(first.outcome.tournament_id, second.outcome.tournament_id);
    assert_eq!(first.outcome.entries, second.outcome.entries);
    assert_eq!(first.outcome.entries.len(), 100);
    assert!(first
        .outcome
        .survivors_per_round
        .windows(2)
        .all(|w| w[1] <= w[0]));

    let now = Utc::now();
    let scan = pipeline.live_scan(now).await.unwrap();
    assert!(scan.run.is_clean());
    assert!(scan.signals.len() <= pairs.len());
    for signal in &scan.signals {
        assert!(signal.confluence_count >= 2);
        assert!(signal.tp_price > signal.entry_price && signal.sl_price < signal.entry_price);
    }

    let monitored = pipeline.monitor(now + Duration::minutes(5)).await.unwrap();
    assert_eq!(monitored.checked, scan.signals.len());
}
