//! Orchestration of the four pipeline stages against a provider and the store
//!
//! Every entry point absorbs failures at the smallest unit (a pair, a row,
//! a signal) and lists them in its report. Only a failure to read the
//! store's input snapshot ends a run early.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use persistence::repository::{ResultsRepository, SignalRepository, TournamentRepository};
use persistence::SqlitePool;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backtest::run_strategy;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::indicators::IndicatorBundle;
use crate::monitor::{check_signal, CheckOutcome};
use crate::provider::{fetch_candles_all, fetch_prices_all, MarketDataProvider};
use crate::records::{
    record_to_result, result_to_record, signal_from_record, signal_to_record, tournament_records,
};
use crate::scanner::scan_pair;
use crate::stats::{self, SignalStats};
use crate::strategies::{Strategy, StrategyRegistry};
use crate::tournament::{run_tournament, TournamentOutcome};
use crate::types::{to_decimal, Candle, Signal, StrategyResult};

/// A unit of work that did not complete, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitIssue {
    pub unit: String,
    pub reason: String,
}

/// Succeeded, skipped and failed units of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub skipped: Vec<UnitIssue>,
    pub failed: Vec<UnitIssue>,
}

impl RunReport {
    fn ok(&mut self, unit: impl Into<String>) {
        self.succeeded.push(unit.into());
    }

    fn skip(&mut self, unit: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(UnitIssue {
            unit: unit.into(),
            reason: reason.into(),
        });
    }

    fn fail(&mut self, unit: impl Into<String>, error: &EngineError) {
        let unit = unit.into();
        warn!(unit = %unit, error = %error, "Unit failed");
        self.failed.push(UnitIssue {
            unit,
            reason: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestReport {
    pub run: RunReport,
    /// Aggregates written this run, trades included
    pub results: Vec<StrategyResult>,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentReport {
    pub rows_loaded: usize,
    pub outcome: TournamentOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub run: RunReport,
    pub tournament_id: Option<String>,
    pub survivors: usize,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorReport {
    pub run: RunReport,
    pub checked: usize,
    pub still_active: usize,
    pub resolved: Vec<Signal>,
}

/// The evaluation pipeline wired to a data provider and the SQLite store
pub struct Pipeline {
    config: EngineConfig,
    provider: Arc<dyn MarketDataProvider>,
    pool: SqlitePool,
    registry: StrategyRegistry,
}

impl Pipeline {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn MarketDataProvider>,
        pool: SqlitePool,
        registry: StrategyRegistry,
    ) -> Self {
        Self {
            config,
            provider,
            pool,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.fetch_timeout_secs)
    }

    async fn fetch_candles(
        &self,
        pairs: &[String],
        timeframe: u32,
    ) -> Vec<(String, EngineResult<Vec<Candle>>)> {
        fetch_candles_all(
            self.provider.as_ref(),
            pairs,
            timeframe,
            self.config.max_concurrent_fetches,
            self.fetch_timeout(),
        )
        .await
    }

    // ========================================================================
    // Backtest
    // ========================================================================

    /// Backtest every registered strategy on one pair
    pub async fn run_backtest(&self, pair: &str, timeframe: u32) -> BacktestReport {
        let pairs = [pair.to_string()];
        self.backtest_pairs(&pairs, timeframe).await
    }

    /// Backtest every registered strategy on every configured pair
    pub async fn run_backtests(&self) -> BacktestReport {
        self.backtest_pairs(&self.config.pairs, self.config.timeframe).await
    }

    async fn backtest_pairs(&self, pairs: &[String], timeframe: u32) -> BacktestReport {
        let mut report = BacktestReport::default();
        let repo = ResultsRepository::new(&self.pool);

        for (pair, fetched) in self.fetch_candles(pairs, timeframe).await {
            let candles = match fetched {
                Ok(candles) => candles,
                Err(e) => {
                    report.run.fail(&pair, &e);
                    continue;
                }
            };

            let required = self.config.backtest.warmup_bars + 1;
            if candles.len() < required {
                let e = EngineError::InsufficientHistory {
                    pair: pair.clone(),
                    bars: candles.len(),
                    required,
                };
                report.run.skip(&pair, e.to_string());
                continue;
            }

            let bundle = IndicatorBundle::new(&candles);
            let updated_at = Utc::now().timestamp_millis();
            let mut pair_failures = 0usize;
            let mut pair_trades = 0u32;

            for strategy in self.registry.iter() {
                let result = run_strategy(
                    strategy.as_ref(),
                    &bundle,
                    &pair,
                    timeframe,
                    &self.config.backtest,
                );
                debug!(
                    pair = %pair,
                    strategy = strategy.id(),
                    trades = result.total_trades,
                    total_return = result.total_return,
                    "Backtest complete"
                );

                match repo.upsert(&result_to_record(&result, updated_at)).await {
                    Ok(()) => report.rows_written += 1,
                    Err(e) => {
                        pair_failures += 1;
                        report
                            .run
                            .fail(format!("{pair}/{}", strategy.id()), &EngineError::from(e));
                        continue;
                    }
                }
                pair_trades += result.total_trades;
                report.results.push(result);
            }

            info!(
                pair = %pair,
                bars = candles.len(),
                strategies = self.registry.len(),
                trades = pair_trades,
                failures = pair_failures,
                "Pair backtested"
            );
            report.run.ok(pair);
        }

        report
    }

    // ========================================================================
    // Tournament
    // ========================================================================

    /// Run the tournament over every stored result and persist the outcome
    pub async fn run_tournament(&self) -> EngineResult<TournamentReport> {
        let rows: Vec<StrategyResult> = ResultsRepository::new(&self.pool)
            .get_all()
            .await?
            .into_iter()
            .map(record_to_result)
            .collect();

        let outcome = run_tournament(&rows, &self.config.tournament);
        let (header, entries, rounds) = tournament_records(
            &outcome,
            &self.config.tournament,
            Utc::now().timestamp_millis(),
        );
        TournamentRepository::new(&self.pool)
            .save(&header, &entries, &rounds)
            .await?;

        info!(
            tournament_id = %outcome.tournament_id,
            rows = rows.len(),
            strategies = outcome.entries.len(),
            survivors = header.survivors,
            winners = header.winners,
            "Tournament complete"
        );

        Ok(TournamentReport {
            rows_loaded: rows.len(),
            outcome,
        })
    }

    // ========================================================================
    // Live scan
    // ========================================================================

    /// Scan every configured pair with the latest tournament's survivors
    pub async fn live_scan(&self, now: DateTime<Utc>) -> EngineResult<ScanReport> {
        let mut report = ScanReport::default();
        let tournaments = TournamentRepository::new(&self.pool);

        let Some(tournament) = tournaments.latest().await? else {
            warn!("No tournament has been run; nothing to scan");
            report.run.skip("scan", "no tournament has been run");
            return Ok(report);
        };

        let survivor_ids: Vec<String> = tournaments
            .get_survivors(&tournament.tournament_id)
            .await?
            .into_iter()
            .map(|e| e.strategy_id)
            .collect();
        let subset = self.registry.subset(survivor_ids.iter().map(String::as_str));
        if subset.len() < survivor_ids.len() {
            warn!(
                stored = survivor_ids.len(),
                registered = subset.len(),
                "Some survivors are no longer registered"
            );
        }
        let survivors: Vec<Arc<dyn Strategy>> = subset.iter().cloned().collect();
        report.tournament_id = Some(tournament.tournament_id.clone());
        report.survivors = survivors.len();

        let signals = SignalRepository::new(&self.pool);
        let timeframe = self.config.timeframe;

        for (pair, fetched) in self.fetch_candles(&self.config.pairs, timeframe).await {
            let candles = match fetched {
                Ok(candles) => candles,
                Err(e) => {
                    report.run.fail(&pair, &e);
                    continue;
                }
            };

            let bundle = IndicatorBundle::new(&candles);
            let scanned = scan_pair(
                &pair,
                timeframe,
                &bundle,
                &survivors,
                &self.config.scanner,
                Some(&tournament.tournament_id),
                now,
            );
            let mut signal = match scanned {
                Ok(Some(signal)) => signal,
                Ok(None) => {
                    report.run.skip(&pair, "no confluence");
                    continue;
                }
                Err(e @ EngineError::InsufficientHistory { .. }) => {
                    report.run.skip(&pair, e.to_string());
                    continue;
                }
                Err(e) => {
                    report.run.fail(&pair, &e);
                    continue;
                }
            };

            match signals.has_active_for_pair(&pair).await {
                Ok(true) => {
                    info!(pair = %pair, count = signal.confluence_count, "Active signal exists, suppressing");
                    report.run.skip(&pair, "active signal already open");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.run.fail(&pair, &EngineError::from(e));
                    continue;
                }
            }

            match signals.insert(&signal_to_record(&signal)).await {
                Ok(id) => {
                    signal.id = Some(id);
                    info!(
                        pair = %pair,
                        id,
                        confluence = signal.confluence_count,
                        confidence = signal.confidence,
                        entry = %signal.entry_price,
                        tp = %signal.tp_price,
                        sl = %signal.sl_price,
                        "Signal created"
                    );
                    report.run.ok(&pair);
                    report.signals.push(signal);
                }
                Err(e) => report.run.fail(&pair, &EngineError::from(e)),
            }
        }

        Ok(report)
    }

    // ========================================================================
    // Monitor
    // ========================================================================

    /// Check every ACTIVE signal against the latest price
    pub async fn monitor(&self, now: DateTime<Utc>) -> EngineResult<MonitorReport> {
        let mut report = MonitorReport::default();
        let repo = SignalRepository::new(&self.pool);

        let mut active = Vec::new();
        for record in repo.get_active().await? {
            let unit = signal_unit(record.id, &record.pair);
            match signal_from_record(record) {
                Ok(signal) => active.push(signal),
                Err(e) => report.run.fail(unit, &e),
            }
        }
        if active.is_empty() {
            debug!("No active signals");
            return Ok(report);
        }

        let pairs: Vec<String> = active
            .iter()
            .map(|s| s.pair.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let prices = fetch_prices_all(
            self.provider.as_ref(),
            &pairs,
            self.config.max_concurrent_fetches,
            self.fetch_timeout(),
        )
        .await;

        for mut signal in active {
            let unit = signal_unit(signal.id, &signal.pair);
            let price = match prices.iter().find(|(p, _)| *p == signal.pair) {
                Some((_, Ok(price))) => *price,
                Some((_, Err(e))) => {
                    report.run.fail(unit, e);
                    continue;
                }
                None => continue,
            };
            let Some(price) = to_decimal(price) else {
                report.run.skip(unit, "non-finite price");
                continue;
            };

            let outcome = check_signal(&mut signal, price, now, &self.config.monitor);
            report.checked += 1;
            if outcome == CheckOutcome::AlreadyResolved {
                report.run.skip(unit, "already resolved");
                continue;
            }

            match repo.update_check(&signal_to_record(&signal)).await {
                Ok(true) => {}
                Ok(false) => {
                    report.run.skip(unit, "resolved elsewhere");
                    continue;
                }
                Err(e) => {
                    report.run.fail(unit, &EngineError::from(e));
                    continue;
                }
            }

            match outcome {
                CheckOutcome::Resolved(reason) => {
                    info!(
                        pair = %signal.pair,
                        id = signal.id,
                        reason = reason.as_str(),
                        pnl_pct = %signal.pnl_pct,
                        "Signal resolved"
                    );
                    report.resolved.push(signal);
                }
                _ => report.still_active += 1,
            }
            report.run.ok(unit);
        }

        Ok(report)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Performance summary over every stored signal
    pub async fn signal_stats(&self) -> EngineResult<SignalStats> {
        let mut signals = Vec::new();
        for record in SignalRepository::new(&self.pool).get_all().await? {
            match signal_from_record(record) {
                Ok(signal) => signals.push(signal),
                Err(e) => warn!(error = %e, "Skipping unreadable signal"),
            }
        }
        Ok(stats::compute(&signals, &self.config.stats))
    }
}

fn signal_unit(id: Option<i64>, pair: &str) -> String {
    match id {
        Some(id) => format!("signal#{id} {pair}"),
        None => format!("signal {pair}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::strategies::{Bar, Category, StrategyDef};
    use chrono::Duration as ChronoDuration;
    use persistence::Database;

    fn wavy(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 / 6.0).sin() * 5.0;
                Candle::new(i as i64 * 3_600_000, close, close + 1.0, close - 1.0, close, 100.0)
            })
            .collect()
    }

    fn every_tenth(b: &Bar) -> bool {
        b.i % 10 == 0
    }

    fn registry() -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        registry
            .register(Arc::new(StrategyDef::new(
                "tenth",
                "Every Tenth",
                Category::Composite,
                2.0,
                1.0,
                every_tenth,
            )))
            .unwrap();
        registry
    }

    async fn pipeline(provider: StaticProvider, pairs: &[&str]) -> (Database, Pipeline) {
        let db = Database::in_memory().await.unwrap();
        let config = EngineConfig {
            pairs: pairs.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, Arc::new(provider), db.pool_clone(), registry());
        (db, pipeline)
    }

    #[tokio::test]
    async fn test_backtests_absorb_missing_and_short_pairs() {
        let provider = StaticProvider::new()
            .with_candles("GOOD", wavy(300))
            .with_candles("SHORT", wavy(30));
        let (db, pipeline) = pipeline(provider, &["GOOD", "SHORT", "MISSING"]).await;

        let report = pipeline.run_backtests().await;
        assert_eq!(report.run.succeeded, vec!["GOOD"]);
        assert_eq!(report.run.skipped.len(), 1);
        assert_eq!(report.run.skipped[0].unit, "SHORT");
        assert_eq!(report.run.failed.len(), 1);
        assert_eq!(report.run.failed[0].unit, "MISSING");
        assert_eq!(report.rows_written, 1);
        assert!(report.results[0].total_trades > 0);

        let stored = ResultsRepository::new(db.pool()).count().await.unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_rows() {
        let provider = StaticProvider::new().with_candles("GOOD", wavy(300));
        let (db, pipeline) = pipeline(provider, &["GOOD"]).await;
        pipeline.run_backtest("GOOD", 60).await;
        pipeline.run_backtest("GOOD", 60).await;
        assert_eq!(ResultsRepository::new(db.pool()).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tournament_is_idempotent() {
        let provider = StaticProvider::new().with_candles("GOOD", wavy(300));
        let (db, pipeline) = pipeline(provider, &["GOOD"]).await;
        pipeline.run_backtests().await;

        let first = pipeline.run_tournament().await.unwrap();
        let second = pipeline.run_tournament().await.unwrap();
        assert_eq!(first.outcome.tournament_id, second.outcome.tournament_id);
        assert_eq!(first.rows_loaded, 1);

        let repo = TournamentRepository::new(db.pool());
        let rounds = repo.get_rounds(&first.outcome.tournament_id).await.unwrap();
        assert_eq!(rounds.len(), first.outcome.rounds.len());
    }

    #[tokio::test]
    async fn test_scan_without_tournament_is_skipped() {
        let (_db, pipeline) = pipeline(StaticProvider::new(), &["X"]).await;
        let report = pipeline.live_scan(Utc::now()).await.unwrap();
        assert!(report.signals.is_empty());
        assert!(report.tournament_id.is_none());
        assert_eq!(report.run.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_with_nothing_active() {
        let (_db, pipeline) = pipeline(StaticProvider::new(), &["X"]).await;
        let report = pipeline.monitor(Utc::now() + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(report.checked, 0);
        assert!(report.run.is_clean());
        let stats = pipeline.signal_stats().await.unwrap();
        assert_eq!(stats.total_signals, 0);
    }
}
