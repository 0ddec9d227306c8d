//! Live confluence scanner
//!
//! Re-evaluates tournament survivors on the most recent bars of a pair and
//! emits a signal when enough of them agree on a long entry. Risk levels are
//! ATR-scaled from the averaged multiples of the agreeing strategies, with
//! the take-profit widened as agreement grows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::error::{safe_div, EngineError, EngineResult};
use crate::indicators::IndicatorBundle;
use crate::strategies::Strategy;
use crate::types::{to_decimal, Direction, Signal, SignalStatus};

/// Strategies that fired a long entry within the lookback window
#[derive(Debug, Clone, PartialEq)]
pub struct Confluence {
    pub strategy_ids: Vec<String>,
    pub strategy_names: Vec<String>,
    pub avg_tp_atr_mult: f64,
    pub avg_sl_atr_mult: f64,
}

impl Confluence {
    pub fn count(&self) -> u32 {
        self.strategy_ids.len() as u32
    }
}

/// Collect every survivor that fired on one of the last `lookback` bars
pub fn find_confluence(
    survivors: &[Arc<dyn Strategy>],
    bundle: &IndicatorBundle,
    lookback: usize,
) -> Confluence {
    let n = bundle.len();
    let start = n.saturating_sub(lookback);
    let fired: Vec<&Arc<dyn Strategy>> = survivors
        .iter()
        .filter(|s| (start..n).any(|i| s.evaluate(i, bundle) == Some(Direction::Long)))
        .collect();

    let count = fired.len() as f64;
    Confluence {
        strategy_ids: fired.iter().map(|s| s.id().to_string()).collect(),
        strategy_names: fired.iter().map(|s| s.name().to_string()).collect(),
        avg_tp_atr_mult: safe_div(fired.iter().map(|s| s.tp_atr_mult()).sum(), count, 0.0),
        avg_sl_atr_mult: safe_div(fired.iter().map(|s| s.sl_atr_mult()).sum(), count, 0.0),
    }
}

/// TP multiplier scale for `count` agreeing strategies
pub fn tp_scale(count: u32, config: &ScannerConfig) -> f64 {
    let extra = count.saturating_sub(config.min_confluence) as f64;
    (1.0 + config.tp_scale_per_extra * extra).min(config.max_tp_scale)
}

pub fn confidence(count: u32, config: &ScannerConfig) -> u32 {
    config
        .base_confidence
        .saturating_add(count.saturating_mul(config.confidence_step))
        .min(config.max_confidence)
}

/// Scan one pair.
///
/// Returns `Ok(None)` when confluence is below the minimum or ATR is zero,
/// and `InsufficientHistory` when the bundle is shorter than the warm-up.
pub fn scan_pair(
    pair: &str,
    timeframe: u32,
    bundle: &IndicatorBundle,
    survivors: &[Arc<dyn Strategy>],
    config: &ScannerConfig,
    tournament_id: Option<&str>,
    now: DateTime<Utc>,
) -> EngineResult<Option<Signal>> {
    if bundle.len() < IndicatorBundle::WARMUP {
        return Err(EngineError::InsufficientHistory {
            pair: pair.to_string(),
            bars: bundle.len(),
            required: IndicatorBundle::WARMUP,
        });
    }

    let last = bundle.len() - 1;
    let entry = bundle.close[last];
    let atr = bundle.atr14[last];
    if atr <= 0.0 || entry <= 0.0 {
        debug!(pair, atr, "Skipping pair with zero volatility");
        return Ok(None);
    }

    let confluence = find_confluence(survivors, bundle, config.lookback_bars);
    let count = confluence.count();
    if count == 0 || count < config.min_confluence {
        debug!(pair, count, "Confluence below minimum");
        return Ok(None);
    }

    let sl = entry - confluence.avg_sl_atr_mult * atr;
    let tp = entry + confluence.avg_tp_atr_mult * atr * tp_scale(count, config);
    let tp_pct = (tp - entry) / entry * 100.0;
    let sl_pct = (entry - sl) / entry * 100.0;

    let invalid = |what: &str| EngineError::DataUnavailable {
        pair: pair.to_string(),
        reason: format!("non-finite {what}"),
    };
    let entry_price = to_decimal(entry).ok_or_else(|| invalid("entry"))?;

    Ok(Some(Signal {
        id: None,
        pair: pair.to_string(),
        timeframe,
        direction: Direction::Long,
        entry_price,
        tp_price: to_decimal(tp).ok_or_else(|| invalid("take-profit"))?,
        sl_price: to_decimal(sl).ok_or_else(|| invalid("stop-loss"))?,
        tp_pct: to_decimal(tp_pct).ok_or_else(|| invalid("take-profit"))?,
        sl_pct: to_decimal(sl_pct).ok_or_else(|| invalid("stop-loss"))?,
        confidence: confidence(count, config),
        confluence_count: count,
        contributing_strategies: confluence.strategy_names,
        tournament_id: tournament_id.map(str::to_string),
        status: SignalStatus::Active,
        current_price: entry_price,
        pnl_pct: Decimal::ZERO,
        peak_pnl_pct: Decimal::ZERO,
        trough_pnl_pct: Decimal::ZERO,
        check_count: 0,
        exit_price: None,
        exit_reason: None,
        created_at: now,
        resolved_at: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{Bar, Category, StrategyDef};
    use crate::types::{to_f64, Candle};

    fn flat_bundle(n: usize) -> IndicatorBundle {
        let candles: Vec<Candle> = (0..n)
            .map(|i| Candle::new(i as i64 * 3_600_000, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        IndicatorBundle::new(&candles)
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

    fn five_back(b: &Bar) -> bool {
        b.i + 6 == b.ind.len()
    }

    fn fires_back(back: usize) -> fn(&Bar) -> bool {
        match back {
            0 => on_last,
            1 => one_back,
            2 => two_back,
            _ => five_back,
        }
    }

    fn survivor(id: &'static str, back: usize, tp: f64, sl: f64) -> Arc<dyn Strategy> {
        Arc::new(StrategyDef::new(id, id, Category::Composite, tp, sl, fires_back(back)))
    }

    fn never(id: &'static str) -> Arc<dyn Strategy> {
        Arc::new(StrategyDef::new(id, id, Category::Composite, 2.0, 1.0, |_| false))
    }

    #[test]
    fn test_three_survivors_make_one_signal() {
        let bundle = flat_bundle(80);
        let survivors = vec![
            survivor("s1", 0, 2.0, 1.0),
            survivor("s2", 1, 3.0, 1.5),
            survivor("s3", 2, 4.0, 2.0),
            never("s4"),
        ];
        let config = ScannerConfig::default();
        let now = Utc::now();

        let signal = scan_pair("X", 60, &bundle, &survivors, &config, Some("t1"), now)
            .unwrap()
            .unwrap();
        assert_eq!(signal.confluence_count, 3);
        assert_eq!(signal.contributing_strategies, vec!["s1", "s2", "s3"]);
        assert_eq!(signal.status, SignalStatus::Active);
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.confidence, 80);
        assert_eq!(signal.tournament_id.as_deref(), Some("t1"));

        // ATR 2, avg tp 3.0, avg sl 1.5, scale 1.15
        assert!((to_f64(signal.tp_price) - (100.0 + 3.0 * 2.0 * 1.15)).abs() < 1e-6);
        assert!((to_f64(signal.sl_price) - 97.0).abs() < 1e-6);
        assert!((to_f64(signal.sl_pct) - 3.0).abs() < 1e-6);
        assert_eq!(signal.created_at, now);
    }

    #[test]
    fn test_fire_outside_lookback_ignored() {
        let bundle = flat_bundle(80);
        let survivors = vec![survivor("s1", 0, 2.0, 1.0), survivor("old", 5, 2.0, 1.0)];
        let result = scan_pair("X", 60, &bundle, &survivors, &ScannerConfig::default(), None, Utc::now());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_short_history_is_an_error() {
        let bundle = flat_bundle(20);
        let survivors = vec![survivor("s1", 0, 2.0, 1.0), survivor("s2", 0, 2.0, 1.0)];
        let err = scan_pair("X", 60, &bundle, &survivors, &ScannerConfig::default(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHistory { bars: 20, .. }));
    }

    #[test]
    fn test_zero_atr_skips() {
        let candles: Vec<Candle> = (0..80)
            .map(|i| Candle::new(i, 50.0, 50.0, 50.0, 50.0, 1.0))
            .collect();
        let bundle = IndicatorBundle::new(&candles);
        let survivors = vec![survivor("s1", 0, 2.0, 1.0), survivor("s2", 0, 2.0, 1.0)];
        let result = scan_pair("X", 60, &bundle, &survivors, &ScannerConfig::default(), None, Utc::now());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_no_agreeing_strategy_never_signals() {
        let bundle = flat_bundle(80);
        let config = ScannerConfig {
            min_confluence: 0,
            ..Default::default()
        };
        for survivors in [vec![], vec![never("s1"), never("s2")]] {
            let result = scan_pair("X", 60, &bundle, &survivors, &config, None, Utc::now());
            assert!(result.unwrap().is_none());
        }
    }

    #[test]
    fn test_scale_and_confidence_caps() {
        let config = ScannerConfig::default();
        assert_eq!(tp_scale(2, &config), 1.0);
        assert!((tp_scale(4, &config) - 1.3).abs() < 1e-12);
        assert_eq!(tp_scale(20, &config), config.max_tp_scale);
        assert_eq!(confidence(2, &config), 70);
        assert_eq!(confidence(10, &config), 95);
    }
}
