//! Performance statistics over resolved signals
//!
//! The null hypothesis for the significance test is the breakeven win rate
//! implied by the signals' own reward:risk, `sl / (tp + sl)`.

use serde::Serialize;
use statrs::distribution::{Binomial, ContinuousCDF, DiscreteCDF, Normal};

use crate::config::StatsConfig;
use crate::error::safe_div;
use crate::types::{to_f64, Signal, SignalExitReason};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalStats {
    pub total_signals: u32,
    pub active: u32,
    pub resolved: u32,
    pub wins: u32,
    pub losses: u32,
    pub tp_hits: u32,
    pub sl_hits: u32,
    pub expired: u32,
    /// Percentage, 0-100
    pub win_rate: f64,
    pub avg_pnl_pct: f64,
    pub total_pnl_pct: f64,
    pub best_pnl_pct: f64,
    pub worst_pnl_pct: f64,
    /// Breakeven win rate used as the null, 0-1
    pub null_win_rate: f64,
    /// One-sided P(X >= wins) under the null
    pub p_value: f64,
    pub wilson_lower: f64,
    pub wilson_upper: f64,
    pub significant: bool,
}

/// One-sided exact binomial test: P(X >= successes) for X ~ Bin(trials, p)
pub fn binomial_p_value(successes: u64, trials: u64, p: f64) -> f64 {
    if successes == 0 || trials == 0 {
        return 1.0;
    }
    match Binomial::new(p, trials) {
        Ok(dist) => dist.sf(successes - 1).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Wilson score interval for a binomial proportion at a two-sided `level`
pub fn wilson_interval(successes: u64, trials: u64, level: f64) -> (f64, f64) {
    if trials == 0 {
        return (0.0, 1.0);
    }
    let z = match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.inverse_cdf(1.0 - (1.0 - level) / 2.0),
        Err(_) => 1.96,
    };
    let n = trials as f64;
    let p_hat = successes as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let centre = (p_hat + z2 / (2.0 * n)) / denom;
    let half = z * (p_hat * (1.0 - p_hat) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    ((centre - half).max(0.0), (centre + half).min(1.0))
}

/// Breakeven win rate averaged over signals that carry both risk levels
pub fn breakeven_win_rate(signals: &[&Signal], default: f64) -> f64 {
    let rates: Vec<f64> = signals
        .iter()
        .filter_map(|s| {
            let tp = to_f64(s.tp_pct);
            let sl = to_f64(s.sl_pct);
            (tp > 0.0 && sl > 0.0).then(|| sl / (tp + sl))
        })
        .collect();
    if rates.is_empty() {
        default
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

pub fn compute(signals: &[Signal], config: &StatsConfig) -> SignalStats {
    let resolved: Vec<&Signal> = signals.iter().filter(|s| !s.is_active()).collect();
    let pnls: Vec<f64> = resolved.iter().map(|s| to_f64(s.pnl_pct)).collect();
    let count_reason = |reason: SignalExitReason| {
        resolved
            .iter()
            .filter(|s| s.exit_reason == Some(reason))
            .count() as u32
    };

    let n = resolved.len() as u64;
    let wins = pnls.iter().filter(|p| **p >= 0.0).count() as u64;
    let null_win_rate = breakeven_win_rate(&resolved, config.default_null_rate);
    let p_value = binomial_p_value(wins, n, null_win_rate);
    let (wilson_lower, wilson_upper) = wilson_interval(wins, n, config.confidence_level);
    let total_pnl: f64 = pnls.iter().sum();

    SignalStats {
        total_signals: signals.len() as u32,
        active: (signals.len() - resolved.len()) as u32,
        resolved: n as u32,
        wins: wins as u32,
        losses: (n - wins) as u32,
        tp_hits: count_reason(SignalExitReason::TpHit),
        sl_hits: count_reason(SignalExitReason::SlHit),
        expired: count_reason(SignalExitReason::Expired),
        win_rate: safe_div(wins as f64, n as f64, 0.0) * 100.0,
        avg_pnl_pct: safe_div(total_pnl, n as f64, 0.0),
        total_pnl_pct: total_pnl,
        best_pnl_pct: pnls.iter().copied().reduce(f64::max).unwrap_or(0.0),
        worst_pnl_pct: pnls.iter().copied().reduce(f64::min).unwrap_or(0.0),
        null_win_rate,
        p_value,
        wilson_lower,
        wilson_upper,
        significant: n > 0 && p_value < config.alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SignalStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn resolved(pnl: Decimal, reason: SignalExitReason) -> Signal {
        Signal {
            id: None,
            pair: "BTCUSDT".into(),
            timeframe: 60,
            direction: Direction::Long,
            entry_price: dec!(100),
            tp_price: dec!(102),
            sl_price: dec!(98.5),
            tp_pct: dec!(2),
            sl_pct: dec!(1.5),
            confidence: 70,
            confluence_count: 2,
            contributing_strategies: vec![],
            tournament_id: None,
            status: SignalStatus::Resolved,
            current_price: dec!(100) + pnl,
            pnl_pct: pnl,
            peak_pnl_pct: pnl.max(Decimal::ZERO),
            trough_pnl_pct: pnl.min(Decimal::ZERO),
            check_count: 3,
            exit_price: Some(dec!(100) + pnl),
            exit_reason: Some(reason),
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_25_of_40_is_significant() {
        let mut signals: Vec<Signal> = (0..25)
            .map(|_| resolved(dec!(2), SignalExitReason::TpHit))
            .collect();
        signals.extend((0..15).map(|_| resolved(dec!(-1.5), SignalExitReason::SlHit)));

        let stats = compute(&signals, &StatsConfig::default());
        assert_eq!(stats.resolved, 40);
        assert_eq!(stats.wins, 25);
        assert_eq!(stats.tp_hits, 25);
        assert_eq!(stats.sl_hits, 15);
        assert!((stats.win_rate - 62.5).abs() < 1e-9);
        assert!((stats.null_win_rate - 1.5 / 3.5).abs() < 1e-9);
        assert!(stats.p_value < 0.05, "p = {}", stats.p_value);
        assert!(stats.significant);
        assert!(stats.wilson_lower < 0.625 && 0.625 < stats.wilson_upper);
        assert!((stats.wilson_lower - 0.470).abs() < 0.01);
        assert!((stats.wilson_upper - 0.758).abs() < 0.01);
    }

    #[test]
    fn test_coin_flip_not_significant() {
        assert!(binomial_p_value(20, 40, 0.5) > 0.4);
        assert_eq!(binomial_p_value(0, 40, 0.5), 1.0);
        assert_eq!(binomial_p_value(3, 0, 0.5), 1.0);
    }

    #[test]
    fn test_exact_tail_probability() {
        // P(X >= 2) for Bin(2, 0.5) = 0.25
        assert!((binomial_p_value(2, 2, 0.5) - 0.25).abs() < 1e-12);
        // P(X >= 1) for Bin(3, 0.5) = 0.875
        assert!((binomial_p_value(1, 3, 0.5) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_active_only() {
        let stats = compute(&[], &StatsConfig::default());
        assert_eq!(stats.resolved, 0);
        assert!(!stats.significant);
        assert_eq!(stats.null_win_rate, 0.5);

        let mut active = resolved(dec!(0), SignalExitReason::TpHit);
        active.status = SignalStatus::Active;
        active.exit_reason = None;
        let stats = compute(&[active], &StatsConfig::default());
        assert_eq!(stats.total_signals, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.resolved, 0);
    }

    #[test]
    fn test_breakeven_expired_counts_as_win() {
        let signals = vec![
            resolved(dec!(0), SignalExitReason::Expired),
            resolved(dec!(-0.4), SignalExitReason::Expired),
        ];
        let stats = compute(&signals, &StatsConfig::default());
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.worst_pnl_pct, -0.4);
    }
}
