//! Walk-forward backtest simulator
//!
//! Replays one strategy over one candle history, bar by bar, holding at most
//! one long position. Entries open at the signal bar's close with ATR-scaled
//! take-profit and a trailing stop that only ratchets upward.

use tracing::debug;

use crate::config::BacktestConfig;
use crate::error::safe_div;
use crate::indicators::IndicatorBundle;
use crate::strategies::Strategy;
use crate::types::{Direction, StrategyResult, Trade, TradeExitReason};

/// Profit factor reported when there are gains and no losses
pub const PROFIT_FACTOR_CAP: f64 = 99.0;

/// Starting value of the synthetic equity curve
const EQUITY_BASE: f64 = 100.0;

// ============================================================================
// Position state
// ============================================================================

/// An open long position
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,
    pub tp_price: f64,
    pub initial_sl: f64,
    pub trailing_sl: f64,
    pub sl_atr_mult: f64,
}

impl OpenPosition {
    pub fn open(
        entry_index: usize,
        entry_time: i64,
        entry_price: f64,
        atr: f64,
        tp_atr_mult: f64,
        sl_atr_mult: f64,
    ) -> Self {
        let sl = entry_price - sl_atr_mult * atr;
        Self {
            entry_index,
            entry_time,
            entry_price,
            tp_price: entry_price + tp_atr_mult * atr,
            initial_sl: sl,
            trailing_sl: sl,
            sl_atr_mult,
        }
    }

    /// Advance the position through one bar after entry.
    ///
    /// Ratchets the trailing stop, then checks take-profit, stop and timeout
    /// in that order. Returns the exit price and reason when the bar closes
    /// the position.
    pub fn update(
        &mut self,
        high: f64,
        low: f64,
        close: f64,
        atr: f64,
        bars_held: usize,
        max_bars_held: usize,
    ) -> Option<(f64, TradeExitReason)> {
        let candidate = high - self.sl_atr_mult * atr;
        if candidate.is_finite() {
            self.trailing_sl = self.trailing_sl.max(candidate);
        }

        if high >= self.tp_price {
            Some((self.tp_price, TradeExitReason::Tp))
        } else if low <= self.trailing_sl {
            Some((self.trailing_sl.max(low), TradeExitReason::Sl))
        } else if bars_held >= max_bars_held {
            Some((close, TradeExitReason::Timeout))
        } else {
            None
        }
    }

    fn close(self, exit_index: usize, exit_time: i64, exit_price: f64, reason: TradeExitReason) -> Trade {
        let pnl_pct = safe_div(exit_price - self.entry_price, self.entry_price, 0.0) * 100.0;
        Trade {
            entry_index: self.entry_index,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            tp_price: self.tp_price,
            initial_sl: self.initial_sl,
            exit_index,
            exit_time,
            exit_price,
            pnl_pct,
            exit_reason: reason,
            bars_held: exit_index - self.entry_index,
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Replay `strategy` over the bundle and return every closed trade
pub fn simulate(
    strategy: &dyn Strategy,
    bundle: &IndicatorBundle,
    config: &BacktestConfig,
) -> Vec<Trade> {
    let n = bundle.len();
    let mut trades = Vec::new();
    let mut position: Option<OpenPosition> = None;

    for i in config.warmup_bars..n {
        if let Some(mut pos) = position.take() {
            let bars_held = i - pos.entry_index;
            match pos.update(
                bundle.high[i],
                bundle.low[i],
                bundle.close[i],
                bundle.atr14[i],
                bars_held,
                config.max_bars_held,
            ) {
                Some((price, reason)) => {
                    let trade = pos.close(i, bundle.timestamps[i], price, reason);
                    debug!(
                        strategy = strategy.id(),
                        entry = trade.entry_index,
                        exit = trade.exit_index,
                        pnl_pct = trade.pnl_pct,
                        reason = ?trade.exit_reason,
                        "Trade closed"
                    );
                    trades.push(trade);
                }
                None => position = Some(pos),
            }
            // A bar spent in (or closing) a position cannot open another
            continue;
        }

        let atr = bundle.atr14[i];
        let price = bundle.close[i];
        if atr > 0.0 && price > 0.0 && strategy.evaluate(i, bundle) == Some(Direction::Long) {
            position = Some(OpenPosition::open(
                i,
                bundle.timestamps[i],
                price,
                atr,
                strategy.tp_atr_mult(),
                strategy.sl_atr_mult(),
            ));
        }
    }

    if let Some(pos) = position {
        let last = n - 1;
        trades.push(pos.close(
            last,
            bundle.timestamps[last],
            bundle.close[last],
            TradeExitReason::End,
        ));
    }

    trades
}

/// Backtest one strategy on one pair and aggregate the result
pub fn run_strategy(
    strategy: &dyn Strategy,
    bundle: &IndicatorBundle,
    pair: &str,
    timeframe: u32,
    config: &BacktestConfig,
) -> StrategyResult {
    let trades = simulate(strategy, bundle, config);
    let mut result = StrategyResult {
        strategy_id: strategy.id().to_string(),
        strategy_name: strategy.name().to_string(),
        category: strategy.category().as_str().to_string(),
        pair: pair.to_string(),
        timeframe,
        bars: bundle.len(),
        ..Default::default()
    };
    apply_statistics(&mut result, trades);
    result
}

// ============================================================================
// Statistics
// ============================================================================

/// Fill every aggregate field of `result` from `trades`
pub fn apply_statistics(result: &mut StrategyResult, trades: Vec<Trade>) {
    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    let total = returns.len();

    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r >= 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();

    result.total_trades = total as u32;
    result.wins = wins.len() as u32;
    result.losses = losses.len() as u32;
    result.win_rate = safe_div(wins.len() as f64, total as f64, 0.0) * 100.0;
    result.profit_factor = profit_factor(&returns);
    result.sharpe = sharpe(&returns);
    result.sortino = sortino(&returns);
    result.avg_win = mean(&wins);
    result.avg_loss = mean(&losses);
    if total > 0 {
        result.best_trade = returns.iter().copied().fold(f64::MIN, f64::max);
        result.worst_trade = returns.iter().copied().fold(f64::MAX, f64::min);
    }
    result.avg_bars = safe_div(
        trades.iter().map(|t| t.bars_held as f64).sum(),
        total as f64,
        0.0,
    );
    result.expectancy = mean(&returns);
    result.max_consecutive_losses = max_consecutive_losses(&returns);

    let (final_equity, max_drawdown) = equity_curve(&returns);
    result.total_return = final_equity - EQUITY_BASE;
    result.max_drawdown = max_drawdown;
    result.trades = trades;
}

fn mean(values: &[f64]) -> f64 {
    safe_div(values.iter().sum(), values.len() as f64, 0.0)
}

/// Gross profit over gross loss
pub fn profit_factor(returns: &[f64]) -> f64 {
    let gross_profit: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = -returns.iter().filter(|r| **r < 0.0).sum::<f64>();
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    }
}

/// Per-trade Sharpe: mean over sample standard deviation, not annualized
pub fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let avg = mean(returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev < 1e-10 {
        return 0.0;
    }
    avg / std_dev
}

/// Per-trade Sortino: mean over downside deviation of losing trades
pub fn sortino(returns: &[f64]) -> f64 {
    let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negative.is_empty() {
        return 0.0;
    }
    let downside = (negative.iter().map(|r| r.powi(2)).sum::<f64>() / negative.len() as f64).sqrt();
    if downside < 1e-10 {
        return 0.0;
    }
    mean(returns) / downside
}

/// Compound percentage returns from 100; returns (final equity, max drawdown %)
pub fn equity_curve(returns: &[f64]) -> (f64, f64) {
    let mut equity = EQUITY_BASE;
    let mut peak = equity;
    let mut max_drawdown = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r / 100.0;
        peak = peak.max(equity);
        max_drawdown = max_drawdown.max(safe_div(peak - equity, peak, 0.0) * 100.0);
    }
    (equity, max_drawdown)
}

fn max_consecutive_losses(returns: &[f64]) -> u32 {
    let mut streak = 0u32;
    let mut worst = 0u32;
    for r in returns {
        if *r < 0.0 {
            streak += 1;
            worst = worst.max(streak);
        } else {
            streak = 0;
        }
    }
    worst
}
