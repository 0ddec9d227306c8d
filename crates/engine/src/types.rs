//! Shared types for the evaluation pipeline

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in epoch milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Direction of an entry or a live signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(Self::Long),
            "SHORT" => Some(Self::Short),
            _ => None,
        }
    }
}

// ============================================================================
// Backtest output
// ============================================================================

/// Why a simulated trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeExitReason {
    Tp,
    Sl,
    Timeout,
    End,
}

/// A closed trade produced by the backtest simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,
    pub tp_price: f64,
    pub initial_sl: f64,
    pub exit_index: usize,
    pub exit_time: i64,
    pub exit_price: f64,
    pub pnl_pct: f64,
    pub exit_reason: TradeExitReason,
    pub bars_held: usize,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl_pct >= 0.0
    }
}

/// Aggregate statistics for one (strategy, pair, timeframe)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy_id: String,
    pub strategy_name: String,
    pub category: String,
    pub pair: String,
    pub timeframe: u32,
    pub bars: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<Trade>,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// Percentage, 0-100
    pub win_rate: f64,
    /// Compounded percentage return of the synthetic equity curve
    pub total_return: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Percentage, peak-to-trough on the synthetic equity curve
    pub max_drawdown: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_bars: f64,
    pub expectancy: f64,
    pub max_consecutive_losses: u32,
}

// ============================================================================
// Live signals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Active,
    Resolved,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalExitReason {
    TpHit,
    SlHit,
    Expired,
}

impl SignalExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TpHit => "TP_HIT",
            Self::SlHit => "SL_HIT",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TP_HIT" => Some(Self::TpHit),
            "SL_HIT" => Some(Self::SlHit),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A live trade signal emitted by the confluence scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Row id, `None` until persisted
    pub id: Option<i64>,
    pub pair: String,
    pub timeframe: u32,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub tp_pct: Decimal,
    pub sl_pct: Decimal,
    /// 0-100
    pub confidence: u32,
    pub confluence_count: u32,
    pub contributing_strategies: Vec<String>,
    pub tournament_id: Option<String>,
    pub status: SignalStatus,
    pub current_price: Decimal,
    pub pnl_pct: Decimal,
    pub peak_pnl_pct: Decimal,
    pub trough_pnl_pct: Decimal,
    pub check_count: u32,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<SignalExitReason>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }
}

// ============================================================================
// Decimal conversion
// ============================================================================

/// Convert an f64 price or percentage to a Decimal rounded to 8 places.
/// Returns `None` for NaN and infinities.
pub fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(8))
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(to_decimal(101.123456789), Some(dec!(101.12345679)));
        assert_eq!(to_decimal(f64::NAN), None);
        assert_eq!(to_f64(dec!(2.5)), 2.5);
    }

    #[test]
    fn test_enum_round_trips() {
        for d in [Direction::Long, Direction::Short] {
            assert_eq!(Direction::parse(d.as_str()), Some(d));
        }
        for r in [SignalExitReason::TpHit, SignalExitReason::SlHit, SignalExitReason::Expired] {
            assert_eq!(SignalExitReason::parse(r.as_str()), Some(r));
        }
        assert_eq!(SignalStatus::parse("ACTIVE"), Some(SignalStatus::Active));
        assert_eq!(SignalStatus::parse("active"), None);
    }
}
