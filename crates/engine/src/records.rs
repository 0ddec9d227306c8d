//! Conversion between engine types and persistence rows

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use persistence::repository::{
    SignalRecord, StrategyResultRecord, TournamentEntryRecord, TournamentRecord, TournamentRoundRecord,
};
use rust_decimal::Decimal;

use crate::config::TournamentConfig;
use crate::error::{EngineError, EngineResult};
use crate::tournament::{RoundRecord, TournamentEntry, TournamentOutcome};
use crate::types::{Direction, Signal, SignalExitReason, SignalStatus, StrategyResult};

// ============================================================================
// Strategy results
// ============================================================================

pub fn result_to_record(result: &StrategyResult, updated_at: i64) -> StrategyResultRecord {
    StrategyResultRecord {
        id: None,
        strategy_id: result.strategy_id.clone(),
        strategy_name: result.strategy_name.clone(),
        category: result.category.clone(),
        pair: result.pair.clone(),
        timeframe: result.timeframe as i64,
        bars: result.bars as i64,
        total_trades: result.total_trades as i64,
        wins: result.wins as i64,
        losses: result.losses as i64,
        win_rate: result.win_rate,
        total_return: result.total_return,
        profit_factor: result.profit_factor,
        sharpe: result.sharpe,
        sortino: result.sortino,
        max_drawdown: result.max_drawdown,
        avg_win: result.avg_win,
        avg_loss: result.avg_loss,
        best_trade: result.best_trade,
        worst_trade: result.worst_trade,
        avg_bars: result.avg_bars,
        expectancy: result.expectancy,
        max_consecutive_losses: result.max_consecutive_losses as i64,
        updated_at,
    }
}

/// Stored aggregate without its trade list
pub fn record_to_result(record: StrategyResultRecord) -> StrategyResult {
    StrategyResult {
        strategy_id: record.strategy_id,
        strategy_name: record.strategy_name,
        category: record.category,
        pair: record.pair,
        timeframe: record.timeframe.max(0) as u32,
        bars: record.bars.max(0) as usize,
        trades: Vec::new(),
        total_trades: record.total_trades.max(0) as u32,
        wins: record.wins.max(0) as u32,
        losses: record.losses.max(0) as u32,
        win_rate: record.win_rate,
        total_return: record.total_return,
        profit_factor: record.profit_factor,
        sharpe: record.sharpe,
        sortino: record.sortino,
        max_drawdown: record.max_drawdown,
        avg_win: record.avg_win,
        avg_loss: record.avg_loss,
        best_trade: record.best_trade,
        worst_trade: record.worst_trade,
        avg_bars: record.avg_bars,
        expectancy: record.expectancy,
        max_consecutive_losses: record.max_consecutive_losses.max(0) as u32,
    }
}

// ============================================================================
// Tournaments
// ============================================================================

/// Header, entry and round rows for one tournament outcome
pub fn tournament_records(
    outcome: &TournamentOutcome,
    config: &TournamentConfig,
    created_at: i64,
) -> (TournamentRecord, Vec<TournamentEntryRecord>, Vec<TournamentRoundRecord>) {
    let header = TournamentRecord {
        tournament_id: outcome.tournament_id.clone(),
        strategies_tested: outcome.entries.len() as i64,
        survivors: outcome.survivors().count() as i64,
        winners: outcome.winners().count() as i64,
        survivors_per_round: serde_json::to_string(&outcome.survivors_per_round)
            .unwrap_or_else(|_| "[]".to_string()),
        config_json: serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string()),
        created_at,
    };
    let entries = outcome
        .entries
        .iter()
        .map(|e| entry_to_record(&outcome.tournament_id, e))
        .collect();
    let rounds = outcome.rounds.iter().map(round_to_record).collect();
    (header, entries, rounds)
}

fn entry_to_record(tournament_id: &str, entry: &TournamentEntry) -> TournamentEntryRecord {
    TournamentEntryRecord {
        id: None,
        tournament_id: tournament_id.to_string(),
        strategy_id: entry.strategy_id.clone(),
        strategy_name: entry.strategy_name.clone(),
        category: entry.category.clone(),
        pairs_tested: entry.pairs_tested as i64,
        pairs_profitable: entry.pairs_profitable as i64,
        total_trades: entry.total_trades as i64,
        avg_win_rate: entry.avg_win_rate,
        avg_profit_factor: entry.avg_profit_factor,
        avg_sharpe: entry.avg_sharpe,
        avg_return: entry.avg_return,
        avg_max_drawdown: entry.avg_max_drawdown,
        final_action: entry.final_action.as_str().to_string(),
        eliminated_round: entry.eliminated_round.map(i64::from),
        composite_score: entry.composite_score,
        rank: entry.rank.map(i64::from),
    }
}

fn round_to_record(round: &RoundRecord) -> TournamentRoundRecord {
    TournamentRoundRecord {
        id: None,
        tournament_id: round.tournament_id.clone(),
        round_number: round.round_number as i64,
        strategy_id: round.strategy_id.clone(),
        strategy_name: round.strategy_name.clone(),
        action: round.action.as_str().to_string(),
        reason: round.reason.clone(),
        score: round.score,
        rank: round.rank.map(i64::from),
    }
}

// ============================================================================
// Signals
// ============================================================================

pub fn signal_to_record(signal: &Signal) -> SignalRecord {
    SignalRecord {
        id: signal.id,
        pair: signal.pair.clone(),
        timeframe: signal.timeframe as i64,
        direction: signal.direction.as_str().to_string(),
        entry_price: signal.entry_price.to_string(),
        tp_price: signal.tp_price.to_string(),
        sl_price: signal.sl_price.to_string(),
        tp_pct: signal.tp_pct.to_string(),
        sl_pct: signal.sl_pct.to_string(),
        confidence: signal.confidence as i64,
        confluence_count: signal.confluence_count as i64,
        contributing_strategies: serde_json::to_string(&signal.contributing_strategies)
            .unwrap_or_else(|_| "[]".to_string()),
        tournament_id: signal.tournament_id.clone(),
        status: signal.status.as_str().to_string(),
        current_price: signal.current_price.to_string(),
        pnl_pct: signal.pnl_pct.to_string(),
        peak_pnl_pct: signal.peak_pnl_pct.to_string(),
        trough_pnl_pct: signal.trough_pnl_pct.to_string(),
        check_count: signal.check_count as i64,
        exit_price: signal.exit_price.map(|p| p.to_string()),
        exit_reason: signal.exit_reason.map(|r| r.as_str().to_string()),
        created_at: signal.created_at.timestamp_millis(),
        resolved_at: signal.resolved_at.map(|t| t.timestamp_millis()),
    }
}

pub fn signal_from_record(record: SignalRecord) -> EngineResult<Signal> {
    let id = record.id.map(|i| i.to_string()).unwrap_or_default();
    let invalid = |reason: String| EngineError::InvalidRecord {
        table: "signals",
        id: id.clone(),
        reason,
    };
    let decimal = |field: &str, raw: &str| {
        Decimal::from_str(raw).map_err(|e| invalid(format!("{field} {raw:?}: {e}")))
    };
    let millis = |field: &str, ms: i64| -> EngineResult<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| invalid(format!("{field} {ms} out of range")))
    };

    let exit_reason = match record.exit_reason.as_deref() {
        Some(raw) => Some(
            SignalExitReason::parse(raw).ok_or_else(|| invalid(format!("exit_reason {raw:?}")))?,
        ),
        None => None,
    };
    let exit_price = match record.exit_price.as_deref() {
        Some(raw) => Some(decimal("exit_price", raw)?),
        None => None,
    };
    let resolved_at = match record.resolved_at {
        Some(ms) => Some(millis("resolved_at", ms)?),
        None => None,
    };

    Ok(Signal {
        id: record.id,
        direction: Direction::parse(&record.direction)
            .ok_or_else(|| invalid(format!("direction {:?}", record.direction)))?,
        status: SignalStatus::parse(&record.status)
            .ok_or_else(|| invalid(format!("status {:?}", record.status)))?,
        entry_price: decimal("entry_price", &record.entry_price)?,
        tp_price: decimal("tp_price", &record.tp_price)?,
        sl_price: decimal("sl_price", &record.sl_price)?,
        tp_pct: decimal("tp_pct", &record.tp_pct)?,
        sl_pct: decimal("sl_pct", &record.sl_pct)?,
        current_price: decimal("current_price", &record.current_price)?,
        pnl_pct: decimal("pnl_pct", &record.pnl_pct)?,
        peak_pnl_pct: decimal("peak_pnl_pct", &record.peak_pnl_pct)?,
        trough_pnl_pct: decimal("trough_pnl_pct", &record.trough_pnl_pct)?,
        contributing_strategies: serde_json::from_str(&record.contributing_strategies)
            .map_err(|e| invalid(format!("contributing_strategies: {e}")))?,
        created_at: millis("created_at", record.created_at)?,
        pair: record.pair,
        timeframe: record.timeframe.max(0) as u32,
        confidence: record.confidence.clamp(0, 100) as u32,
        confluence_count: record.confluence_count.max(0) as u32,
        tournament_id: record.tournament_id,
        check_count: record.check_count.max(0) as u32,
        exit_price,
        exit_reason,
        resolved_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal() -> Signal {
        Signal {
            id: Some(4),
            pair: "ETHUSDT".into(),
            timeframe: 60,
            direction: Direction::Long,
            entry_price: dec!(2500.12345678),
            tp_price: dec!(2550),
            sl_price: dec!(2475.5),
            tp_pct: dec!(1.99),
            sl_pct: dec!(0.98),
            confidence: 80,
            confluence_count: 3,
            contributing_strategies: vec!["EMA Cross 9/21".into(), "MACD Cross".into()],
            tournament_id: Some("abc".into()),
            status: SignalStatus::Resolved,
            current_price: dec!(2551),
            pnl_pct: dec!(2.035),
            peak_pnl_pct: dec!(2.035),
            trough_pnl_pct: dec!(-0.2),
            check_count: 5,
            exit_price: Some(dec!(2551)),
            exit_reason: Some(SignalExitReason::TpHit),
            created_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            resolved_at: Some(Utc.timestamp_millis_opt(1_700_010_000_000).unwrap()),
        }
    }

    #[test]
    fn test_signal_survives_storage_format() {
        let original = signal();
        let record = signal_to_record(&original);
        assert_eq!(record.entry_price, "2500.12345678");
        assert_eq!(record.exit_reason.as_deref(), Some("TP_HIT"));
        assert_eq!(signal_from_record(record).unwrap(), original);
    }

    #[test]
    fn test_corrupt_signal_row_is_reported() {
        let mut record = signal_to_record(&signal());
        record.tp_price = "abc".into();
        let err = signal_from_record(record).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord { table: "signals", .. }));
        assert!(err.to_string().contains("tp_price"));
    }

    #[test]
    fn test_result_record_drops_trades() {
        let result = StrategyResult {
            strategy_id: "x".into(),
            pair: "BTCUSDT".into(),
            timeframe: 60,
            total_trades: 3,
            max_consecutive_losses: 2,
            ..Default::default()
        };
        let back = record_to_result(result_to_record(&result, 0));
        assert_eq!(back, result);
    }
}
