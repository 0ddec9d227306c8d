//! Signal monitor
//!
//! Resolves ACTIVE signals against live prices. Each check folds the current
//! P&L into the running peak/trough, then tests take-profit, stop-loss and
//! expiry in that order. A resolved signal is terminal.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::MonitorConfig;
use crate::types::{Direction, Signal, SignalExitReason, SignalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The signal was already resolved; nothing changed
    AlreadyResolved,
    StillActive,
    Resolved(SignalExitReason),
}

/// Percentage P&L of a position opened at `entry` marked at `price`
pub fn pnl_pct(direction: Direction, entry: Decimal, price: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let move_pct = (price - entry) / entry * dec!(100);
    let pnl = match direction {
        Direction::Long => move_pct,
        Direction::Short => -move_pct,
    };
    pnl.round_dp(6)
}

fn exit_reason(signal: &Signal, price: Decimal) -> Option<SignalExitReason> {
    let (tp_hit, sl_hit) = match signal.direction {
        Direction::Long => (price >= signal.tp_price, price <= signal.sl_price),
        Direction::Short => (price <= signal.tp_price, price >= signal.sl_price),
    };
    if tp_hit {
        Some(SignalExitReason::TpHit)
    } else if sl_hit {
        Some(SignalExitReason::SlHit)
    } else {
        None
    }
}

/// Check one signal against `price` at time `now`
pub fn check_signal(
    signal: &mut Signal,
    price: Decimal,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> CheckOutcome {
    if !signal.is_active() {
        return CheckOutcome::AlreadyResolved;
    }

    let pnl = pnl_pct(signal.direction, signal.entry_price, price);
    signal.current_price = price;
    signal.pnl_pct = pnl;
    signal.peak_pnl_pct = signal.peak_pnl_pct.max(pnl);
    signal.trough_pnl_pct = signal.trough_pnl_pct.min(pnl);
    signal.check_count += 1;

    let held = now - signal.created_at;
    let reason = exit_reason(signal, price).or_else(|| {
        Duration::try_hours(config.max_hold_hours)
            .is_some_and(|max_hold| held >= max_hold)
            .then_some(SignalExitReason::Expired)
    });

    match reason {
        Some(reason) => {
            signal.status = SignalStatus::Resolved;
            signal.exit_price = Some(price);
            signal.exit_reason = Some(reason);
            signal.resolved_at = Some(now);
            debug!(
                pair = %signal.pair,
                reason = reason.as_str(),
                pnl_pct = %pnl,
                "Signal resolved"
            );
            CheckOutcome::Resolved(reason)
        }
        None => CheckOutcome::StillActive,
    }
}
