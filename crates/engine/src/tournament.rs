//! Elimination tournament over stored backtest results
//!
//! Rows are aggregated per strategy across pairs, then filtered through four
//! sequential elimination rounds and ranked by a composite score. Every
//! decision is kept as an audit record so the path of any strategy through
//! the tournament can be reconstructed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::TournamentConfig;
use crate::error::safe_div;
use crate::types::StrategyResult;

pub const ROUND_ACTIVITY: u32 = 1;
pub const ROUND_WIN_RATE: u32 = 2;
pub const ROUND_PROFIT_FACTOR: u32 = 3;
pub const ROUND_DRAWDOWN: u32 = 4;
pub const ROUND_RANKING: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundAction {
    Survived,
    Eliminated,
    Winner,
    Ranked,
}

impl RoundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Survived => "SURVIVED",
            Self::Eliminated => "ELIMINATED",
            Self::Winner => "WINNER",
            Self::Ranked => "RANKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SURVIVED" => Some(Self::Survived),
            "ELIMINATED" => Some(Self::Eliminated),
            "WINNER" => Some(Self::Winner),
            "RANKED" => Some(Self::Ranked),
            _ => None,
        }
    }

    /// Final actions that qualify a strategy for live scanning
    pub fn is_survivor(&self) -> bool {
        matches!(self, Self::Winner | Self::Ranked)
    }
}

/// One decision about one strategy in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub tournament_id: String,
    pub round_number: u32,
    pub strategy_id: String,
    pub strategy_name: String,
    pub action: RoundAction,
    pub reason: String,
    /// The metric the round judged (composite score in the ranking round)
    pub score: f64,
    pub rank: Option<u32>,
}

/// Per-strategy aggregate across every pair it was tested on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentEntry {
    pub strategy_id: String,
    pub strategy_name: String,
    pub category: String,
    pub pairs_tested: u32,
    pub pairs_profitable: u32,
    pub total_trades: u32,
    pub avg_win_rate: f64,
    pub avg_profit_factor: f64,
    pub avg_sharpe: f64,
    pub avg_return: f64,
    pub avg_max_drawdown: f64,
    pub final_action: RoundAction,
    /// Round in which the strategy was eliminated, if any
    pub eliminated_round: Option<u32>,
    pub composite_score: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentOutcome {
    pub tournament_id: String,
    pub entries: Vec<TournamentEntry>,
    pub rounds: Vec<RoundRecord>,
    /// Survivors after rounds 1 through 4
    pub survivors_per_round: Vec<usize>,
}

impl TournamentOutcome {
    pub fn survivors(&self) -> impl Iterator<Item = &TournamentEntry> {
        self.entries.iter().filter(|e| e.final_action.is_survivor())
    }

    pub fn winners(&self) -> impl Iterator<Item = &TournamentEntry> {
        self.entries
            .iter()
            .filter(|e| e.final_action == RoundAction::Winner)
    }

    /// Audit trail of one strategy, in round order
    pub fn history(&self, strategy_id: &str) -> Vec<&RoundRecord> {
        self.rounds
            .iter()
            .filter(|r| r.strategy_id == strategy_id)
            .collect()
    }
}

// ============================================================================
// Aggregation
// ============================================================================

fn average<F: Fn(&StrategyResult) -> f64>(rows: &[&StrategyResult], f: F) -> f64 {
    safe_div(rows.iter().map(|&r| f(r)).sum(), rows.len() as f64, 0.0)
}

/// Group rows by strategy; averages cover only rows that traded
pub fn aggregate(rows: &[StrategyResult]) -> Vec<TournamentEntry> {
    let mut grouped: BTreeMap<&str, Vec<&StrategyResult>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.strategy_id.as_str()).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(id, mut group)| {
            group.sort_by(|a, b| (a.pair.as_str(), a.timeframe).cmp(&(b.pair.as_str(), b.timeframe)));
            let active: Vec<&StrategyResult> =
                group.iter().copied().filter(|r| r.total_trades > 0).collect();
            let first = group[0];
            TournamentEntry {
                strategy_id: id.to_string(),
                strategy_name: first.strategy_name.clone(),
                category: first.category.clone(),
                pairs_tested: group.len() as u32,
                pairs_profitable: group.iter().filter(|r| r.total_return > 0.0).count() as u32,
                total_trades: group.iter().map(|r| r.total_trades).sum(),
                avg_win_rate: average(&active, |r| r.win_rate),
                avg_profit_factor: average(&active, |r| r.profit_factor),
                avg_sharpe: average(&active, |r| r.sharpe),
                avg_return: average(&active, |r| r.total_return),
                avg_max_drawdown: average(&active, |r| r.max_drawdown),
                final_action: RoundAction::Survived,
                eliminated_round: None,
                composite_score: None,
                rank: None,
            }
        })
        .collect()
}

/// Weighted composite used by the ranking round
pub fn composite_score(entry: &TournamentEntry, config: &TournamentConfig) -> f64 {
    let w = &config.weights;
    w.win_rate * entry.avg_win_rate
        + w.profit_factor * entry.avg_profit_factor.min(config.profit_factor_cap)
        + w.sharpe * entry.avg_sharpe
        + w.avg_return * entry.avg_return
        - w.drawdown * entry.avg_max_drawdown
}

/// Deterministic id over the sorted input snapshot and the thresholds
pub fn tournament_id(rows: &[StrategyResult], config: &TournamentConfig) -> String {
    let mut keys: Vec<&StrategyResult> = rows.iter().collect();
    keys.sort_by(|a, b| {
        (a.strategy_id.as_str(), a.pair.as_str(), a.timeframe)
            .cmp(&(b.strategy_id.as_str(), b.pair.as_str(), b.timeframe))
    });

    let mut hasher = Sha256::new();
    for r in keys {
        let line = format!(
            "{}:{}:{}:{}:{:.8}:{:.8}:{:.8}:{:.8}:{:.8}\n",
            r.strategy_id,
            r.pair,
            r.timeframe,
            r.total_trades,
            r.win_rate,
            r.profit_factor,
            r.sharpe,
            r.total_return,
            r.max_drawdown
        );
        hasher.update(line.as_bytes());
    }
    hasher.update(serde_json::to_string(config).unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Rounds
// ============================================================================

struct Filter {
    round: u32,
    label: &'static str,
    metric: fn(&TournamentEntry) -> f64,
    /// True when the metric passes against the threshold
    passes: fn(f64, f64) -> bool,
    threshold: f64,
    op: &'static str,
}

fn filters(config: &TournamentConfig) -> [Filter; 4] {
    [
        Filter {
            round: ROUND_ACTIVITY,
            label: "total_trades",
            metric: |e| e.total_trades as f64,
            passes: |v, t| v >= t,
            threshold: config.min_trades as f64,
            op: ">=",
        },
        Filter {
            round: ROUND_WIN_RATE,
            label: "avg_win_rate",
            metric: |e| e.avg_win_rate,
            passes: |v, t| v >= t,
            threshold: config.min_win_rate,
            op: ">=",
        },
        Filter {
            round: ROUND_PROFIT_FACTOR,
            label: "avg_profit_factor",
            metric: |e| e.avg_profit_factor,
            passes: |v, t| v >= t,
            threshold: config.min_profit_factor,
            op: ">=",
        },
        Filter {
            round: ROUND_DRAWDOWN,
            label: "avg_max_drawdown",
            metric: |e| e.avg_max_drawdown,
            passes: |v, t| v <= t,
            threshold: config.max_drawdown,
            op: "<=",
        },
    ]
}

/// Run the full tournament over a snapshot of stored results
pub fn run_tournament(rows: &[StrategyResult], config: &TournamentConfig) -> TournamentOutcome {
    let id = tournament_id(rows, config);
    let mut entries = aggregate(rows);
    let mut rounds = Vec::new();
    let mut survivors: Vec<usize> = (0..entries.len()).collect();
    let mut survivors_per_round = Vec::with_capacity(4);

    for filter in filters(config) {
        let mut next = Vec::with_capacity(survivors.len());
        for &idx in &survivors {
            let entry = &mut entries[idx];
            let value = (filter.metric)(entry);
            let passed = (filter.passes)(value, filter.threshold);
            let reason = if passed {
                format!("{} {:.2} {} {:.2}", filter.label, value, filter.op, filter.threshold)
            } else {
                format!("{} {:.2} fails {} {:.2}", filter.label, value, filter.op, filter.threshold)
            };

            let action = if passed {
                next.push(idx);
                RoundAction::Survived
            } else {
                entry.final_action = RoundAction::Eliminated;
                entry.eliminated_round = Some(filter.round);
                debug!(strategy = %entry.strategy_id, round = filter.round, %reason, "Eliminated");
                RoundAction::Eliminated
            };

            rounds.push(RoundRecord {
                tournament_id: id.clone(),
                round_number: filter.round,
                strategy_id: entry.strategy_id.clone(),
                strategy_name: entry.strategy_name.clone(),
                action,
                reason,
                score: value,
                rank: None,
            });
        }
        survivors = next;
        survivors_per_round.push(survivors.len());
    }

    // Ranking: score, sort (ties by id), dense rank
    let mut scored: Vec<(usize, f64)> = survivors
        .iter()
        .map(|&idx| (idx, composite_score(&entries[idx], config)))
        .collect();
    scored.sort_by(|(ia, sa), (ib, sb)| {
        sb.total_cmp(sa)
            .then_with(|| entries[*ia].strategy_id.cmp(&entries[*ib].strategy_id))
    });

    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for (idx, score) in scored {
        if previous != Some(score) {
            rank += 1;
            previous = Some(score);
        }
        let action = if rank <= config.top_k {
            RoundAction::Winner
        } else {
            RoundAction::Ranked
        };

        let entry = &mut entries[idx];
        entry.final_action = action;
        entry.composite_score = Some(score);
        entry.rank = Some(rank);

        rounds.push(RoundRecord {
            tournament_id: id.clone(),
            round_number: ROUND_RANKING,
            strategy_id: entry.strategy_id.clone(),
            strategy_name: entry.strategy_name.clone(),
            action,
            reason: format!("composite score {score:.2}, rank {rank}"),
            score,
            rank: Some(rank),
        });
    }

    info!(
        tournament_id = %&id[..12.min(id.len())],
        strategies = entries.len(),
        survivors = survivors.len(),
        winners = entries.iter().filter(|e| e.final_action == RoundAction::Winner).count(),
        "Tournament complete"
    );

    TournamentOutcome {
        tournament_id: id,
        entries,
        rounds,
        survivors_per_round,
    }
}
