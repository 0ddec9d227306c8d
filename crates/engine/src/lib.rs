//! Confluence Engine: strategy evaluation pipeline
//!
//! Provides:
//! - Indicator library and a pre-computed `IndicatorBundle`
//! - A registry of ~100 rule-based long-entry strategies
//! - Walk-forward backtest simulator with ATR-scaled exits
//! - Five-round elimination tournament with an audit trail
//! - Live confluence scanner and signal monitor
//! - Binomial significance statistics over resolved signals
//! - Binance public API client and a synthetic market for offline runs

pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod indicators;
pub mod monitor;
pub mod pipeline;
pub mod provider;
pub mod records;
pub mod scanner;
pub mod stats;
pub mod strategies;
pub mod tournament;
pub mod types;

// Re-exports for convenience
pub use api::BinanceClient;
pub use backtest::{run_strategy, simulate};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use indicators::IndicatorBundle;
pub use monitor::{check_signal, CheckOutcome};
pub use pipeline::{BacktestReport, MonitorReport, Pipeline, RunReport, ScanReport, TournamentReport};
pub use provider::{MarketDataProvider, StaticProvider, SyntheticProvider};
pub use scanner::scan_pair;
pub use stats::SignalStats;
pub use strategies::{Category, Strategy, StrategyDef, StrategyRegistry};
pub use tournament::{run_tournament, RoundAction, TournamentOutcome};
pub use types::*;
