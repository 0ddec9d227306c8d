//! Engine configuration
//!
//! All thresholds live here and are passed explicitly at construction.
//! `EngineConfig::from_env` layers `CONFLUENCE_*` variables over the defaults.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::indicators::IndicatorBundle;

const ENV_PREFIX: &str = "CONFLUENCE_";
/// One year of hours
const MAX_HOLD_HOURS_LIMIT: i64 = 24 * 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: String,
    pub pairs: Vec<String>,
    /// Candle interval in minutes
    pub timeframe: u32,
    pub history_bars: u32,
    pub binance_base_url: String,
    pub fetch_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    pub backtest: BacktestConfig,
    pub tournament: TournamentConfig,
    pub scanner: ScannerConfig,
    pub monitor: MonitorConfig,
    pub stats: StatsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "data/confluence.db".to_string(),
            pairs: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeframe: 60,
            history_bars: 1000,
            binance_base_url: "https://api.binance.com".to_string(),
            fetch_timeout_secs: 30,
            max_concurrent_fetches: 4,
            backtest: BacktestConfig::default(),
            tournament: TournamentConfig::default(),
            scanner: ScannerConfig::default(),
            monitor: MonitorConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Bars skipped before the first entry
    pub warmup_bars: usize,
    /// Timeout exit after this many bars in a trade
    pub max_bars_held: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            warmup_bars: IndicatorBundle::WARMUP,
            max_bars_held: 50,
        }
    }
}

/// Composite score weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub avg_return: f64,
    pub drawdown: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            win_rate: 0.4,
            profit_factor: 10.0,
            sharpe: 15.0,
            avg_return: 0.5,
            drawdown: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub min_trades: u32,
    /// Percent; below 50 because ATR exits are asymmetric
    pub min_win_rate: f64,
    pub min_profit_factor: f64,
    /// Percent
    pub max_drawdown: f64,
    /// Dense ranks up to this value are winners
    pub top_k: u32,
    pub profit_factor_cap: f64,
    pub weights: ScoreWeights,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            min_trades: 10,
            min_win_rate: 40.0,
            min_profit_factor: 1.0,
            max_drawdown: 25.0,
            top_k: 10,
            profit_factor_cap: 10.0,
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Bars (including the latest) checked for a fired entry
    pub lookback_bars: usize,
    pub min_confluence: u32,
    /// TP scale added per agreeing strategy beyond the minimum
    pub tp_scale_per_extra: f64,
    pub max_tp_scale: f64,
    pub base_confidence: u32,
    pub confidence_step: u32,
    pub max_confidence: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            lookback_bars: 3,
            min_confluence: 2,
            tp_scale_per_extra: 0.15,
            max_tp_scale: 1.6,
            base_confidence: 50,
            confidence_step: 10,
            max_confidence: 95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub max_hold_hours: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { max_hold_hours: 72 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Two-sided level of the Wilson interval
    pub confidence_level: f64,
    /// Significance threshold for the binomial test
    pub alpha: f64,
    /// Null win rate when no signal carries risk data
    pub default_null_rate: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            alpha: 0.05,
            default_null_rate: 0.5,
        }
    }
}

// ============================================================================
// Environment overrides
// ============================================================================

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) -> EngineResult<()> {
    if let Some(raw) = env_var(key) {
        *target = raw
            .parse()
            .map_err(|_| EngineError::Config(format!("{ENV_PREFIX}{key}={raw} is not valid")))?;
    }
    Ok(())
}

/// Split a comma-separated pair list, upper-casing and dropping blanks
pub fn parse_pairs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .collect()
}

impl EngineConfig {
    /// Defaults overridden by `CONFLUENCE_*` environment variables
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(path) = env_var("DB_PATH") {
            config.db_path = path;
        }
        if let Some(pairs) = env_var("PAIRS") {
            config.pairs = parse_pairs(&pairs);
        }
        if let Some(url) = env_var("BINANCE_URL") {
            config.binance_base_url = url;
        }
        env_parse("TIMEFRAME", &mut config.timeframe)?;
        env_parse("HISTORY_BARS", &mut config.history_bars)?;
        env_parse("FETCH_TIMEOUT_SECS", &mut config.fetch_timeout_secs)?;
        env_parse("MAX_CONCURRENT_FETCHES", &mut config.max_concurrent_fetches)?;
        env_parse("MIN_TRADES", &mut config.tournament.min_trades)?;
        env_parse("MIN_WIN_RATE", &mut config.tournament.min_win_rate)?;
        env_parse("MAX_DRAWDOWN", &mut config.tournament.max_drawdown)?;
        env_parse("TOP_K", &mut config.tournament.top_k)?;
        env_parse("MIN_CONFLUENCE", &mut config.scanner.min_confluence)?;
        env_parse("MAX_HOLD_HOURS", &mut config.monitor.max_hold_hours)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.pairs.is_empty() {
            return Err(EngineError::Config("no pairs configured".into()));
        }
        if self.timeframe == 0 {
            return Err(EngineError::Config("timeframe must be positive".into()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(EngineError::Config(
                "max_concurrent_fetches must be positive".into(),
            ));
        }
        if self.scanner.min_confluence == 0 {
            return Err(EngineError::Config("min_confluence must be at least 1".into()));
        }
        if !(1..=MAX_HOLD_HOURS_LIMIT).contains(&self.monitor.max_hold_hours) {
            return Err(EngineError::Config(format!(
                "max_hold_hours must lie in 1..={MAX_HOLD_HOURS_LIMIT}"
            )));
        }
        if self.scanner.lookback_bars == 0 {
            return Err(EngineError::Config("scanner lookback must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.stats.alpha) || !(0.0..1.0).contains(&self.stats.confidence_level) {
            return Err(EngineError::Config(
                "alpha and confidence_level must lie in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backtest.warmup_bars, 55);
        assert_eq!(config.tournament.min_trades, 10);
        assert_eq!(config.scanner.min_confluence, 2);
        assert_eq!(config.monitor.max_hold_hours, 72);
    }

    #[test]
    fn test_parse_pairs() {
        assert_eq!(parse_pairs(" btcusdt, ETHUSDT ,,"), vec!["BTCUSDT", "ETHUSDT"]);
        assert!(parse_pairs("").is_empty());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"timeframe": 240, "tournament": {"top_k": 3}}"#).unwrap();
        assert_eq!(config.timeframe, 240);
        assert_eq!(config.tournament.top_k, 3);
        assert_eq!(config.tournament.min_trades, 10);
        assert_eq!(config.pairs.len(), 5);
    }

    #[test]
    fn test_validate_rejects_empty_pairs() {
        let config = EngineConfig {
            pairs: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_confluence() {
        let mut config = EngineConfig::default();
        config.scanner.min_confluence = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
        config.scanner.min_confluence = 1;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_bounds_max_hold() {
        for hours in [0, -5, i64::MAX, MAX_HOLD_HOURS_LIMIT + 1] {
            let mut config = EngineConfig::default();
            config.monitor.max_hold_hours = hours;
            assert!(matches!(config.validate(), Err(EngineError::Config(_))), "{hours}");
        }
        let mut config = EngineConfig::default();
        config.monitor.max_hold_hours = MAX_HOLD_HOURS_LIMIT;
        config.validate().unwrap();
    }
}
