//! Database schema definitions

/// SQL to create all tables
/// NOTE: Signal prices and percentages are stored as TEXT to preserve
/// rust_decimal::Decimal precision; backtest statistics are REAL.
/// Timestamps are epoch milliseconds.
pub const CREATE_TABLES: &str = r#"
-- One row per (strategy, pair, timeframe), recomputed on every backtest run
CREATE TABLE IF NOT EXISTS strategy_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT NOT NULL,
    strategy_name TEXT NOT NULL,
    category TEXT NOT NULL,
    pair TEXT NOT NULL,
    timeframe INTEGER NOT NULL,
    bars INTEGER NOT NULL DEFAULT 0,
    total_trades INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    win_rate REAL NOT NULL DEFAULT 0,
    total_return REAL NOT NULL DEFAULT 0,
    profit_factor REAL NOT NULL DEFAULT 0,
    sharpe REAL NOT NULL DEFAULT 0,
    sortino REAL NOT NULL DEFAULT 0,
    max_drawdown REAL NOT NULL DEFAULT 0,
    avg_win REAL NOT NULL DEFAULT 0,
    avg_loss REAL NOT NULL DEFAULT 0,
    best_trade REAL NOT NULL DEFAULT 0,
    worst_trade REAL NOT NULL DEFAULT 0,
    avg_bars REAL NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    UNIQUE(strategy_id, pair, timeframe)
);

-- Tournament header, id is a digest of the input snapshot
CREATE TABLE IF NOT EXISTS tournaments (
    tournament_id TEXT PRIMARY KEY,
    strategies_tested INTEGER NOT NULL,
    survivors INTEGER NOT NULL,
    winners INTEGER NOT NULL,
    survivors_per_round TEXT NOT NULL,
    config_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tournament_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id TEXT NOT NULL REFERENCES tournaments(tournament_id) ON DELETE CASCADE,
    strategy_id TEXT NOT NULL,
    strategy_name TEXT NOT NULL,
    category TEXT NOT NULL,
    pairs_tested INTEGER NOT NULL,
    pairs_profitable INTEGER NOT NULL,
    total_trades INTEGER NOT NULL,
    avg_win_rate REAL NOT NULL,
    avg_profit_factor REAL NOT NULL,
    avg_sharpe REAL NOT NULL,
    avg_return REAL NOT NULL,
    avg_max_drawdown REAL NOT NULL,
    final_action TEXT NOT NULL,
    eliminated_round INTEGER,
    composite_score REAL,
    rank INTEGER,
    UNIQUE(tournament_id, strategy_id)
);

-- Per-round audit trail
CREATE TABLE IF NOT EXISTS tournament_rounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tournament_id TEXT NOT NULL REFERENCES tournaments(tournament_id) ON DELETE CASCADE,
    round_number INTEGER NOT NULL,
    strategy_id TEXT NOT NULL,
    strategy_name TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT NOT NULL,
    score REAL NOT NULL DEFAULT 0,
    rank INTEGER,
    UNIQUE(tournament_id, round_number, strategy_id)
);

-- Live signals
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pair TEXT NOT NULL,
    timeframe INTEGER NOT NULL,
    direction TEXT NOT NULL,
    entry_price TEXT NOT NULL,
    tp_price TEXT NOT NULL,
    sl_price TEXT NOT NULL,
    tp_pct TEXT NOT NULL,
    sl_pct TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    confluence_count INTEGER NOT NULL,
    contributing_strategies TEXT NOT NULL,
    tournament_id TEXT,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    current_price TEXT NOT NULL,
    pnl_pct TEXT NOT NULL DEFAULT '0',
    peak_pnl_pct TEXT NOT NULL DEFAULT '0',
    trough_pnl_pct TEXT NOT NULL DEFAULT '0',
    check_count INTEGER NOT NULL DEFAULT 0,
    exit_price TEXT,
    exit_reason TEXT,
    created_at INTEGER NOT NULL,
    resolved_at INTEGER
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_results_strategy ON strategy_results(strategy_id);
CREATE INDEX IF NOT EXISTS idx_results_pair ON strategy_results(pair, timeframe);
CREATE INDEX IF NOT EXISTS idx_tournaments_created ON tournaments(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_entries_action ON tournament_entries(tournament_id, final_action);
CREATE INDEX IF NOT EXISTS idx_rounds_strategy ON tournament_rounds(tournament_id, strategy_id);
CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status, pair);
CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at DESC)
"#;

/// Additive column migrations, applied after CREATE_TABLES.
/// Duplicate-column errors on an already migrated database are ignored.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE strategy_results ADD COLUMN expectancy REAL NOT NULL DEFAULT 0",
    "ALTER TABLE strategy_results ADD COLUMN max_consecutive_losses INTEGER NOT NULL DEFAULT 0",
];
