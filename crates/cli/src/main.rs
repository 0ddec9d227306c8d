//! Confluence: strategy tournament and live signal pipeline
//!
//! Usage:
//!   confluence backtest --pairs BTCUSDT,ETHUSDT   Backtest every strategy
//!   confluence tournament                         Rank stored results
//!   confluence scan                               Emit confluence signals
//!   confluence monitor                            Resolve active signals
//!   confluence cycle                              All four, in order
//!   confluence stats --recent 20                  Signal performance
//!   confluence export --out results.json          Dump the store as JSON

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use engine::config::parse_pairs;
use engine::pipeline::UnitIssue;
use engine::{
    BacktestReport, BinanceClient, EngineConfig, MarketDataProvider, MonitorReport, Pipeline,
    RunReport, ScanReport, SignalStats, StrategyRegistry, SyntheticProvider, TournamentReport,
};
use persistence::repository::{
    ResultsRepository, SignalRecord, SignalRepository, TournamentRepository,
};
use persistence::Database;
use tracing::info;

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("CONFLUENCE_BUILD"));
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser)]
#[command(name = "confluence")]
#[command(about = "Strategy tournament and live confluence signals", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use a seeded synthetic market instead of Binance
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest every registered strategy on each pair
    Backtest {
        /// Pairs to test (comma-separated), defaults to the configured list
        #[arg(long)]
        pairs: Option<String>,
        /// Candle interval in minutes
        #[arg(long)]
        timeframe: Option<u32>,
    },
    /// Run the elimination tournament over stored backtest results
    Tournament {
        /// Number of ranked strategies to print
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Scan configured pairs with tournament survivors
    Scan,
    /// Check active signals against live prices
    Monitor,
    /// Backtest, tournament, scan and monitor in order
    Cycle {
        #[arg(long)]
        pairs: Option<String>,
        #[arg(long)]
        timeframe: Option<u32>,
    },
    /// Performance and significance of resolved signals
    Stats {
        /// Number of latest signals to list
        #[arg(long, default_value_t = 10)]
        recent: i64,
    },
    /// Export results, the latest tournament and signals as JSON
    Export {
        /// Output file
        #[arg(long)]
        out: String,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,confluence=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,confluence=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let mut config = EngineConfig::from_env().context("Invalid configuration")?;
    if let Commands::Backtest { pairs, timeframe } | Commands::Cycle { pairs, timeframe } = &cli.command {
        if let Some(pairs) = pairs {
            config.pairs = parse_pairs(pairs);
        }
        if let Some(timeframe) = timeframe {
            config.timeframe = *timeframe;
        }
        config.validate().context("Invalid command line overrides")?;
    }

    println!("\n=== Confluence v{} ===", APP_VERSION);
    let db = Database::new(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Database initialization failed: {}", e))?;
    info!(path = %config.db_path, "Database initialized");

    if let Commands::Export { out } = &cli.command {
        return cmd_export(&db, out).await;
    }

    let provider = build_provider(&config, cli.synthetic)?;
    let registry = StrategyRegistry::builtin();
    println!(
        "Database: {} | Strategies: {} | Pairs: {} | Timeframe: {}m | Source: {}",
        config.db_path,
        registry.len(),
        config.pairs.join(", "),
        config.timeframe,
        if cli.synthetic { "synthetic" } else { "binance" }
    );
    let pipeline = Pipeline::new(config, provider, db.pool_clone(), registry);

    match cli.command {
        Commands::Backtest { .. } => {
            print_backtest(&pipeline.run_backtests().await);
        }
        Commands::Tournament { top } => {
            print_tournament(&pipeline.run_tournament().await?, top);
        }
        Commands::Scan => {
            print_scan(&pipeline.live_scan(Utc::now()).await?);
        }
        Commands::Monitor => {
            print_monitor(&pipeline.monitor(Utc::now()).await?);
        }
        Commands::Cycle { .. } => {
            print_backtest(&pipeline.run_backtests().await);
            print_tournament(&pipeline.run_tournament().await?, 10);
            print_scan(&pipeline.live_scan(Utc::now()).await?);
            print_monitor(&pipeline.monitor(Utc::now()).await?);
        }
        Commands::Stats { recent } => {
            print_stats(&pipeline.signal_stats().await?);
            print_recent(&SignalRepository::new(db.pool()).get_recent(recent).await?);
        }
        Commands::Export { .. } => {}
    }

    Ok(())
}

fn build_provider(config: &EngineConfig, synthetic: bool) -> anyhow::Result<Arc<dyn MarketDataProvider>> {
    if synthetic {
        // Anchor the final candle on the current interval boundary
        let step_ms = config.timeframe as i64 * 60_000;
        let now_ms = Utc::now().timestamp_millis();
        let anchor = now_ms - now_ms.rem_euclid(step_ms.max(1));
        return Ok(Arc::new(SyntheticProvider::new(
            SYNTHETIC_SEED,
            config.history_bars as usize,
            anchor,
        )));
    }
    let client = BinanceClient::new(
        &config.binance_base_url,
        Duration::from_secs(config.fetch_timeout_secs),
        config.history_bars,
    )?;
    Ok(Arc::new(client))
}

// ============================================================================
// Output
// ============================================================================

fn print_issues(run: &RunReport) {
    let print = |label: &str, issues: &[UnitIssue]| {
        for issue in issues {
            println!("  {:<8} {:<24} {}", label, issue.unit, issue.reason);
        }
    };
    print("skipped", &run.skipped);
    print("FAILED", &run.failed);
}

fn print_backtest(report: &BacktestReport) {
    println!(
        "\nBacktest: {} pairs done, {} skipped, {} failed, {} rows written",
        report.run.succeeded.len(),
        report.run.skipped.len(),
        report.run.failed.len(),
        report.rows_written
    );
    print_issues(&report.run);

    let mut best: Vec<_> = report.results.iter().filter(|r| r.total_trades > 0).collect();
    best.sort_by(|a, b| b.total_return.total_cmp(&a.total_return));
    if best.is_empty() {
        return;
    }
    println!(
        "\n  {:<28} {:<10} {:>6} {:>7} {:>9} {:>6} {:>7}",
        "Strategy", "Pair", "Trades", "WR%", "Return%", "PF", "MaxDD%"
    );
    println!("  {}", "-".repeat(80));
    for r in best.iter().take(10) {
        println!(
            "  {:<28} {:<10} {:>6} {:>6.1}% {:>+9.2} {:>6.2} {:>7.2}",
            r.strategy_name, r.pair, r.total_trades, r.win_rate, r.total_return, r.profit_factor, r.max_drawdown
        );
    }
}

fn print_tournament(report: &TournamentReport, top: usize) {
    let outcome = &report.outcome;
    println!(
        "\nTournament {} over {} rows, {} strategies",
        &outcome.tournament_id[..outcome.tournament_id.len().min(12)],
        report.rows_loaded,
        outcome.entries.len()
    );
    let labels = ["activity", "win rate", "profit factor", "drawdown"];
    for (label, count) in labels.iter().zip(&outcome.survivors_per_round) {
        println!("  after {:<14} {:>4} remain", label, count);
    }

    let mut ranked: Vec<_> = outcome.survivors().collect();
    ranked.sort_by_key(|e| (e.rank, e.strategy_id.clone()));
    if ranked.is_empty() {
        println!("\nNo strategy survived.");
        return;
    }
    println!(
        "\n  {:>4}  {:<28} {:<14} {:>8} {:>7} {:>6} {:>8} {:<7}",
        "Rank", "Strategy", "Category", "Score", "WR%", "PF", "Return%", "Action"
    );
    println!("  {}", "-".repeat(92));
    for e in ranked.iter().take(top) {
        println!(
            "  {:>4}  {:<28} {:<14} {:>8.2} {:>6.1}% {:>6.2} {:>+8.2} {:<7}",
            e.rank.unwrap_or_default(),
            e.strategy_name,
            e.category,
            e.composite_score.unwrap_or_default(),
            e.avg_win_rate,
            e.avg_profit_factor,
            e.avg_return,
            e.final_action.as_str()
        );
    }
}

fn print_scan(report: &ScanReport) {
    println!(
        "\nScan: {} survivors, {} new signals",
        report.survivors,
        report.signals.len()
    );
    print_issues(&report.run);
    for s in &report.signals {
        println!(
            "  {:<10} {} entry {} tp {} (+{}%) sl {} (-{}%) conf {} [{}]",
            s.pair,
            s.direction.as_str(),
            s.entry_price,
            s.tp_price,
            s.tp_pct.round_dp(2),
            s.sl_price,
            s.sl_pct.round_dp(2),
            s.confidence,
            s.contributing_strategies.join(", ")
        );
    }
}

fn print_monitor(report: &MonitorReport) {
    println!(
        "\nMonitor: {} checked, {} still active, {} resolved",
        report.checked,
        report.still_active,
        report.resolved.len()
    );
    print_issues(&report.run);
    for s in &report.resolved {
        println!(
            "  {:<10} {:<8} exit {} pnl {}%",
            s.pair,
            s.exit_reason.map(|r| r.as_str()).unwrap_or("-"),
            s.exit_price.unwrap_or(s.current_price),
            s.pnl_pct.round_dp(2)
        );
    }
}

fn print_stats(stats: &SignalStats) {
    println!("\nSignals: {} total, {} active, {} resolved", stats.total_signals, stats.active, stats.resolved);
    if stats.resolved == 0 {
        return;
    }
    println!(
        "  Wins {} / Losses {} ({:.1}%)  TP {} | SL {} | Expired {}",
        stats.wins, stats.losses, stats.win_rate, stats.tp_hits, stats.sl_hits, stats.expired
    );
    println!(
        "  PnL avg {:+.2}% total {:+.2}% best {:+.2}% worst {:+.2}%",
        stats.avg_pnl_pct, stats.total_pnl_pct, stats.best_pnl_pct, stats.worst_pnl_pct
    );
    println!(
        "  Breakeven {:.1}% | p = {:.4} | Wilson [{:.1}%, {:.1}%] | {}",
        stats.null_win_rate * 100.0,
        stats.p_value,
        stats.wilson_lower * 100.0,
        stats.wilson_upper * 100.0,
        if stats.significant { "SIGNIFICANT" } else { "not significant" }
    );
}

fn print_recent(signals: &[SignalRecord]) {
    if signals.is_empty() {
        return;
    }
    println!("\nLatest {} signals:", signals.len());
    for s in signals {
        let opened = Utc
            .timestamp_millis_opt(s.created_at)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<10} {:<8} {:<8} entry {} pnl {}% ({} checks)",
            opened,
            s.pair,
            s.status,
            s.exit_reason.as_deref().unwrap_or("-"),
            s.entry_price,
            s.pnl_pct,
            s.check_count
        );
    }
}

// ============================================================================
// Export
// ============================================================================

async fn cmd_export(db: &Database, out: &str) -> anyhow::Result<()> {
    let pool = db.pool();
    let results = ResultsRepository::new(pool).get_all().await?;
    let tournaments = TournamentRepository::new(pool);
    let tournament = match tournaments.latest().await? {
        Some(header) => {
            let entries = tournaments.get_entries(&header.tournament_id).await?;
            let rounds = tournaments.get_rounds(&header.tournament_id).await?;
            serde_json::json!({
                "header": header,
                "entries": entries,
                "rounds": rounds,
            })
        }
        None => serde_json::Value::Null,
    };
    let signals = SignalRepository::new(pool).get_all().await?;

    let export = serde_json::json!({
        "version": APP_VERSION,
        "exported_at": Utc::now().to_rfc3339(),
        "strategy_results": results,
        "tournament": tournament,
        "signals": signals,
    });
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(out, &json).with_context(|| format!("Failed to write {out}"))?;
    println!(
        "\nExported {} results, {} signals to {}",
        results.len(),
        signals.len(),
        out
    );

    Ok(())
}
