//! Strategy result repository: one row per (strategy, pair, timeframe)

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted backtest aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StrategyResultRecord {
    pub id: Option<i64>,
    pub strategy_id: String,
    pub strategy_name: String,
    pub category: String,
    pub pair: String,
    pub timeframe: i64,
    pub bars: i64,
    pub total_trades: i64,
    pub wins: i64,
    pub losses: i64,
    pub win_rate: f64,
    pub total_return: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_bars: f64,
    pub expectancy: f64,
    pub max_consecutive_losses: i64,
    pub updated_at: i64,
}

pub struct ResultsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ResultsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace the row for (strategy_id, pair, timeframe)
    pub async fn upsert(&self, record: &StrategyResultRecord) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO strategy_results
                (strategy_id, strategy_name, category, pair, timeframe, bars,
                 total_trades, wins, losses, win_rate, total_return, profit_factor,
                 sharpe, sortino, max_drawdown, avg_win, avg_loss, best_trade,
                 worst_trade, avg_bars, expectancy, max_consecutive_losses, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
               ON CONFLICT(strategy_id, pair, timeframe) DO UPDATE SET
                 strategy_name = excluded.strategy_name,
                 category = excluded.category,
                 bars = excluded.bars,
                 total_trades = excluded.total_trades,
                 wins = excluded.wins,
                 losses = excluded.losses,
                 win_rate = excluded.win_rate,
                 total_return = excluded.total_return,
                 profit_factor = excluded.profit_factor,
                 sharpe = excluded.sharpe,
                 sortino = excluded.sortino,
                 max_drawdown = excluded.max_drawdown,
                 avg_win = excluded.avg_win,
                 avg_loss = excluded.avg_loss,
                 best_trade = excluded.best_trade,
                 worst_trade = excluded.worst_trade,
                 avg_bars = excluded.avg_bars,
                 expectancy = excluded.expectancy,
                 max_consecutive_losses = excluded.max_consecutive_losses,
                 updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.strategy_id)
        .bind(&record.strategy_name)
        .bind(&record.category)
        .bind(&record.pair)
        .bind(record.timeframe)
        .bind(record.bars)
        .bind(record.total_trades)
        .bind(record.wins)
        .bind(record.losses)
        .bind(record.win_rate)
        .bind(record.total_return)
        .bind(record.profit_factor)
        .bind(record.sharpe)
        .bind(record.sortino)
        .bind(record.max_drawdown)
        .bind(record.avg_win)
        .bind(record.avg_loss)
        .bind(record.best_trade)
        .bind(record.worst_trade)
        .bind(record.avg_bars)
        .bind(record.expectancy)
        .bind(record.max_consecutive_losses)
        .bind(record.updated_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Every stored row, ordered for a stable tournament snapshot
    pub async fn get_all(&self) -> DbResult<Vec<StrategyResultRecord>> {
        let records = sqlx::query_as::<_, StrategyResultRecord>(
            "SELECT * FROM strategy_results ORDER BY strategy_id, pair, timeframe",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_for_pair(&self, pair: &str, timeframe: i64) -> DbResult<Vec<StrategyResultRecord>> {
        let records = sqlx::query_as::<_, StrategyResultRecord>(
            r#"SELECT * FROM strategy_results
               WHERE pair = ?1 AND timeframe = ?2
               ORDER BY strategy_id"#,
        )
        .bind(pair)
        .bind(timeframe)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Best rows by total return, only those that traded
    pub async fn get_top(&self, limit: i64) -> DbResult<Vec<StrategyResultRecord>> {
        let records = sqlx::query_as::<_, StrategyResultRecord>(
            r#"SELECT * FROM strategy_results
               WHERE total_trades > 0
               ORDER BY total_return DESC, strategy_id
               LIMIT ?1"#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strategy_results")
            .fetch_one(self.pool)
            .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(strategy_id: &str, pair: &str, total_return: f64) -> StrategyResultRecord {
        StrategyResultRecord {
            id: None,
            strategy_id: strategy_id.to_string(),
            strategy_name: strategy_id.to_uppercase(),
            category: "trend".to_string(),
            pair: pair.to_string(),
            timeframe: 60,
            bars: 1000,
            total_trades: 12,
            wins: 7,
            losses: 5,
            win_rate: 58.3,
            total_return,
            profit_factor: 1.6,
            sharpe: 0.4,
            sortino: 0.7,
            max_drawdown: 8.5,
            avg_win: 2.1,
            avg_loss: -1.2,
            best_trade: 4.0,
            worst_trade: -1.9,
            avg_bars: 9.5,
            expectancy: 0.72,
            max_consecutive_losses: 2,
            updated_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let db = Database::in_memory().await.unwrap();
        let repo = ResultsRepository::new(db.pool());

        repo.upsert(&record("ema_cross", "BTCUSDT", 5.0)).await.unwrap();
        repo.upsert(&record("ema_cross", "BTCUSDT", -3.0)).await.unwrap();
        repo.upsert(&record("ema_cross", "ETHUSDT", 1.0)).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        let rows = repo.get_for_pair("BTCUSDT", 60).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_return, -3.0);
        assert_eq!(rows[0].expectancy, 0.72);
        assert_eq!(rows[0].max_consecutive_losses, 2);
    }

    #[tokio::test]
    async fn test_get_all_is_ordered_and_top_skips_idle() {
        let db = Database::in_memory().await.unwrap();
        let repo = ResultsRepository::new(db.pool());

        let mut idle = record("aaa", "BTCUSDT", 0.0);
        idle.total_trades = 0;
        repo.upsert(&record("zzz", "ETHUSDT", 9.0)).await.unwrap();
        repo.upsert(&idle).await.unwrap();
        repo.upsert(&record("mmm", "BTCUSDT", 4.0)).await.unwrap();

        let ids: Vec<String> = repo.get_all().await.unwrap().into_iter().map(|r| r.strategy_id).collect();
        assert_eq!(ids, vec!["aaa", "mmm", "zzz"]);

        let top = repo.get_top(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].strategy_id, "zzz");
    }
}
