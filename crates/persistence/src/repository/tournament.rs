//! Tournament repository: headers, final entries and the round audit trail

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TournamentRecord {
    pub tournament_id: String,
    pub strategies_tested: i64,
    pub survivors: i64,
    pub winners: i64,
    /// JSON array of survivor counts after each round
    pub survivors_per_round: String,
    pub config_json: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TournamentEntryRecord {
    pub id: Option<i64>,
    pub tournament_id: String,
    pub strategy_id: String,
    pub strategy_name: String,
    pub category: String,
    pub pairs_tested: i64,
    pub pairs_profitable: i64,
    pub total_trades: i64,
    pub avg_win_rate: f64,
    pub avg_profit_factor: f64,
    pub avg_sharpe: f64,
    pub avg_return: f64,
    pub avg_max_drawdown: f64,
    pub final_action: String,
    pub eliminated_round: Option<i64>,
    pub composite_score: Option<f64>,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TournamentRoundRecord {
    pub id: Option<i64>,
    pub tournament_id: String,
    pub round_number: i64,
    pub strategy_id: String,
    pub strategy_name: String,
    pub action: String,
    pub reason: String,
    pub score: f64,
    pub rank: Option<i64>,
}

/// Final actions that carry a strategy into live scanning
pub const SURVIVOR_ACTIONS: [&str; 2] = ["WINNER", "RANKED"];

pub struct TournamentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TournamentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a tournament atomically. Re-saving the same tournament id
    /// upserts every row and refreshes `created_at`.
    pub async fn save(
        &self,
        header: &TournamentRecord,
        entries: &[TournamentEntryRecord],
        rounds: &[TournamentRoundRecord],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO tournaments
                (tournament_id, strategies_tested, survivors, winners,
                 survivors_per_round, config_json, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(tournament_id) DO UPDATE SET
                 strategies_tested = excluded.strategies_tested,
                 survivors = excluded.survivors,
                 winners = excluded.winners,
                 survivors_per_round = excluded.survivors_per_round,
                 config_json = excluded.config_json,
                 created_at = excluded.created_at
            "#,
        )
        .bind(&header.tournament_id)
        .bind(header.strategies_tested)
        .bind(header.survivors)
        .bind(header.winners)
        .bind(&header.survivors_per_round)
        .bind(&header.config_json)
        .bind(header.created_at)
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            sqlx::query(
                r#"INSERT INTO tournament_entries
                    (tournament_id, strategy_id, strategy_name, category, pairs_tested,
                     pairs_profitable, total_trades, avg_win_rate, avg_profit_factor,
                     avg_sharpe, avg_return, avg_max_drawdown, final_action,
                     eliminated_round, composite_score, rank)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                   ON CONFLICT(tournament_id, strategy_id) DO UPDATE SET
                     strategy_name = excluded.strategy_name,
                     category = excluded.category,
                     pairs_tested = excluded.pairs_tested,
                     pairs_profitable = excluded.pairs_profitable,
                     total_trades = excluded.total_trades,
                     avg_win_rate = excluded.avg_win_rate,
                     avg_profit_factor = excluded.avg_profit_factor,
                     avg_sharpe = excluded.avg_sharpe,
                     avg_return = excluded.avg_return,
                     avg_max_drawdown = excluded.avg_max_drawdown,
                     final_action = excluded.final_action,
                     eliminated_round = excluded.eliminated_round,
                     composite_score = excluded.composite_score,
                     rank = excluded.rank
                "#,
            )
            .bind(&entry.tournament_id)
            .bind(&entry.strategy_id)
            .bind(&entry.strategy_name)
            .bind(&entry.category)
            .bind(entry.pairs_tested)
            .bind(entry.pairs_profitable)
            .bind(entry.total_trades)
            .bind(entry.avg_win_rate)
            .bind(entry.avg_profit_factor)
            .bind(entry.avg_sharpe)
            .bind(entry.avg_return)
            .bind(entry.avg_max_drawdown)
            .bind(&entry.final_action)
            .bind(entry.eliminated_round)
            .bind(entry.composite_score)
            .bind(entry.rank)
            .execute(&mut *tx)
            .await?;
        }

        for round in rounds {
            sqlx::query(
                r#"INSERT INTO tournament_rounds
                    (tournament_id, round_number, strategy_id, strategy_name,
                     action, reason, score, rank)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(tournament_id, round_number, strategy_id) DO UPDATE SET
                     strategy_name = excluded.strategy_name,
                     action = excluded.action,
                     reason = excluded.reason,
                     score = excluded.score,
                     rank = excluded.rank
                "#,
            )
            .bind(&round.tournament_id)
            .bind(round.round_number)
            .bind(&round.strategy_id)
            .bind(&round.strategy_name)
            .bind(&round.action)
            .bind(&round.reason)
            .bind(round.score)
            .bind(round.rank)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Most recently run tournament
    pub async fn latest(&self) -> DbResult<Option<TournamentRecord>> {
        let record = sqlx::query_as::<_, TournamentRecord>(
            "SELECT * FROM tournaments ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(&self, tournament_id: &str) -> DbResult<Option<TournamentRecord>> {
        let record = sqlx::query_as::<_, TournamentRecord>(
            "SELECT * FROM tournaments WHERE tournament_id = ?1",
        )
        .bind(tournament_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// All entries, ranked survivors first then by strategy id
    pub async fn get_entries(&self, tournament_id: &str) -> DbResult<Vec<TournamentEntryRecord>> {
        let records = sqlx::query_as::<_, TournamentEntryRecord>(
            r#"SELECT * FROM tournament_entries
               WHERE tournament_id = ?1
               ORDER BY rank IS NULL, rank, strategy_id"#,
        )
        .bind(tournament_id)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Entries whose final action is WINNER or RANKED
    pub async fn get_survivors(&self, tournament_id: &str) -> DbResult<Vec<TournamentEntryRecord>> {
        let records = sqlx::query_as::<_, TournamentEntryRecord>(
            r#"SELECT * FROM tournament_entries
               WHERE tournament_id = ?1 AND final_action IN (?2, ?3)
               ORDER BY rank, strategy_id"#,
        )
        .bind(tournament_id)
        .bind(SURVIVOR_ACTIONS[0])
        .bind(SURVIVOR_ACTIONS[1])
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_rounds(&self, tournament_id: &str) -> DbResult<Vec<TournamentRoundRecord>> {
        let records = sqlx::query_as::<_, TournamentRoundRecord>(
            r#"SELECT * FROM tournament_rounds
               WHERE tournament_id = ?1
               ORDER BY round_number, strategy_id"#,
        )
        .bind(tournament_id)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Round-by-round decisions for one strategy
    pub async fn get_history(
        &self,
        tournament_id: &str,
        strategy_id: &str,
    ) -> DbResult<Vec<TournamentRoundRecord>> {
        let records = sqlx::query_as::<_, TournamentRoundRecord>(
            r#"SELECT * FROM tournament_rounds
               WHERE tournament_id = ?1 AND strategy_id = ?2
               ORDER BY round_number"#,
        )
        .bind(tournament_id)
        .bind(strategy_id)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn header(id: &str, created_at: i64) -> TournamentRecord {
        TournamentRecord {
            tournament_id: id.to_string(),
            strategies_tested: 2,
            survivors: 1,
            winners: 1,
            survivors_per_round: "[2,1,1,1,1]".to_string(),
            config_json: "{}".to_string(),
            created_at,
        }
    }

    fn entry(tid: &str, sid: &str, action: &str, rank: Option<i64>) -> TournamentEntryRecord {
        TournamentEntryRecord {
            id: None,
            tournament_id: tid.to_string(),
            strategy_id: sid.to_string(),
            strategy_name: sid.to_uppercase(),
            category: "momentum".to_string(),
            pairs_tested: 3,
            pairs_profitable: 2,
            total_trades: 30,
            avg_win_rate: 55.0,
            avg_profit_factor: 1.4,
            avg_sharpe: 0.3,
            avg_return: 4.0,
            avg_max_drawdown: 9.0,
            final_action: action.to_string(),
            eliminated_round: if action == "ELIMINATED" { Some(1) } else { None },
            composite_score: rank.map(|_| 31.5),
            rank,
        }
    }

    fn round(tid: &str, n: i64, sid: &str, action: &str) -> TournamentRoundRecord {
        TournamentRoundRecord {
            id: None,
            tournament_id: tid.to_string(),
            round_number: n,
            strategy_id: sid.to_string(),
            strategy_name: sid.to_uppercase(),
            action: action.to_string(),
            reason: "test".to_string(),
            score: 0.0,
            rank: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_tournament() {
        let db = Database::in_memory().await.unwrap();
        let repo = TournamentRepository::new(db.pool());

        let entries = vec![entry("t1", "a", "WINNER", Some(1)), entry("t1", "b", "ELIMINATED", None)];
        let rounds = vec![
            round("t1", 1, "a", "SURVIVED"),
            round("t1", 1, "b", "ELIMINATED"),
            round("t1", 2, "a", "SURVIVED"),
        ];
        repo.save(&header("t1", 10), &entries, &rounds).await.unwrap();
        // Idempotent re-save
        repo.save(&header("t1", 20), &entries, &rounds).await.unwrap();

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.tournament_id, "t1");
        assert_eq!(latest.created_at, 20);

        assert_eq!(repo.get_entries("t1").await.unwrap().len(), 2);
        let survivors = repo.get_survivors("t1").await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].strategy_id, "a");

        assert_eq!(repo.get_rounds("t1").await.unwrap().len(), 3);
        let history = repo.get_history("t1", "a").await.unwrap();
        assert_eq!(history.iter().map(|r| r.round_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_latest_picks_newest() {
        let db = Database::in_memory().await.unwrap();
        let repo = TournamentRepository::new(db.pool());
        assert!(repo.latest().await.unwrap().is_none());

        repo.save(&header("old", 1), &[], &[]).await.unwrap();
        repo.save(&header("new", 2), &[], &[]).await.unwrap();
        assert_eq!(repo.latest().await.unwrap().unwrap().tournament_id, "new");
        assert!(repo.get("old").await.unwrap().is_some());
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
