//! Signal repository: live signals and their resolution state

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted signal. Prices and percentages are Decimal strings,
/// `contributing_strategies` is a JSON array of strategy names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub pair: String,
    pub timeframe: i64,
    pub direction: String,
    pub entry_price: String,
    pub tp_price: String,
    pub sl_price: String,
    pub tp_pct: String,
    pub sl_pct: String,
    pub confidence: i64,
    pub confluence_count: i64,
    pub contributing_strategies: String,
    pub tournament_id: Option<String>,
    pub status: String,
    pub current_price: String,
    pub pnl_pct: String,
    pub peak_pnl_pct: String,
    pub trough_pnl_pct: String,
    pub check_count: i64,
    pub exit_price: Option<String>,
    pub exit_reason: Option<String>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

pub struct SignalRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SignalRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new signal and return its row id
    pub async fn insert(&self, record: &SignalRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO signals
                (pair, timeframe, direction, entry_price, tp_price, sl_price, tp_pct, sl_pct,
                 confidence, confluence_count, contributing_strategies, tournament_id,
                 status, current_price, pnl_pct, peak_pnl_pct, trough_pnl_pct, check_count,
                 exit_price, exit_reason, created_at, resolved_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            "#,
        )
        .bind(&record.pair)
        .bind(record.timeframe)
        .bind(&record.direction)
        .bind(&record.entry_price)
        .bind(&record.tp_price)
        .bind(&record.sl_price)
        .bind(&record.tp_pct)
        .bind(&record.sl_pct)
        .bind(record.confidence)
        .bind(record.confluence_count)
        .bind(&record.contributing_strategies)
        .bind(&record.tournament_id)
        .bind(&record.status)
        .bind(&record.current_price)
        .bind(&record.pnl_pct)
        .bind(&record.peak_pnl_pct)
        .bind(&record.trough_pnl_pct)
        .bind(record.check_count)
        .bind(&record.exit_price)
        .bind(&record.exit_reason)
        .bind(record.created_at)
        .bind(record.resolved_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Write a monitor check. Only rows still ACTIVE are touched, so a
    /// resolved signal can never be resolved twice. Returns whether a row
    /// was updated.
    pub async fn update_check(&self, record: &SignalRecord) -> DbResult<bool> {
        let id = match record.id {
            Some(id) => id,
            None => return Ok(false),
        };
        let result = sqlx::query(
            r#"UPDATE signals SET
                 status = ?1,
                 current_price = ?2,
                 pnl_pct = ?3,
                 peak_pnl_pct = ?4,
                 trough_pnl_pct = ?5,
                 check_count = ?6,
                 exit_price = ?7,
                 exit_reason = ?8,
                 resolved_at = ?9
               WHERE id = ?10 AND status = 'ACTIVE'
            "#,
        )
        .bind(&record.status)
        .bind(&record.current_price)
        .bind(&record.pnl_pct)
        .bind(&record.peak_pnl_pct)
        .bind(&record.trough_pnl_pct)
        .bind(record.check_count)
        .bind(&record.exit_price)
        .bind(&record.exit_reason)
        .bind(record.resolved_at)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<SignalRecord>> {
        let record = sqlx::query_as::<_, SignalRecord>("SELECT * FROM signals WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// ACTIVE signals, oldest first
    pub async fn get_active(&self) -> DbResult<Vec<SignalRecord>> {
        let records = sqlx::query_as::<_, SignalRecord>(
            "SELECT * FROM signals WHERE status = 'ACTIVE' ORDER BY created_at, id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn has_active_for_pair(&self, pair: &str) -> DbResult<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM signals WHERE pair = ?1 AND status = 'ACTIVE'")
                .bind(pair)
                .fetch_one(self.pool)
                .await?;

        Ok(row.0 > 0)
    }

    /// Every signal, oldest first
    pub async fn get_all(&self) -> DbResult<Vec<SignalRecord>> {
        let records = sqlx::query_as::<_, SignalRecord>("SELECT * FROM signals ORDER BY created_at, id")
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    /// Most recent signals first
    pub async fn get_recent(&self, limit: i64) -> DbResult<Vec<SignalRecord>> {
        let records = sqlx::query_as::<_, SignalRecord>(
            "SELECT * FROM signals ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn active(pair: &str, created_at: i64) -> SignalRecord {
        SignalRecord {
            id: None,
            pair: pair.to_string(),
            timeframe: 60,
            direction: "LONG".to_string(),
            entry_price: "100.5".to_string(),
            tp_price: "103".to_string(),
            sl_price: "99".to_string(),
            tp_pct: "2.48756219".to_string(),
            sl_pct: "1.49253731".to_string(),
            confidence: 70,
            confluence_count: 2,
            contributing_strategies: r#"["EMA Cross","RSI Bounce"]"#.to_string(),
            tournament_id: Some("t1".to_string()),
            status: "ACTIVE".to_string(),
            current_price: "100.5".to_string(),
            pnl_pct: "0".to_string(),
            peak_pnl_pct: "0".to_string(),
            trough_pnl_pct: "0".to_string(),
            check_count: 0,
            exit_price: None,
            exit_reason: None,
            created_at,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::in_memory().await.unwrap();
        let repo = SignalRepository::new(db.pool());

        let id = repo.insert(&active("BTCUSDT", 1)).await.unwrap();
        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.entry_price, "100.5");
        assert_eq!(stored.contributing_strategies, r#"["EMA Cross","RSI Bounce"]"#);
        assert!(repo.has_active_for_pair("BTCUSDT").await.unwrap());
        assert!(!repo.has_active_for_pair("ETHUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_only_touches_active_rows() {
        let db = Database::in_memory().await.unwrap();
        let repo = SignalRepository::new(db.pool());

        let id = repo.insert(&active("BTCUSDT", 1)).await.unwrap();
        let mut resolved = repo.get(id).await.unwrap().unwrap();
        resolved.status = "RESOLVED".to_string();
        resolved.current_price = "103.2".to_string();
        resolved.exit_price = Some("103.2".to_string());
        resolved.exit_reason = Some("TP_HIT".to_string());
        resolved.check_count = 1;
        resolved.resolved_at = Some(2);
        assert!(repo.update_check(&resolved).await.unwrap());

        let mut again = resolved.clone();
        again.exit_reason = Some("SL_HIT".to_string());
        again.check_count = 2;
        assert!(!repo.update_check(&again).await.unwrap());

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.exit_reason.as_deref(), Some("TP_HIT"));
        assert_eq!(stored.check_count, 1);
        assert!(repo.get_active().await.unwrap().is_empty());
        assert!(!repo.has_active_for_pair("BTCUSDT").await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_order() {
        let db = Database::in_memory().await.unwrap();
        let repo = SignalRepository::new(db.pool());
        repo.insert(&active("A", 30)).await.unwrap();
        repo.insert(&active("B", 10)).await.unwrap();
        repo.insert(&active("C", 20)).await.unwrap();

        let pairs = |rs: Vec<SignalRecord>| rs.into_iter().map(|r| r.pair).collect::<Vec<_>>();
        assert_eq!(pairs(repo.get_all().await.unwrap()), vec!["B", "C", "A"]);
        assert_eq!(pairs(repo.get_recent(2).await.unwrap()), vec!["A", "C"]);
        assert_eq!(repo.get_active().await.unwrap().len(), 3);
    }
}
