//! Persistence layer for the confluence pipeline
//!
//! SQLite storage for backtest results, tournament outcomes with their
//! round-by-round audit trail, and live signals. Each pipeline run opens one
//! `Database`, hands its pool to the engine, and the repositories borrow it.

pub mod repository;
pub mod schema;

pub use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot open store {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("schema statement failed ({reason}): {statement}")]
    Migration { statement: String, reason: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Pragmas applied to every connection the store opens
const PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA foreign_keys=ON",
    "PRAGMA cache_size=-8000",
];

/// Split the schema script into executable statements, dropping comment lines
pub fn schema_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|sql| !sql.is_empty())
        .collect()
}

/// Store holding results, tournaments and signals
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the store at `path`
    pub async fn new(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let target = path.display().to_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DbError::Connection {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        }

        let db = Self::open(&format!("sqlite:{target}?mode=rwc"), &target, 5).await?;
        info!(path = %target, "Database ready");
        Ok(db)
    }

    /// Private in-memory store; one connection so every query sees the same data
    pub async fn in_memory() -> DbResult<Self> {
        Self::open("sqlite::memory:", ":memory:", 1).await
    }

    async fn open(url: &str, target: &str, max_connections: u32) -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| DbError::Connection {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        let db = Self { pool };
        db.apply_schema().await?;
        for pragma in PRAGMAS {
            sqlx::query(pragma).execute(&db.pool).await?;
        }
        Ok(db)
    }

    /// Create tables, then apply additive column migrations.
    ///
    /// A migration whose column already exists is skipped, so reopening an
    /// existing store is a no-op.
    async fn apply_schema(&self) -> DbResult<()> {
        for statement in schema_statements(schema::CREATE_TABLES) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration {
                    reason: e.to_string(),
                    statement,
                })?;
        }

        for migration in schema::MIGRATIONS {
            if let Err(e) = sqlx::query(migration).execute(&self.pool).await {
                let reason = e.to_string();
                if !reason.contains("duplicate column name") {
                    return Err(DbError::Migration {
                        statement: migration.to_string(),
                        reason,
                    });
                }
                debug!(migration, "Column already present");
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Owned pool handle for a `Pipeline`; shares the underlying connections
    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_skip_comments_and_blanks() {
        let script = "-- header\nCREATE TABLE a (x INTEGER);\n\n  -- note\n;CREATE INDEX i ON a(x);\n";
        assert_eq!(
            schema_statements(script),
            vec!["CREATE TABLE a (x INTEGER)", "CREATE INDEX i ON a(x)"]
        );
    }

    #[test]
    fn test_embedded_schema_creates_every_table() {
        let statements = schema_statements(schema::CREATE_TABLES);
        for table in [
            "strategy_results",
            "tournaments",
            "tournament_entries",
            "tournament_rounds",
            "signals",
        ] {
            let create = format!("CREATE TABLE IF NOT EXISTS {table}");
            assert!(statements.iter().any(|s| s.contains(&create)), "{table}");
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_has_migrated_columns() {
        let db = Database::in_memory().await.unwrap();
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('strategy_results')")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = columns.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"expectancy"));
        assert!(names.contains(&"max_consecutive_losses"));
    }

    #[tokio::test]
    async fn test_reopening_file_store_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("confluence-db-{}", std::process::id()));
        let path = dir.join("nested").join("store.db");

        let first = Database::new(&path).await.unwrap();
        sqlx::query("INSERT INTO tournaments (tournament_id, strategies_tested, survivors, winners, survivors_per_round, config_json, created_at) VALUES ('t', 1, 1, 1, '[]', '{}', 1)")
            .execute(first.pool())
            .await
            .unwrap();
        first.pool().close().await;

        let second = Database::new(&path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tournaments")
            .fetch_one(second.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        second.pool().close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
