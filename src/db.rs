//! SQLite persistence: player state snapshots and the score table.
//!
//! The memory store stays authoritative at runtime; this layer hydrates it at
//! startup and receives snapshots from the auto-save sweep.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::store::{PlayerState, StoreError};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoreRow {
    pub id: i64,
    pub name: String,
    pub score: i64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_states (
                player_id TEXT PRIMARY KEY,
                state_json TEXT NOT NULL DEFAULT '{}',
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                score INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Parse a persisted state record. A malformed record is the
    /// `StoreError::Corrupt` case of the error taxonomy.
    pub fn parse_player_state(player_id: &str, json: &str) -> Result<PlayerState, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
            player_id: player_id.to_string(),
            detail: e.to_string(),
        })
    }

    /// Load every persisted player state. Corrupt records are logged and
    /// replaced with defaults rather than failing the load.
    pub async fn load_player_states(&self) -> Result<Vec<(String, PlayerState)>, sqlx::Error> {
        let rows = sqlx::query("SELECT player_id, state_json FROM player_states")
            .fetch_all(&self.pool)
            .await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let player_id: String = row.get("player_id");
            let json: String = row.get("state_json");
            let state = match Self::parse_player_state(&player_id, &json) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("{}; resetting to defaults", e);
                    PlayerState::default()
                }
            };
            states.push((player_id, state));
        }

        Ok(states)
    }

    /// Upsert one player state snapshot
    pub async fn save_player_state(
        &self,
        player_id: &str,
        state: &PlayerState,
    ) -> Result<(), String> {
        let json = serde_json::to_string(state)
            .map_err(|e| format!("Failed to serialize state for {}: {}", player_id, e))?;

        sqlx::query(
            r#"
            INSERT INTO player_states (player_id, state_json, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(player_id) DO UPDATE SET
                state_json = excluded.state_json,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(player_id)
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Database error: {}", e))?;

        Ok(())
    }

    // ========================================================================
    // Score table
    // ========================================================================

    pub async fn add_score(&self, name: &str, score: i64) -> Result<i64, String> {
        let result = sqlx::query("INSERT INTO players (name, score) VALUES (?, ?)")
            .bind(name)
            .bind(score)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn top_scores(&self) -> Result<Vec<ScoreRow>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, score FROM players ORDER BY score DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ScoreRow {
                id: r.get("id"),
                name: r.get("name"),
                score: r.get("score"),
            })
            .collect())
    }

    pub async fn reset_scores(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM players").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
