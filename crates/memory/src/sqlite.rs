//! SQLite backend.
//!
//! A single `messages` table holds every session. The autoincrement `seq`
//! column records save order, and loads sort on it.

use crate::record::MessageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tether_core::error::MemoryError;
use tether_core::memory::Memory;
use tether_core::message::Message;
use tracing::{debug, info};

/// Conversation logs in a SQLite database file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory backend initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id   TEXT NOT NULL,
                id           TEXT NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                tool_calls   TEXT NOT NULL DEFAULT '[]',
                tool_call_id TEXT,
                attachments  TEXT NOT NULL DEFAULT '[]',
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("session index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow, session_id: &str) -> Result<MessageRecord, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::Corrupted {
                session: session_id.to_string(),
                reason: format!("created_at: {e}"),
            })?;

        Ok(MessageRecord {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            role: row.try_get("role").map_err(|e| column("role", e))?,
            content: row.try_get("content").map_err(|e| column("content", e))?,
            tool_calls: row.try_get("tool_calls").map_err(|e| column("tool_calls", e))?,
            tool_call_id: row.try_get("tool_call_id").map_err(|e| column("tool_call_id", e))?,
            attachments: row.try_get("attachments").map_err(|e| column("attachments", e))?,
            created_at,
        })
    }
}

#[async_trait]
impl Memory for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, session_id: &str, message: &Message) -> Result<(), MemoryError> {
        let record = MessageRecord::encode(message)?;
        sqlx::query(
            r#"
            INSERT INTO messages
                (session_id, id, role, content, tool_calls, tool_call_id, attachments, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(session_id)
        .bind(&record.id)
        .bind(&record.role)
        .bind(&record.content)
        .bind(&record.tool_calls)
        .bind(&record.tool_call_id)
        .bind(&record.attachments)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(session = session_id, role = %message.role, "Saved message");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Session load: {e}")))?;

        rows.iter()
            .map(|row| Self::row_to_record(row, session_id)?.decode(session_id))
            .collect()
    }
}
