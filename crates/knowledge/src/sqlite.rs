//! SQLite vector store.
//!
//! Embeddings are stored as little-endian `f32` BLOBs next to the document
//! text. Search is a full scan ranked by cosine similarity, which is fine for
//! the few-thousand-document corpora a local agent ingests.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tether_core::error::KnowledgeError;
use tether_core::knowledge::{Document, VectorStore};
use tracing::{debug, info};

use crate::similarity;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path`. `":memory:"` gives an ephemeral store.
    pub async fn new(path: &str) -> Result<Self, KnowledgeError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| KnowledgeError::Store(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| KnowledgeError::Store(format!("Failed to open SQLite: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id         TEXT PRIMARY KEY,
                content    TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                embedding  BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| KnowledgeError::Store(format!("documents table: {e}")))?;

        info!("SQLite vector store initialized at {path}");
        Ok(Self { pool })
    }

    pub async fn count(&self) -> Result<usize, KnowledgeError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| KnowledgeError::Store(format!("COUNT: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| KnowledgeError::Store(format!("cnt column: {e}")))?;
        Ok(count as usize)
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<(Vec<f32>, Document), KnowledgeError> {
        let column = |name: &str, e: sqlx::Error| KnowledgeError::Store(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let metadata: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;
        let blob: Vec<u8> = row.try_get("embedding").map_err(|e| column("embedding", e))?;

        let vector = similarity::blob_to_embedding(&blob).ok_or_else(|| {
            KnowledgeError::Store(format!("document {id}: embedding is {} bytes, not a whole f32 vector", blob.len()))
        })?;
        let metadata = serde_json::from_str(&metadata)
            .map_err(|e| KnowledgeError::Store(format!("document {id}: corrupt metadata: {e}")))?;

        Ok((
            vector,
            Document {
                id,
                content,
                metadata,
                score: None,
            },
        ))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, vectors: Vec<Vec<f32>>, documents: Vec<Document>) -> Result<(), KnowledgeError> {
        if vectors.len() != documents.len() {
            return Err(KnowledgeError::LengthMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
            });
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KnowledgeError::Store(format!("BEGIN failed: {e}")))?;

        for (vector, doc) in vectors.iter().zip(&documents) {
            let metadata = serde_json::to_string(&doc.metadata)
                .map_err(|e| KnowledgeError::Store(format!("Metadata serialization: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO documents (id, content, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.content)
            .bind(metadata)
            .bind(similarity::embedding_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| KnowledgeError::Store(format!("UPSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| KnowledgeError::Store(format!("COMMIT failed: {e}")))?;
        debug!(count = documents.len(), "Upserted documents");
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Document>, KnowledgeError> {
        let rows = sqlx::query("SELECT id, content, metadata, embedding FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| KnowledgeError::Store(format!("Vector scan: {e}")))?;

        let entries = rows.iter().map(Self::row_to_entry).collect::<Result<Vec<_>, _>>()?;

        Ok(similarity::rank(
            entries.iter().map(|(v, d)| (v.as_slice(), d)),
            query,
            limit,
        ))
    }
}
