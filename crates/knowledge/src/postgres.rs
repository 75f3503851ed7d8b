//! PostgreSQL vector store.
//!
//! Documents live in a `tether_documents` table with the embedding as a
//! `REAL[]` column. Ranking happens in-process with the same cosine scoring
//! as the SQLite store, so no server extension is required.
//!
//! # Feature gate
//!
//! ```toml
//! tether-knowledge = { workspace = true, features = ["postgres"] }
//! ```

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tether_core::error::KnowledgeError;
use tether_core::knowledge::{Document, VectorStore};
use tracing::{debug, info};

use crate::similarity;

/// Documents and embeddings in a PostgreSQL database.
pub struct PostgresVectorStore {
    pool: PgPool,
}

impl PostgresVectorStore {
    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, KnowledgeError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| KnowledgeError::Store(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to PostgreSQL for vector store");
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create from an existing connection pool. Call [`Self::migrate`] before use.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), KnowledgeError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tether_documents (
                id         TEXT PRIMARY KEY,
                content    TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                embedding  REAL[] NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KnowledgeError::Store(format!("tether_documents table: {e}")))?;

        debug!("PostgreSQL vector store migrations complete");
        Ok(())
    }

    fn row_to_entry(row: &PgRow) -> Result<(Vec<f32>, Document), KnowledgeError> {
        let column = |name: &str, e: sqlx::Error| KnowledgeError::Store(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let metadata: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;
        let vector: Vec<f32> = row.try_get("embedding").map_err(|e| column("embedding", e))?;

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
impl VectorStore for PostgresVectorStore {
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
                INSERT INTO tether_documents (id, content, metadata, embedding)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    content = EXCLUDED.content,
                    metadata = EXCLUDED.metadata,
                    embedding = EXCLUDED.embedding
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.content)
            .bind(metadata)
            .bind(vector)
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
        let rows = sqlx::query("SELECT id, content, metadata, embedding FROM tether_documents")
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
