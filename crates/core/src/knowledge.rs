//! Knowledge retrieval: embeddings plus a vector index.
//!
//! [`KnowledgeBase`] composes an [`Embedder`] and a [`VectorStore`] into the
//! two operations the agent needs: ingest documents, and retrieve the top-k
//! documents for a query.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KnowledgeError;

/// A piece of reference text with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Similarity score, only set on search results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: serde_json::Map::new(),
            score: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generates embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, KnowledgeError>;
}

/// Stores document vectors and answers similarity queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite documents by id.
    async fn upsert(
        &self,
        vectors: Vec<Vec<f32>>,
        documents: Vec<Document>,
    ) -> std::result::Result<(), KnowledgeError>;

    /// At most `limit` documents, highest score first.
    async fn search(&self, query: &[f32], limit: usize) -> std::result::Result<Vec<Document>, KnowledgeError>;
}

/// An embedder paired with a vector store.
#[derive(Clone)]
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed the documents' contents and upsert them.
    pub async fn ingest(&self, documents: Vec<Document>) -> std::result::Result<(), KnowledgeError> {
        if documents.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(KnowledgeError::LengthMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
            });
        }
        debug!(count = documents.len(), "Ingesting documents");
        self.store.upsert(vectors, documents).await
    }

    /// Find the `k` documents most similar to `query`.
    ///
    /// Returns an empty list when the embedder yields no vector for the query.
    pub async fn retrieve(&self, query: &str, k: usize) -> std::result::Result<Vec<Document>, KnowledgeError> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        if vectors.is_empty() {
            debug!("Embedder returned no vector for query; skipping search");
            return Ok(Vec::new());
        }
        let query_vector = vectors.swap_remove(0);
        self.store.search(&query_vector, k).await
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase").finish_non_exhaustive()
    }
}
