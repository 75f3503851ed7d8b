//! In-memory vector store with brute-force cosine search.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::error::KnowledgeError;
use tether_core::knowledge::{Document, VectorStore};
use tokio::sync::RwLock;

use crate::similarity;

#[derive(Default)]
struct Entries {
    rows: Vec<(Vec<f32>, Document)>,
    index: HashMap<String, usize>,
}

/// Vectors held in process memory. Upserting an existing id replaces it in place.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, vectors: Vec<Vec<f32>>, documents: Vec<Document>) -> Result<(), KnowledgeError> {
        if vectors.len() != documents.len() {
            return Err(KnowledgeError::LengthMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
            });
        }

        let mut entries = self.entries.write().await;
        for (vector, doc) in vectors.into_iter().zip(documents) {
            match entries.index.get(&doc.id).copied() {
                Some(pos) => entries.rows[pos] = (vector, doc),
                None => {
                    let pos = entries.rows.len();
                    entries.index.insert(doc.id.clone(), pos);
                    entries.rows.push((vector, doc));
                }
            }
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Document>, KnowledgeError> {
        let entries = self.entries.read().await;
        Ok(similarity::rank(
            entries.rows.iter().map(|(v, d)| (v.as_slice(), d)),
            query,
            limit,
        ))
    }
}
