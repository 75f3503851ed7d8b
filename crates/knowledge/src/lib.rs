//! Vector stores for Tether's knowledge retrieval.
//!
//! The [`KnowledgeBase`](tether_core::KnowledgeBase) composition lives in core;
//! this crate supplies the [`VectorStore`] implementations it runs against.

pub mod in_memory;
pub mod similarity;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryVectorStore;
pub use similarity::cosine_similarity;

#[cfg(feature = "postgres")]
pub use postgres::PostgresVectorStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;

use std::sync::Arc;
use tether_core::error::KnowledgeError;
use tether_core::knowledge::VectorStore;
use tracing::info;

/// Build a vector store from its identifier: `inmemory`, `sqlite` or `postgres`.
///
/// `path` is the database file for `sqlite` and the connection URL for
/// `postgres`. `inmemory` ignores it.
pub async fn build_vector_store(kind: &str, path: Option<&str>) -> Result<Arc<dyn VectorStore>, KnowledgeError> {
    info!(backend = kind, "Building vector store");
    match kind {
        "inmemory" => Ok(Arc::new(InMemoryVectorStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = path.ok_or_else(|| KnowledgeError::Store("sqlite vector store requires a path".into()))?;
            Ok(Arc::new(SqliteVectorStore::new(path).await?))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url =
                path.ok_or_else(|| KnowledgeError::Store("postgres vector store requires a connection URL".into()))?;
            Ok(Arc::new(PostgresVectorStore::connect(url).await?))
        }
        other => Err(KnowledgeError::UnsupportedBackend(other.to_string())),
    }
}
