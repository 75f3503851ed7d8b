//! Conversation memory backends for Tether.
//!
//! Every backend implements [`tether_core::Memory`]: append a message to a
//! session log, and load the log back in save order.

pub mod file_backend;
pub mod in_memory;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod record;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use std::sync::Arc;
use tether_core::error::MemoryError;
use tether_core::memory::Memory;
use tracing::info;

/// Build a memory backend from its identifier.
///
/// `connection` is a directory for `file`, a database path for `sqlite` and a
/// connection URL for `postgres`. `inmemory` ignores it. When omitted, `file`
/// and `sqlite` fall back to locations under `~/.tether`.
pub async fn build_memory(kind: &str, connection: Option<&str>) -> Result<Arc<dyn Memory>, MemoryError> {
    info!(backend = kind, "Building memory backend");
    match kind {
        "inmemory" => Ok(Arc::new(InMemoryStore::new())),
        "file" => {
            let dir = connection
                .map(std::path::PathBuf::from)
                .unwrap_or_else(FileStore::default_dir);
            Ok(Arc::new(FileStore::new(dir)))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = match connection {
                Some(p) => p.to_string(),
                None => default_sqlite_path()?,
            };
            Ok(Arc::new(SqliteStore::new(&path).await?))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = connection.ok_or_else(|| {
                MemoryError::Storage("postgres backend requires a connection URL".into())
            })?;
            Ok(Arc::new(PostgresStore::connect(url).await?))
        }
        other => Err(MemoryError::UnsupportedBackend(other.to_string())),
    }
}

/// `~/.tether/memory.db`, creating `~/.tether` if needed.
#[cfg(feature = "sqlite")]
fn default_sqlite_path() -> Result<String, MemoryError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let dir = std::path::PathBuf::from(home).join(".tether");
    std::fs::create_dir_all(&dir)
        .map_err(|e| MemoryError::Storage(format!("Failed to create {}: {e}", dir.display())))?;
    Ok(dir.join("memory.db").to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::message::Message;

    #[tokio::test]
    async fn builds_inmemory() {
        let memory = build_memory("inmemory", None).await.unwrap();
        assert_eq!(memory.name(), "inmemory");
        memory.save("s", &Message::user("x")).await.unwrap();
        assert_eq!(memory.load("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn builds_file_store_at_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let memory = build_memory("file", tmp.path().to_str()).await.unwrap();
        assert_eq!(memory.name(), "file");
        memory.save("s", &Message::user("x")).await.unwrap();
        assert!(tmp.path().join("s.jsonl").exists());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn builds_sqlite() {
        let memory = build_memory("sqlite", Some(":memory:")).await.unwrap();
        assert_eq!(memory.name(), "sqlite");
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let err = build_memory("redis", None).await.err().unwrap();
        assert!(matches!(err, MemoryError::UnsupportedBackend(ref k) if k == "redis"));
    }
}
