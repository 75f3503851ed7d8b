//! Memory trait: append-only conversation logs scoped by session.
//!
//! The agent saves every message it produces or receives, and reloads the
//! full log at the start of each run. The store, not the agent, owns history.

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::Message;

/// The core Memory trait.
///
/// Implementations: in-memory (process-local), JSONL files, SQLite, PostgreSQL.
#[async_trait]
pub trait Memory: Send + Sync {
    /// The backend name (e.g., "sqlite", "inmemory").
    fn name(&self) -> &str;

    /// Append a message to the session log. Never rewrites earlier messages.
    async fn save(&self, session_id: &str, message: &Message) -> std::result::Result<(), MemoryError>;

    /// Load a session log in save order. An unknown session yields an empty log.
    async fn load(&self, session_id: &str) -> std::result::Result<Vec<Message>, MemoryError>;
}
