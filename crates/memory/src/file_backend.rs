//! File-based memory backend: one JSON-lines file per session.
//!
//! Each line is a JSON-encoded [`Message`]. Saving appends a single line, so
//! earlier messages are never rewritten and the file reads back in save order.
//!
//! Storage location: `~/.tether/sessions/<session>.jsonl`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tether_core::error::MemoryError;
use tether_core::memory::Memory;
use tether_core::message::Message;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// A directory of JSONL session logs.
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default directory: `~/.tether/sessions`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".tether").join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", encode_session_id(session_id)))
    }
}

/// Map a session id to a file stem. Characters outside `[A-Za-z0-9_-]` are
/// percent-encoded so distinct ids never share a file.
fn encode_session_id(session_id: &str) -> String {
    let mut out = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    if out.is_empty() {
        out.push_str("%");
    }
    out
}

#[async_trait]
impl Memory for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, session_id: &str, message: &Message) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize message: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to create session directory: {e}")))?;

        let path = self.session_path(session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to append to {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to flush {}: {e}", path.display())))?;

        debug!(session = session_id, path = %path.display(), "Appended message");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let path = self.session_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<Message>(line).map_err(|e| MemoryError::Corrupted {
                    session: session_id.to_string(),
                    reason: format!("line {}: {e}", n + 1),
                })
            })
            .collect()
    }
}
