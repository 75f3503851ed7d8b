//! Column encoding shared by the SQL backends.
//!
//! Tool calls and attachments are stored as JSON text so every backend can use
//! plain `TEXT` columns.

use chrono::{DateTime, Utc};
use tether_core::error::MemoryError;
use tether_core::message::{Message, Role};

/// A message flattened into SQL column values.
pub(crate) struct MessageRecord {
    pub id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: String,
    pub tool_call_id: Option<String>,
    pub attachments: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn encode(message: &Message) -> Result<Self, MemoryError> {
        let tool_calls = serde_json::to_string(&message.tool_calls)
            .map_err(|e| MemoryError::Storage(format!("Tool call serialization: {e}")))?;
        let attachments = serde_json::to_string(&message.attachments)
            .map_err(|e| MemoryError::Storage(format!("Attachment serialization: {e}")))?;
        Ok(Self {
            id: message.id.clone(),
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
            attachments,
            created_at: message.timestamp,
        })
    }

    pub fn decode(self, session_id: &str) -> Result<Message, MemoryError> {
        let corrupted = |reason: String| MemoryError::Corrupted {
            session: session_id.to_string(),
            reason,
        };
        let role = Role::parse(&self.role).ok_or_else(|| corrupted(format!("unknown role '{}'", self.role)))?;
        let tool_calls = decode_list(&self.tool_calls).map_err(|e| corrupted(format!("tool_calls: {e}")))?;
        let attachments = decode_list(&self.attachments).map_err(|e| corrupted(format!("attachments: {e}")))?;
        Ok(Message {
            id: self.id,
            role,
            content: self.content,
            tool_calls,
            tool_call_id: self.tool_call_id,
            attachments,
            timestamp: self.created_at,
        })
    }
}

/// Empty text decodes as an empty list.
fn decode_list<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
}
