//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of text chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ParameterSchema;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: ParameterSchema,
}

/// Receiving half of a provider text stream.
///
/// The producer closes the channel when the response is complete. A failure
/// mid-stream is delivered as a final `Err` item before closing.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<String, ProviderError>>;

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `chat()` or
/// `stream()` without knowing which backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// One round trip. The returned message always has the assistant role.
    async fn chat(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> std::result::Result<Message, ProviderError>;

    /// Send the conversation and get a stream of text chunks.
    ///
    /// Default implementation calls `chat()` and emits its content as a single chunk.
    async fn stream(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.chat(history, tools).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(response.content)).await;
        Ok(rx)
    }
}
