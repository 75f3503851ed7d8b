//! Error types for the Tether domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator of the agent loop has its own error enum, so callers can
//! tell from the top-level variant which collaborator failed.

use thiserror::Error;

/// The top-level error type for all Tether operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Registration / assembly ---
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] MemoryError),

    // --- Knowledge errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] KnowledgeError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Loop bound ---
    #[error("Agent did not produce a final answer within {max_steps} steps")]
    MaxStepsExceeded { max_steps: usize },

    // --- Cancellation ---
    #[error("Agent was cancelled")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported message: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Corrupted record in session {session}: {reason}")]
    Corrupted { session: String, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Unsupported memory backend: {0}")]
    UnsupportedBackend(String),
}

#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Got {vectors} vectors for {documents} documents")]
    LengthMismatch { vectors: usize, documents: usize },

    #[error("Unsupported vector store: {0}")]
    UnsupportedBackend(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool {0} not found")]
    NotFound(String),

    #[error("Failed to parse arguments for {tool_name}: {reason}")]
    ArgumentParse { tool_name: String, reason: String },

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}
