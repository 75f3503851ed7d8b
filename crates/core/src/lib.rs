//! # Tether Core
//!
//! Domain types, traits, and error definitions for the Tether agent runtime.
//! This crate defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here: [`Provider`],
//! [`Memory`], [`Embedder`] and [`VectorStore`]. Implementations live in their
//! respective crates. This enables:
//! - Choosing backends at construction time via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod knowledge;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, KnowledgeError, MemoryError, ProviderError, Result, ToolError};
pub use knowledge::{Document, Embedder, KnowledgeBase, VectorStore};
pub use memory::Memory;
pub use message::{Attachment, Message, Role, ToolCall};
pub use provider::{ChunkReceiver, Provider, ToolDefinition};
pub use tool::{FieldKind, FieldSpec, ParameterSchema, Tool, ToolArgs, ToolOutput, ToolRegistry};
