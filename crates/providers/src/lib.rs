//! LLM provider implementations for Tether.
//!
//! All providers implement the `tether_core::Provider` trait.
//! The router builds the configured provider and embedder.

pub mod embedder;
pub mod openai_compat;
pub mod router;

pub use embedder::OpenAiEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_embedder, build_from_config};
