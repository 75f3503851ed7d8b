//! Provider selection: builds the configured provider and embedder.

use std::sync::Arc;
use tether_config::AppConfig;
use tether_core::error::ProviderError;
use tether_core::knowledge::Embedder;
use tether_core::provider::Provider;
use tracing::info;

use crate::embedder::OpenAiEmbedder;
use crate::openai_compat::OpenAiCompatProvider;

/// Get the default base URL for the built-in presets.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

fn resolve_endpoint(config: &AppConfig) -> Result<(String, String), ProviderError> {
    let name = config.provider.name.as_str();
    let base_url = config
        .provider
        .base_url
        .clone()
        .or_else(|| default_base_url(name).map(String::from))
        .ok_or_else(|| ProviderError::NotConfigured(format!("provider '{name}' has no base_url")))?;

    let api_key = match (name, &config.api_key) {
        (_, Some(key)) => key.clone(),
        ("ollama" | "custom", None) => String::new(),
        (_, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' needs an API key (set TETHER_API_KEY or api_key in config.toml)"
            )));
        }
    };
    Ok((base_url, api_key))
}

/// Build the chat provider described by `config.provider`.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let (base_url, api_key) = resolve_endpoint(config)?;
    info!(provider = %config.provider.name, model = %config.provider.model, "Building provider");
    let provider = OpenAiCompatProvider::new(&config.provider.name, base_url, api_key)
        .with_model(&config.provider.model)
        .with_temperature(config.provider.temperature);
    Ok(Arc::new(provider))
}

/// Build the embedder for knowledge retrieval, sharing the provider endpoint.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, ProviderError> {
    let (base_url, api_key) = resolve_endpoint(config)?;
    Ok(Arc::new(OpenAiEmbedder::new(
        base_url,
        api_key,
        &config.knowledge.embedding_model,
    )))
}
