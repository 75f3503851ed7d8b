//! Assemble the agent and its backends from configuration.

use std::sync::Arc;

use tether_agent::Agent;
use tether_config::AppConfig;
use tether_core::knowledge::KnowledgeBase;
use tether_core::memory::Memory;
use tracing::info;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load and validate `~/.tether/config.toml` with environment overrides.
pub fn load_config() -> CliResult<AppConfig> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub async fn memory(config: &AppConfig) -> CliResult<Arc<dyn Memory>> {
    Ok(tether_memory::build_memory(&config.memory.backend, config.memory.url.as_deref()).await?)
}

/// The knowledge base named by `config.knowledge`.
pub async fn knowledge(config: &AppConfig) -> CliResult<KnowledgeBase> {
    let embedder = tether_providers::build_embedder(config)?;
    let path = config.knowledge_path();
    let store = tether_knowledge::build_vector_store(&config.knowledge.backend, Some(&path)).await?;
    Ok(KnowledgeBase::new(embedder, store))
}

/// Build the agent: provider, built-in tools, memory bound to `session`,
/// and the knowledge base when enabled.
pub async fn build_agent(config: &AppConfig, session: &str) -> CliResult<Agent> {
    let provider = tether_providers::build_from_config(config)?;
    let tools = tether_tools::default_registry()?;

    let mut agent = Agent::new(provider)
        .with_name(&config.agent.name)
        .with_instructions(&config.agent.instructions)
        .with_max_steps(config.agent.max_steps)
        .with_tools(tools)
        .with_memory(memory(config).await?, session);

    if config.knowledge.enabled {
        agent = agent
            .with_knowledge(knowledge(config).await?)
            .with_retrieval_k(config.knowledge.top_k);
    }

    info!(
        agent = %config.agent.name,
        provider = %config.provider.name,
        model = %config.provider.model,
        memory = %config.memory.backend,
        knowledge = config.knowledge.enabled,
        session,
        "Agent ready"
    );
    Ok(agent)
}
