//! Configuration loading, validation, and management for Tether.
//!
//! Loads configuration from `~/.tether/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Provider presets understood by `tether-providers`.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "custom"];

/// Memory backend identifiers understood by `tether-memory`.
pub const KNOWN_MEMORY_BACKENDS: &[&str] = &["inmemory", "file", "sqlite", "postgres"];

/// Vector store identifiers understood by `tether-knowledge`.
pub const KNOWN_KNOWLEDGE_BACKENDS: &[&str] = &["inmemory", "sqlite", "postgres"];

/// The root configuration structure.
///
/// Maps directly to `~/.tether/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the provider (and embedder)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("knowledge", &self.knowledge)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// One of [`KNOWN_PROVIDERS`]
    #[serde(default = "default_provider")]
    pub name: String,

    /// Overrides the preset's endpoint. Required for `custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// System instructions prepended to every model call
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Upper bound on model consultations per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Session used when the CLI is given none
    #[serde(default = "default_session")]
    pub session_id: String,
}

fn default_agent_name() -> String {
    "Agent".into()
}
fn default_instructions() -> String {
    "You are a helpful assistant.".into()
}
fn default_max_steps() -> usize {
    10
}
fn default_session() -> String {
    "default".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            instructions: default_instructions(),
            max_steps: default_max_steps(),
            session_id: default_session(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// One of [`KNOWN_MEMORY_BACKENDS`]
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Directory (`file`), database path (`sqlite`) or connection URL (`postgres`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            url: None,
        }
    }
}

// A postgres URL may carry a password.
impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = match (&self.url, self.backend.as_str()) {
            (Some(_), "postgres") => "[REDACTED]".to_string(),
            (Some(u), _) => u.clone(),
            (None, _) => "None".to_string(),
        };
        f.debug_struct("MemoryConfig")
            .field("backend", &self.backend)
            .field("url", &url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Attach retrieval to the agent
    #[serde(default)]
    pub enabled: bool,

    /// One of [`KNOWN_KNOWLEDGE_BACKENDS`]
    #[serde(default = "default_knowledge_backend")]
    pub backend: String,

    /// Database path for the `sqlite` store (defaults to `~/.tether/knowledge.db`),
    /// or the connection URL for `postgres`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Documents retrieved per run
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_knowledge_backend() -> String {
    "sqlite".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_top_k() -> usize {
    3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: default_knowledge_backend(),
            path: None,
            embedding_model: default_embedding_model(),
            top_k: default_top_k(),
        }
    }
}

impl std::fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = match (&self.path, self.backend.as_str()) {
            (Some(_), "postgres") => "[REDACTED]".to_string(),
            (Some(p), _) => p.clone(),
            (None, _) => "None".to_string(),
        };
        f.debug_struct("KnowledgeConfig")
            .field("enabled", &self.enabled)
            .field("backend", &self.backend)
            .field("path", &path)
            .field("embedding_model", &self.embedding_model)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tether/config.toml).
    ///
    /// Environment variables override the file:
    /// - `TETHER_API_KEY`, then `OPENAI_API_KEY` (only when the file sets no key)
    /// - `TETHER_MODEL`, `TETHER_BASE_URL`
    /// - `TETHER_MEMORY_BACKEND`, `TETHER_MEMORY_URL`
    /// - `TETHER_SESSION`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = env("TETHER_API_KEY").or_else(|| env("OPENAI_API_KEY"));
        }
        if let Some(model) = env("TETHER_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = env("TETHER_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(backend) = env("TETHER_MEMORY_BACKEND") {
            self.memory.backend = backend;
        }
        if let Some(url) = env("TETHER_MEMORY_URL") {
            self.memory.url = Some(url);
        }
        if let Some(session) = env("TETHER_SESSION") {
            self.agent.session_id = session;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tether")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !KNOWN_PROVIDERS.contains(&self.provider.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected one of {})",
                self.provider.name,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.provider.name == "custom" && self.provider.base_url.is_none() {
            return Err(ConfigError::ValidationError(
                "provider 'custom' requires base_url".into(),
            ));
        }

        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "max_steps must be at least 1".into(),
            ));
        }

        if !KNOWN_MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}' (expected one of {})",
                self.memory.backend,
                KNOWN_MEMORY_BACKENDS.join(", ")
            )));
        }

        if !KNOWN_KNOWLEDGE_BACKENDS.contains(&self.knowledge.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown knowledge backend '{}' (expected one of {})",
                self.knowledge.backend,
                KNOWN_KNOWLEDGE_BACKENDS.join(", ")
            )));
        }

        if self.knowledge.backend == "postgres" && self.knowledge.path.is_none() {
            return Err(ConfigError::ValidationError(
                "knowledge backend 'postgres' requires knowledge.path (a connection URL)".into(),
            ));
        }

        if self.knowledge.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.top_k must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Where the sqlite vector store lives when `knowledge.path` is unset.
    pub fn knowledge_path(&self) -> String {
        self.knowledge.path.clone().unwrap_or_else(|| {
            Self::config_dir()
                .join("knowledge.db")
                .to_string_lossy()
                .into_owned()
        })
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for tether_core::Error {
    fn from(e: ConfigError) -> Self {
        tether_core::Error::config(e.to_string())
    }
}
