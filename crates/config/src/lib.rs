//! Configuration loading, validation, and management for Aria.
//!
//! Loads configuration from `~/.aria/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.aria/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Execution loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider demotion and recovery timings
    #[serde(default)]
    pub failover: FailoverConfig,

    /// Last-resort public inference endpoint
    #[serde(default)]
    pub emergency: EmergencyConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Upstream model providers, in any order (sorted by priority at use)
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderEntry>,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration budget per task; retries and provider switches count too
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Corrective prompts sent before a non-JSON reply is accepted as the answer
    #[serde(default = "default_max_json_retries")]
    pub max_json_retries: usize,

    /// Remembered notes injected into the system prompt
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Provider preferred on the first iteration of every run
    #[serde(default = "default_agent_provider")]
    pub default_provider: String,
}

fn default_max_iterations() -> usize {
    15
}
fn default_max_json_retries() -> usize {
    2
}
fn default_recall_limit() -> usize {
    3
}
fn default_agent_provider() -> String {
    "ollama".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_json_retries: default_max_json_retries(),
            recall_limit: default_recall_limit(),
            default_provider: default_agent_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// How long a rate-limited provider sits out before it is reactivated
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    /// Minimum age of a blocked provider's last use before it may be retried
    #[serde(default = "default_blocked_recovery")]
    pub blocked_recovery_secs: u64,
}

fn default_rate_limit_cooldown() -> u64 {
    60
}
fn default_blocked_recovery() -> u64 {
    3600
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            blocked_recovery_secs: default_blocked_recovery(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_emergency_url")]
    pub base_url: String,

    #[serde(default = "default_emergency_model")]
    pub model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional token; the public endpoint works without one at a lower rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_emergency_url() -> String {
    "https://api-inference.huggingface.co/models".into()
}
fn default_emergency_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.2".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl EmergencyConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(&self.api_key, &self.api_key_env)
    }
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_emergency_url(),
            model: default_emergency_model(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
            api_key_env: None,
        }
    }
}

impl std::fmt::Debug for EmergencyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

/// Transport family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    Groq,
    Together,
    Huggingface,
    Openrouter,
    OpenaiCompat,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Groq => "groq",
            Self::Together => "together",
            Self::Huggingface => "huggingface",
            Self::Openrouter => "openrouter",
            Self::OpenaiCompat => "openai_compat",
        }
    }

    /// Whether requests to this kind need an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Display name; the sticky-provider preference matches against it
    pub name: String,

    pub kind: ProviderKind,

    /// Overrides the kind's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub models: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub free_models: Vec<String>,

    /// Lower is preferred
    pub priority: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderEntry {
    /// The configured key, else the value of `api_key_env`.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(&self.api_key, &self.api_key_env)
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("models", &self.models)
            .field("free_models", &self.free_models)
            .field("priority", &self.priority)
            .field("timeout_secs", &self.timeout_secs)
            .field("enabled", &self.enabled)
            .finish()
    }
}

fn resolve_key(key: &Option<String>, env: &Option<String>) -> Option<String> {
    key.clone()
        .or_else(|| env.as_ref().and_then(|name| std::env::var(name).ok()))
        .filter(|k| !k.trim().is_empty())
}

fn provider(
    name: &str,
    kind: ProviderKind,
    api_key_env: Option<&str>,
    models: &[&str],
    free_models: &[&str],
    priority: u32,
) -> ProviderEntry {
    ProviderEntry {
        name: name.into(),
        kind,
        base_url: None,
        api_key: None,
        api_key_env: api_key_env.map(str::to_string),
        models: models.iter().map(|m| m.to_string()).collect(),
        free_models: free_models.iter().map(|m| m.to_string()).collect(),
        priority,
        timeout_secs: default_timeout_secs(),
        enabled: true,
    }
}

/// The stock provider list: free tiers of hosted services, local Ollama off.
fn default_providers() -> Vec<ProviderEntry> {
    let mut ollama = provider(
        "Ollama (Local)",
        ProviderKind::Ollama,
        None,
        &["llama3.2:3b", "llama3.2:1b", "codellama:7b", "mistral:7b"],
        &[],
        1,
    );
    ollama.enabled = false;

    vec![
        ollama,
        provider(
            "Groq (Free Tier)",
            ProviderKind::Groq,
            Some("GROQ_API_KEY"),
            &["llama-3.1-70b-versatile", "llama-3.1-8b-instant", "mixtral-8x7b-32768"],
            &["llama-3.1-8b-instant", "mixtral-8x7b-32768"],
            2,
        ),
        provider(
            "Together.ai (Free Tier)",
            ProviderKind::Together,
            Some("TOGETHER_API_KEY"),
            &["meta-llama/Llama-3-8b-chat-hf", "mistralai/Mixtral-8x7B-Instruct-v0.1"],
            &["meta-llama/Llama-3-8b-chat-hf"],
            3,
        ),
        provider(
            "HuggingFace Inference",
            ProviderKind::Huggingface,
            Some("HF_API_KEY"),
            &["meta-llama/Llama-3.2-3B-Instruct", "mistralai/Mistral-7B-Instruct-v0.3"],
            &[],
            4,
        ),
        provider(
            "OpenRouter (Free Models)",
            ProviderKind::Openrouter,
            Some("OPENROUTER_API_KEY"),
            &["meta-llama/llama-3.1-8b-instruct:free", "google/gemma-2-9b-it:free"],
            &["meta-llama/llama-3.1-8b-instruct:free", "google/gemma-2-9b-it:free"],
            5,
        ),
    ]
}

/// Storage backend for conversation, notes and execution logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    File,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackendKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Conversation messages kept; older ones are dropped first
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_memory_backend() -> MemoryBackendKind {
    MemoryBackendKind::File
}
fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_max_messages() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            data_dir: default_data_dir(),
            max_messages: default_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Permitted command names for `run_terminal_command`. Empty = allow all.
    #[serde(default)]
    pub shell_allowlist: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

fn default_shell_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_allowlist: vec![],
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.aria/config.toml).
    ///
    /// Environment overrides:
    /// - `ARIA_DEFAULT_PROVIDER`
    /// - `ARIA_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("ARIA_DEFAULT_PROVIDER") {
            self.agent.default_provider = provider;
        }

        if let Some(raw) = lookup("ARIA_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "ARIA_MAX_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".aria")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.name.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider name '{}'",
                    p.name
                )));
            }
        }

        Ok(())
    }

    /// Enabled providers sorted by ascending priority.
    pub fn enabled_providers(&self) -> Vec<&ProviderEntry> {
        let mut providers: Vec<_> = self.providers.iter().filter(|p| p.enabled).collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            failover: FailoverConfig::default(),
            emergency: EmergencyConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            providers: default_providers(),
        }
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
