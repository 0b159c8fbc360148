//! Builds the failover engine from configuration.
//!
//! Maps each enabled `[[providers]]` entry to its transport and registers it
//! with the engine, then attaches the emergency endpoint.

use aria_config::{AppConfig, ProviderEntry, ProviderKind};
use aria_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::failover::{FailoverEngine, FailoverOptions, ProviderConfig};
use crate::huggingface::{HfMode, HuggingFaceProvider};
use crate::openai_compat::OpenAiCompatProvider;

/// Build a failover engine from configuration.
pub fn build_from_config(config: &AppConfig) -> FailoverEngine {
    let options = FailoverOptions {
        rate_limit_cooldown: Duration::from_secs(config.failover.rate_limit_cooldown_secs),
        blocked_recovery: Duration::from_secs(config.failover.blocked_recovery_secs),
        temperature: config.default_temperature,
        max_tokens: config.default_max_tokens,
    };

    let mut engine = FailoverEngine::new(options);

    for entry in config.enabled_providers() {
        let (provider_config, transport) = build_provider(entry);
        debug!(
            provider = %provider_config.name,
            kind = %provider_config.kind,
            priority = provider_config.priority,
            "Registering provider"
        );
        engine.register(provider_config, transport);
    }

    if config.emergency.enabled {
        let timeout = Duration::from_secs(config.emergency.timeout_secs);
        let emergency = HuggingFaceProvider::emergency(
            &config.emergency.base_url,
            config.emergency.resolved_api_key(),
            timeout,
        );
        engine = engine.with_emergency(Arc::new(emergency), &config.emergency.model, timeout);
    }

    engine
}

/// Create the transport for one configured provider.
pub fn build_provider(entry: &ProviderEntry) -> (ProviderConfig, Arc<dyn Provider>) {
    let base_url = entry
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(entry.kind).to_string());
    let timeout = Duration::from_secs(entry.timeout_secs);
    let api_key = entry.resolved_api_key();

    let transport: Arc<dyn Provider> = match entry.kind {
        ProviderKind::Huggingface => Arc::new(HuggingFaceProvider::new(
            &entry.name,
            &base_url,
            api_key,
            HfMode::Hosted,
            timeout,
        )),
        ProviderKind::Ollama => Arc::new(OpenAiCompatProvider::ollama(
            &entry.name,
            Some(&base_url),
            timeout,
        )),
        _ => Arc::new(OpenAiCompatProvider::new(&entry.name, &base_url, api_key, timeout)),
    };

    let config = ProviderConfig {
        name: entry.name.clone(),
        kind: entry.kind,
        base_url,
        models: entry.models.clone(),
        free_models: entry.free_models.clone(),
        priority: entry.priority,
        timeout,
    };

    (config, transport)
}

/// Get the default base URL for a provider kind.
pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Ollama => "http://localhost:11434/v1",
        ProviderKind::Groq => "https://api.groq.com/openai/v1",
        ProviderKind::Together => "https://api.together.xyz/v1",
        ProviderKind::Huggingface => "https://api-inference.huggingface.co",
        ProviderKind::Openrouter => "https://openrouter.ai/api/v1",
        ProviderKind::OpenaiCompat => "http://localhost:8000/v1",
    }
}
