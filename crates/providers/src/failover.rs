//! Provider failover engine: prioritized dispatch, status-based demotion
//! and an emergency last resort.
//!
//! Each request walks the non-blocked providers in priority order (a
//! preferred provider, if it matches, goes first). The first success wins.
//! Failures are classified: rate limits put the provider on a cooldown,
//! quota, payment and credential failures block it, anything else only
//! records the error. When every candidate fails, the emergency provider is
//! tried once before the request is reported as exhausted.

use aria_config::ProviderKind;
use aria_core::error::ProviderError;
use aria_core::message::Message;
use aria_core::provider::{ChatRequest, Provider, ProviderResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::alternatives::free_alternatives;
use crate::classify::{ErrorClass, classify};
use crate::status::{ProviderStatus, StatusTable};
use crate::usage::{UsageLog, UsageStats};

/// Static description of a provider in the rotation.
///
/// Credentials live with the transport; this is what the engine orders and
/// reports on.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub models: Vec<String>,
    pub free_models: Vec<String>,
    /// Lower is preferred
    pub priority: u32,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind, priority: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: String::new(),
            models: Vec::new(),
            free_models: Vec::new(),
            priority,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Explicit request, else the first free model, else the first model.
    pub fn select_model(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .or_else(|| self.free_models.first().cloned())
            .or_else(|| self.models.first().cloned())
            .unwrap_or_else(|| "default".to_string())
    }
}

/// Engine-wide tuning.
#[derive(Debug, Clone)]
pub struct FailoverOptions {
    pub rate_limit_cooldown: Duration,
    pub blocked_recovery: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(60),
            blocked_recovery: Duration::from_secs(3600),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Case-insensitive substring of a provider's display name
    pub preferred_provider: Option<String>,
    pub model: Option<String>,
}

impl ChatOptions {
    pub fn preferring(provider: impl Into<String>) -> Self {
        Self {
            preferred_provider: Some(provider.into()),
            model: None,
        }
    }
}

/// One row of [`FailoverEngine::provider_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatusReport {
    pub name: String,
    pub kind: ProviderKind,
    pub status: ProviderStatus,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct RegisteredProvider {
    config: ProviderConfig,
    transport: Arc<dyn Provider>,
}

struct EmergencyProvider {
    transport: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
}

pub struct FailoverEngine {
    providers: Vec<RegisteredProvider>,
    status: Arc<StatusTable>,
    usage: UsageLog,
    emergency: Option<EmergencyProvider>,
    options: FailoverOptions,
    reset_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl FailoverEngine {
    pub fn new(options: FailoverOptions) -> Self {
        Self {
            providers: Vec::new(),
            status: Arc::new(StatusTable::default()),
            usage: UsageLog::new(),
            emergency: None,
            options,
            reset_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Add a provider to the rotation.
    pub fn register(&mut self, config: ProviderConfig, transport: Arc<dyn Provider>) {
        self.status.insert(&config.name);
        self.providers.push(RegisteredProvider { config, transport });
        self.providers.sort_by_key(|p| p.config.priority);
    }

    pub fn with_provider(mut self, config: ProviderConfig, transport: Arc<dyn Provider>) -> Self {
        self.register(config, transport);
        self
    }

    /// Set the last-resort provider tried after the whole rotation fails.
    pub fn with_emergency(
        mut self,
        transport: Arc<dyn Provider>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.emergency = Some(EmergencyProvider {
            transport,
            model: model.into(),
            timeout,
        });
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn has_emergency(&self) -> bool {
        self.emergency.is_some()
    }

    /// Send `messages` to the best available provider.
    ///
    /// Only returns `Err` when every provider and the emergency fallback
    /// failed; the error then carries the last ordinary provider's message.
    pub async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut candidates = self.active_providers();

        if candidates.is_empty() && !self.providers.is_empty() {
            let reset = self.status.rehabilitate_blocked(self.options.blocked_recovery);
            if !reset.is_empty() {
                info!(providers = ?reset, "Rehabilitated blocked providers");
                candidates = self.active_providers();
            }
        }

        if let Some(preferred) = options
            .preferred_provider
            .as_deref()
            .map(str::to_lowercase)
            .filter(|p| !p.is_empty())
        {
            if let Some(pos) = candidates
                .iter()
                .position(|p| p.config.name.to_lowercase().contains(&preferred))
            {
                let first = candidates.remove(pos);
                candidates.insert(0, first);
            }
        }

        let mut last_error: Option<ProviderError> = None;

        for (i, provider) in candidates.iter().enumerate() {
            debug!(
                provider = %provider.config.name,
                attempt = i + 1,
                total = candidates.len(),
                "Failover: trying provider"
            );
            match self.attempt(provider, messages, options.model.as_deref()).await {
                Ok(response) => return Ok(response),
                Err(e) => last_error = Some(e),
            }
        }

        self.emergency_fallback(messages, last_error).await
    }

    fn active_providers(&self) -> Vec<&RegisteredProvider> {
        self.providers
            .iter()
            .filter(|p| self.status.status(&p.config.name) != ProviderStatus::Blocked)
            .collect()
    }

    async fn attempt(
        &self,
        provider: &RegisteredProvider,
        messages: &[Message],
        requested_model: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let name = &provider.config.name;
        let model = provider.config.select_model(requested_model);
        let request = ChatRequest {
            model: model.clone(),
            messages: messages.to_vec(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(
            provider.config.timeout,
            provider.transport.complete(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "{} timed out after {}s",
                name,
                provider.config.timeout.as_secs()
            ))),
        };

        match result {
            Ok(content) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.status.mark_success(name);
                self.usage.record(name, true, None);
                info!(provider = %name, model = %model, latency_ms, "Provider responded");
                Ok(ProviderResponse {
                    content,
                    provider: name.clone(),
                    model,
                    latency_ms,
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.usage.record(name, false, Some(&message));

                match classify(&e) {
                    ErrorClass::RateLimited => {
                        warn!(provider = %name, error = %message, "Provider rate limited");
                        self.status
                            .mark_failure(name, Some(ProviderStatus::RateLimited), &message);
                        self.schedule_rate_limit_reset(name);
                    }
                    ErrorClass::Blocked => {
                        warn!(provider = %name, error = %message, "Provider blocked");
                        self.status.mark_failure(name, Some(ProviderStatus::Blocked), &message);
                    }
                    ErrorClass::Transient => {
                        warn!(provider = %name, error = %message, "Provider failed, trying next");
                        self.status.mark_failure(name, None, &message);
                    }
                }
                Err(e)
            }
        }
    }

    async fn emergency_fallback(
        &self,
        messages: &[Message],
        last_error: Option<ProviderError>,
    ) -> Result<ProviderResponse, ProviderError> {
        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no AI providers available".to_string());

        let Some(emergency) = &self.emergency else {
            error!(error = %last_error, "All providers failed and no emergency provider is configured");
            return Err(ProviderError::Exhausted { last_error });
        };

        let name = emergency.transport.name().to_string();
        warn!(provider = %name, "All standard providers failed, using emergency fallback");

        let request = ChatRequest {
            model: emergency.model.clone(),
            messages: messages.to_vec(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(emergency.timeout, emergency.transport.complete(request))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout(format!(
                    "{} timed out after {}s",
                    name,
                    emergency.timeout.as_secs()
                )))
            });

        match result {
            Ok(content) => {
                self.usage.record(&name, true, None);
                Ok(ProviderResponse {
                    content,
                    provider: name,
                    model: emergency.model.clone(),
                    latency_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.usage.record(&name, false, Some(&message));
                error!(provider = %name, error = %message, "Emergency provider failed");
                Err(ProviderError::Exhausted { last_error })
            }
        }
    }

    /// One-shot cooldown; replaces any pending reset for the same provider.
    fn schedule_rate_limit_reset(&self, name: &str) {
        let status = Arc::clone(&self.status);
        let cooldown = self.options.rate_limit_cooldown;
        let key = name.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if status.reactivate_if_rate_limited(&key) {
                info!(provider = %key, "Rate-limit cooldown elapsed, provider reactivated");
            }
        });

        let mut tasks = self.reset_tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, h| !h.is_finished());
        if let Some(previous) = tasks.insert(name.to_string(), handle) {
            previous.abort();
        }
    }

    /// Number of cooldown timers still pending.
    pub fn pending_resets(&self) -> usize {
        let tasks = self.reset_tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().filter(|h| !h.is_finished()).count()
    }

    /// Status of every configured provider, in priority order.
    pub fn provider_status(&self) -> Vec<ProviderStatusReport> {
        self.providers
            .iter()
            .map(|p| {
                let state = self.status.get(&p.config.name);
                ProviderStatusReport {
                    name: p.config.name.clone(),
                    kind: p.config.kind,
                    status: state.status,
                    priority: p.config.priority,
                    last_error: state.last_error,
                }
            })
            .collect()
    }

    /// Manually set a provider's status. `name` is matched like a preferred
    /// provider; returns the matched display name.
    pub fn set_status(&self, name: &str, status: ProviderStatus) -> Option<String> {
        let needle = name.to_lowercase();
        let provider = self
            .providers
            .iter()
            .find(|p| p.config.name.to_lowercase().contains(&needle))?;
        self.status.set_status(&provider.config.name, status);
        info!(provider = %provider.config.name, status = %status, "Provider status set manually");
        Some(provider.config.name.clone())
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage.stats()
    }

    /// Free alternatives for a paid service. Never fails, no I/O.
    pub fn search_free_alternatives(&self, service: &str) -> Vec<String> {
        free_alternatives(service)
    }
}

impl Default for FailoverEngine {
    fn default() -> Self {
        Self::new(FailoverOptions::default())
    }
}

impl Drop for FailoverEngine {
    fn drop(&mut self) {
        let tasks = self.reset_tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}
