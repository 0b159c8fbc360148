//! HuggingFace Inference API transport.
//!
//! Text-generation endpoints take a single flattened prompt rather than a
//! message list. Two flavours are supported: a keyed hosted provider that
//! sits in the normal priority list, and the keyless public endpoint used as
//! the emergency fallback.

use async_trait::async_trait;
use aria_core::error::ProviderError;
use aria_core::message::{Message, Role};
use aria_core::provider::ChatRequest;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the prompt is built and which endpoint shape is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfMode {
    /// `{base_url}/models/{model}`, key required, `role: content` lines.
    Hosted,
    /// `{base_url}/{model}`, key optional, `[INST]` instruction format.
    Emergency,
}

pub struct HuggingFaceProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    mode: HfMode,
    client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        mode: HfMode,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            mode,
            client,
        }
    }

    /// The last-resort public endpoint.
    pub fn emergency(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self::new("emergency-huggingface", base_url, api_key, HfMode::Emergency, timeout)
    }

    fn endpoint(&self, model: &str) -> String {
        match self.mode {
            HfMode::Hosted => format!("{}/models/{}", self.base_url, model),
            HfMode::Emergency => format!("{}/{}", self.base_url, model),
        }
    }

    fn max_new_tokens(&self) -> u32 {
        match self.mode {
            HfMode::Hosted => 2048,
            HfMode::Emergency => 1024,
        }
    }

    fn build_prompt(&self, messages: &[Message]) -> String {
        match self.mode {
            HfMode::Hosted => role_prompt(messages),
            HfMode::Emergency => instruct_prompt(messages),
        }
    }

    async fn send_once(&self, url: &str, body: &serde_json::Value) -> Result<String, ProviderError> {
        let mut builder = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(format!("{} request timed out: {e}", self.name))
            } else {
                ProviderError::Network(format!("{} error: {e}", self.name))
            }
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "HuggingFace returned error");
            let message = format!("{} error: {} - {}", self.name, status, error_body);
            return Err(match status {
                429 => ProviderError::RateLimited(message),
                401 | 403 => ProviderError::AuthenticationFailed(message),
                _ => ProviderError::ApiError {
                    status_code: status,
                    message,
                },
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {e}", self.name)))?;

        generated_text(&value).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("{}: no generated_text in response", self.name))
        })
    }
}

#[async_trait]
impl aria_core::Provider for HuggingFaceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ProviderError> {
        if self.mode == HfMode::Hosted && self.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "{} API key not configured",
                self.name
            )));
        }

        let url = self.endpoint(&request.model);
        let body = json!({
            "inputs": self.build_prompt(&request.messages),
            "parameters": {
                "max_new_tokens": self.max_new_tokens(),
                "temperature": request.temperature,
                "return_full_text": false,
            }
        });

        debug!(provider = %self.name, model = %request.model, "Sending text-generation request");

        retry_if_loading(&self.name, LOADING_RETRY_DELAY, || self.send_once(&url, &body)).await
    }
}

/// Pause before the single retry of a model that is still loading.
const LOADING_RETRY_DELAY: Duration = Duration::from_secs(5);

fn is_model_loading(error: &ProviderError) -> bool {
    error.to_string().to_lowercase().contains("loading")
}

/// Run `send`, and run it once more after `delay` if the model was still loading.
async fn retry_if_loading<F, Fut>(
    provider: &str,
    delay: Duration,
    mut send: F,
) -> Result<String, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ProviderError>>,
{
    match send().await {
        Err(e) if is_model_loading(&e) => {
            info!(
                provider = %provider,
                delay_secs = delay.as_secs(),
                "Model is loading, retrying once"
            );
            tokio::time::sleep(delay).await;
            send().await
        }
        other => other,
    }
}

/// `role: content` per line, every role included.
fn role_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Instruction-model format: system and user turns wrapped in
/// `[INST] … [/INST]`, assistant turns verbatim, tool turns dropped.
fn instruct_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for m in messages {
        match m.role {
            Role::System | Role::User => {
                prompt.push_str(&format!("[INST] {} [/INST]\n", m.content));
            }
            Role::Assistant => {
                prompt.push_str(&m.content);
                prompt.push('\n');
            }
            Role::Tool => {}
        }
    }
    prompt
}

/// Accepts `[{generated_text}]` or `{generated_text}`.
fn generated_text(value: &serde_json::Value) -> Option<String> {
    let object = match value {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    object
        .get("generated_text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}
