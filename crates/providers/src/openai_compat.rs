//! OpenAI-compatible provider implementation.
//!
//! Works with: Groq, Together AI, OpenRouter, Ollama, vLLM, and any endpoint
//! that exposes `/chat/completions` with bearer auth.

use async_trait::async_trait;
use aria_core::error::ProviderError;
use aria_core::message::{Message, Role};
use aria_core::provider::ChatRequest;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible chat-completion transport.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    requires_key: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider that requires `api_key`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
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
            requires_key: true,
            client,
        }
    }

    /// Create an Ollama provider; no key needed.
    pub fn ollama(name: impl Into<String>, base_url: Option<&str>, timeout: Duration) -> Self {
        let mut provider = Self::new(
            name,
            base_url.unwrap_or("http://localhost:11434/v1"),
            None,
            timeout,
        );
        provider.requires_key = false;
        provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our messages to the chat-completions wire shape.
    ///
    /// Tool results have no matching `tool_call_id`, so they are sent as user
    /// turns labelled with the tool that produced them.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Tool => ApiMessage {
                    role: "user".into(),
                    content: format!(
                        "[{} result]\n{}",
                        m.tool_name.as_deref().unwrap_or("tool"),
                        m.content
                    ),
                },
                role => ApiMessage {
                    role: role.as_str().into(),
                    content: m.content.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl aria_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ProviderError> {
        if self.requires_key && self.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "{} API key not configured",
                self.name
            )));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = ApiRequest {
            model: &request.model,
            messages: Self::to_api_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let mut builder = self.client.post(&url).json(&body);
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
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
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

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {e}", self.name)))?;

        parse_completion(api_response, &self.name)
    }
}

fn parse_completion(response: ApiResponse, provider: &str) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| ProviderError::InvalidResponse(format!("{provider}: no choices in response")))
}

// --- OpenAI API wire types ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::Provider;

    #[test]
    fn trailing_slash_trimmed() {
        let p = OpenAiCompatProvider::new(
            "Groq",
            "https://api.groq.com/openai/v1/",
            Some("k".into()),
            Duration::from_secs(5),
        );
        assert_eq!(p.base_url(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn tool_messages_become_labelled_user_turns() {
        let messages = vec![
            Message::system("You are Aria."),
            Message::user("list files"),
            Message::tool("list_files", "a.txt\nb.txt"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "user");
        assert!(api[2].content.starts_with("[list_files result]"));
    }

    #[test]
    fn parses_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_completion(parsed, "Groq").unwrap(), "hello");
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = parse_completion(parsed, "Groq").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let p = OpenAiCompatProvider::new("Groq", "http://127.0.0.1:9", None, Duration::from_secs(1));
        let err = p
            .complete(ChatRequest::new("llama", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        match err {
            ProviderError::NotConfigured(msg) => assert_eq!(msg, "Groq API key not configured"),
            other => panic!("Expected NotConfigured, got: {other:?}"),
        }
    }
}
