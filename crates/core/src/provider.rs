//! Provider trait: the abstraction over chat-completion transports.
//!
//! A Provider knows how to send a conversation to one upstream model service
//! and get the reply text back. Ordering, demotion and fallback between
//! providers is the failover engine's concern, not the transport's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// A single chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (already resolved by the caller)
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A successful completion, as returned by the failover engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,

    /// Display name of the provider that answered
    pub provider: String,

    pub model: String,

    pub latency_ms: u64,
}

/// The core Provider trait.
///
/// Every transport (OpenAI-compatible, HuggingFace Inference) implements
/// this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name (e.g., "Groq (Free Tier)").
    fn name(&self) -> &str;

    /// Send a request and return the reply text.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ProviderError>;
}
