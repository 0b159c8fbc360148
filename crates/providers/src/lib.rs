//! Model providers and the failover engine for Aria.
//!
//! Transports implement the `aria_core::Provider` trait. The failover engine
//! orders them by priority, demotes them on classified failures and falls
//! back to an emergency endpoint when the whole rotation fails.

pub mod alternatives;
pub mod classify;
pub mod failover;
pub mod huggingface;
pub mod openai_compat;
pub mod router;
pub mod status;
pub mod usage;

pub use alternatives::free_alternatives;
pub use classify::{ErrorClass, classify, is_cost_related};
pub use failover::{ChatOptions, FailoverEngine, FailoverOptions, ProviderConfig, ProviderStatusReport};
pub use huggingface::{HfMode, HuggingFaceProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
pub use status::ProviderStatus;
pub use usage::{UsageRecord, UsageStats};
