//! Provider failure classification.
//!
//! Decides how a failed completion affects a provider's status, and whether
//! an error message describes a paid-service limit that the agent should
//! route around by suggesting free alternatives.

use aria_core::error::ProviderError;

/// Messages that mean the service wants money, or a working key, before it
/// will answer again.
const COST_PATTERNS: &[&str] = &[
    "quota exceeded",
    "rate limit",
    "payment required",
    "billing",
    "insufficient funds",
    "api key invalid",
    "invalid api key",
    "429",
    "402",
];

/// Cost patterns plus authorization refusals.
const BLOCKED_PATTERNS: &[&str] = &["unauthorized", "403"];

const RATE_PATTERNS: &[&str] = &["rate limit", "rate-limit", "ratelimit", "too many requests", "429"];

/// Effect of a failure on the provider that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary throttling: sit out a cooldown, then reactivate.
    RateLimited,
    /// Quota, payment or credential failure: remove from rotation.
    Blocked,
    /// Anything else: no status change.
    Transient,
}

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// Whether `message` describes a cost or quota failure.
pub fn is_cost_related(message: &str) -> bool {
    matches_any(message, COST_PATTERNS)
}

/// Whether `message` matches the provider-blocking family.
pub fn is_blocking(message: &str) -> bool {
    is_cost_related(message) || matches_any(message, BLOCKED_PATTERNS)
}

/// Classify a transport error.
///
/// Rate limiting is checked first: a 429 is a cooldown, never a block.
pub fn classify(error: &ProviderError) -> ErrorClass {
    match error {
        ProviderError::RateLimited(_) => return ErrorClass::RateLimited,
        ProviderError::ApiError { status_code: 429, .. } => return ErrorClass::RateLimited,
        ProviderError::AuthenticationFailed(_) => return ErrorClass::Blocked,
        ProviderError::ApiError {
            status_code: 401 | 402 | 403,
            ..
        } => return ErrorClass::Blocked,
        ProviderError::NotConfigured(_) | ProviderError::Timeout(_) => {
            return ErrorClass::Transient;
        }
        _ => {}
    }

    let message = error.to_string();
    if matches_any(&message, RATE_PATTERNS) {
        ErrorClass::RateLimited
    } else if is_blocking(&message) {
        ErrorClass::Blocked
    } else {
        ErrorClass::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_beats_blocking() {
        let err = ProviderError::Network("429 rate limited".into());
        assert_eq!(classify(&err), ErrorClass::RateLimited);

        let err = ProviderError::RateLimited("Groq error: 429 - slow down".into());
        assert_eq!(classify(&err), ErrorClass::RateLimited);
    }

    #[test]
    fn payment_and_auth_block() {
        let err = ProviderError::ApiError {
            status_code: 402,
            message: "Payment Required".into(),
        };
        assert_eq!(classify(&err), ErrorClass::Blocked);

        let err = ProviderError::AuthenticationFailed("Together error: 401 - bad key".into());
        assert_eq!(classify(&err), ErrorClass::Blocked);

        let err = ProviderError::ApiError {
            status_code: 400,
            message: "Your billing account is suspended".into(),
        };
        assert_eq!(classify(&err), ErrorClass::Blocked);
    }

    #[test]
    fn missing_key_and_network_failures_are_transient() {
        let err = ProviderError::NotConfigured("Groq API key not configured".into());
        assert_eq!(classify(&err), ErrorClass::Transient);

        let err = ProviderError::Network("connection refused".into());
        assert_eq!(classify(&err), ErrorClass::Transient);

        let err = ProviderError::ApiError {
            status_code: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(classify(&err), ErrorClass::Transient);
    }

    #[test]
    fn cost_patterns_are_case_insensitive() {
        assert!(is_cost_related("OpenAI: Quota Exceeded for this month"));
        assert!(is_cost_related("HTTP 402"));
        assert!(is_cost_related("Insufficient funds on account"));
        assert!(!is_cost_related("file not found"));
    }

    #[test]
    fn blocking_is_superset_of_cost() {
        assert!(is_blocking("Payment Required"));
        assert!(is_blocking("403 Forbidden"));
        assert!(is_blocking("Unauthorized"));
        assert!(!is_cost_related("403 Forbidden"));
    }
}
