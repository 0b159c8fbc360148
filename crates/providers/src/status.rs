//! Provider status table.
//!
//! The only state the failover engine keeps between requests. Each engine
//! owns its own table, so independent engines never observe each other.
//! The lock is never held across an await.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Availability of a provider as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Blocked,
    RateLimited,
    Unknown,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::RateLimited => "rate_limited",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "rate_limited" => Ok(Self::RateLimited),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown provider status '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ProviderState {
    pub status: ProviderStatus,
    pub last_error: Option<String>,
    pub last_used: Option<Instant>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            status: ProviderStatus::Unknown,
            last_error: None,
            last_used: None,
        }
    }
}

/// Mutex-guarded status rows keyed by provider name.
#[derive(Debug, Default)]
pub(crate) struct StatusTable {
    rows: Mutex<HashMap<String, ProviderState>>,
}

impl StatusTable {
    fn with_rows<R>(&self, f: impl FnOnce(&mut HashMap<String, ProviderState>) -> R) -> R {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rows)
    }

    pub fn insert(&self, name: &str) {
        self.with_rows(|rows| {
            rows.entry(name.to_string()).or_default();
        });
    }

    pub fn get(&self, name: &str) -> ProviderState {
        self.with_rows(|rows| rows.get(name).cloned().unwrap_or_default())
    }

    pub fn status(&self, name: &str) -> ProviderStatus {
        self.get(name).status
    }

    pub fn set_status(&self, name: &str, status: ProviderStatus) {
        self.with_rows(|rows| rows.entry(name.to_string()).or_default().status = status);
    }

    pub fn mark_success(&self, name: &str) {
        self.with_rows(|rows| {
            let row = rows.entry(name.to_string()).or_default();
            row.status = ProviderStatus::Active;
            row.last_used = Some(Instant::now());
        });
    }

    /// Record a failure; `status` of `None` leaves the status untouched.
    pub fn mark_failure(&self, name: &str, status: Option<ProviderStatus>, error: &str) {
        self.with_rows(|rows| {
            let row = rows.entry(name.to_string()).or_default();
            if let Some(status) = status {
                row.status = status;
            }
            row.last_error = Some(error.to_string());
        });
    }

    /// Return a rate-limited provider to service. A provider that was
    /// blocked or reactivated in the meantime is left alone.
    pub fn reactivate_if_rate_limited(&self, name: &str) -> bool {
        self.with_rows(|rows| match rows.get_mut(name) {
            Some(row) if row.status == ProviderStatus::RateLimited => {
                row.status = ProviderStatus::Active;
                true
            }
            _ => false,
        })
    }

    /// Reset blocked providers whose last use is older than `min_age` (or
    /// that never succeeded) to `Unknown`. Returns the names reset.
    pub fn rehabilitate_blocked(&self, min_age: Duration) -> Vec<String> {
        let now = Instant::now();
        self.with_rows(|rows| {
            let mut reset = Vec::new();
            for (name, row) in rows.iter_mut() {
                if row.status != ProviderStatus::Blocked {
                    continue;
                }
                let stale = row
                    .last_used
                    .is_none_or(|used| now.saturating_duration_since(used) >= min_age);
                if stale {
                    row.status = ProviderStatus::Unknown;
                    reset.push(name.clone());
                }
            }
            reset.sort();
            reset
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rows_start_unknown() {
        let table = StatusTable::default();
        table.insert("groq");
        assert_eq!(table.status("groq"), ProviderStatus::Unknown);
        assert!(table.get("groq").last_used.is_none());
    }

    #[test]
    fn failure_without_status_keeps_status() {
        let table = StatusTable::default();
        table.insert("groq");
        table.mark_success("groq");
        table.mark_failure("groq", None, "connection reset");
        let row = table.get("groq");
        assert_eq!(row.status, ProviderStatus::Active);
        assert_eq!(row.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn reactivation_only_applies_to_rate_limited() {
        let table = StatusTable::default();
        table.mark_failure("a", Some(ProviderStatus::RateLimited), "429");
        table.mark_failure("b", Some(ProviderStatus::Blocked), "402");

        assert!(table.reactivate_if_rate_limited("a"));
        assert!(!table.reactivate_if_rate_limited("b"));
        assert_eq!(table.status("a"), ProviderStatus::Active);
        assert_eq!(table.status("b"), ProviderStatus::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn rehabilitation_waits_for_recovery_window() {
        let table = StatusTable::default();
        table.mark_success("recent");
        table.mark_failure("recent", Some(ProviderStatus::Blocked), "402");
        table.mark_failure("never-used", Some(ProviderStatus::Blocked), "403");

        let reset = table.rehabilitate_blocked(Duration::from_secs(3600));
        assert_eq!(reset, vec!["never-used".to_string()]);
        assert_eq!(table.status("recent"), ProviderStatus::Blocked);

        tokio::time::advance(Duration::from_secs(3601)).await;
        let reset = table.rehabilitate_blocked(Duration::from_secs(3600));
        assert_eq!(reset, vec!["recent".to_string()]);
        assert_eq!(table.status("recent"), ProviderStatus::Unknown);
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("Active".parse::<ProviderStatus>(), Ok(ProviderStatus::Active));
        assert_eq!("rate_limited".parse::<ProviderStatus>(), Ok(ProviderStatus::RateLimited));
        assert!("paused".parse::<ProviderStatus>().is_err());
    }
}
