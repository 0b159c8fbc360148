//! Bounded log of provider attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Once the log grows past this many records it is trimmed.
const MAX_RECORDS: usize = 1000;
/// Records kept after a trim (the newest ones).
const TRIM_TO: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate view over the retained records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total: usize,
    pub successful: usize,
    pub by_provider: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct UsageLog {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider: &str, success: bool, error: Option<&str>) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(UsageRecord {
            provider: provider.to_string(),
            timestamp: Utc::now(),
            success,
            error: error.map(str::to_string),
        });

        if records.len() > MAX_RECORDS {
            let excess = records.len() - TRIM_TO;
            records.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> UsageStats {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = UsageStats {
            total: records.len(),
            ..UsageStats::default()
        };
        for record in records.iter() {
            if record.success {
                stats.successful += 1;
            }
            *stats.by_provider.entry(record.provider.clone()).or_default() += 1;
        }
        stats
    }
}
