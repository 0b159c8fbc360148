//! Keyword-overlap recall over remembered notes.

use aria_core::action::ExecutionLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A long-term note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Words shorter than this carry too little signal to match on.
const MIN_TERM_LEN: usize = 3;

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TERM_LEN)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Up to `limit` notes sharing at least one term with `query`.
///
/// Ranked by the number of shared terms, newer notes first on ties.
pub fn rank_notes(notes: &[Note], query: &str, limit: usize) -> Vec<String> {
    let wanted = terms(query);
    if wanted.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &Note)> = notes
        .iter()
        .map(|note| (terms(&note.content).intersection(&wanted).count(), note))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, note)| note.content.clone())
        .collect()
}

/// Fraction of successful runs, 0.0 for an empty slice.
pub fn success_rate(logs: &[ExecutionLog]) -> f64 {
    if logs.is_empty() {
        return 0.0;
    }
    logs.iter().filter(|l| l.success).count() as f64 / logs.len() as f64
}
