//! Actions, steps and execution logs.
//!
//! An [`Action`] is what the model asked for on one iteration. A [`Step`] is
//! an action that was actually executed together with its observation, and an
//! [`ExecutionLog`] is the record of a whole task run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured intent extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Tool to invoke (or `final_answer`)
    pub tool: String,

    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    /// The model's stated rationale; may be empty
    #[serde(default)]
    pub reasoning: String,
}

impl Action {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: serde_json::Map::new(),
            reasoning: String::new(),
        }
    }

    /// Builder-style parameter insertion.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// String parameter lookup; non-string values yield `None`.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// One completed tool invocation within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    pub observation: String,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn new(action: Action, observation: impl Into<String>) -> Self {
        Self {
            action,
            observation: observation.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The record of a single task run, handed to the memory sink once.
///
/// `success` is true only when the run ended with a final or plain-text
/// answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: String,
    pub task: String,
    pub steps: Vec<Step>,
    pub result: String,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider that answered the last successful completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ExecutionLog {
    /// Start an empty log for `task`; the loop fills in the rest.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            steps: Vec::new(),
            result: String::new(),
            success: false,
            duration_ms: 0,
            timestamp: Utc::now(),
            error: None,
            provider: None,
        }
    }
}
