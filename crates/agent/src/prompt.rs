//! System prompt construction.
//!
//! The prompt is model-agnostic: an identity line, the tool catalogue, the
//! JSON response contract and, when recall found anything, a block of past
//! memories.

use aria_core::tool::{ToolDefinition, names};

const IDENTITY: &str = "You are ARIA, an autonomous AI agent. You complete tasks by \
reasoning step by step and calling tools. Be concise and precise.";

const RESPONSE_CONTRACT: &str = r#"RESPONSE FORMAT (STRICT):
Every reply MUST be a single ```json block with this shape:
```json
{
  "thought": "why this step moves the task forward",
  "action": {
    "tool": "<tool name>",
    "params": { "<param>": "<value>" }
  }
}
```
Call exactly one tool per reply. When the task is complete, call "final_answer"
with {"answer": "<text for the user>"}."#;

/// Corrective message injected after a reply with no parsable action.
pub const JSON_RETRY_CORRECTION: &str = "ERROR: Your response was not valid JSON. You MUST respond with valid JSON format as specified. Use ```json ... ``` blocks.";

/// Build the system prompt for a run.
pub fn build_system_prompt(tools: &[ToolDefinition], memories: &[String]) -> String {
    let mut prompt = String::from(IDENTITY);

    prompt.push_str("\n\nAVAILABLE TOOLS:\n");
    for tool in tools {
        prompt.push_str(&format!("- {}: {}", tool.name, tool.description));
        let params = param_names(&tool.parameters);
        if !params.is_empty() {
            prompt.push_str(&format!(" (params: {})", params.join(", ")));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "- {}: Suggest free alternatives when a paid service is unavailable (params: service)\n",
        names::SEARCH_FREE_ALTERNATIVES
    ));
    prompt.push_str(&format!(
        "- {}: Finish the task and reply to the user (params: answer)\n",
        names::FINAL_ANSWER
    ));

    prompt.push('\n');
    prompt.push_str(RESPONSE_CONTRACT);

    if !memories.is_empty() {
        prompt.push_str(&memory_block(memories));
    }
    prompt
}

/// The recalled-memories block appended to the prompt.
pub fn memory_block(memories: &[String]) -> String {
    let lines: Vec<String> = memories.iter().map(|m| format!("- {m}")).collect();
    format!(
        "\n\n=== RELEVANT PAST MEMORIES ===\n{}\n==============================\n",
        lines.join("\n")
    )
}

/// Parameter names from a JSON schema, required ones first.
fn param_names(schema: &serde_json::Value) -> Vec<String> {
    let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut names: Vec<String> = required
        .iter()
        .filter(|r| props.contains_key(**r))
        .map(|r| r.to_string())
        .collect();
    for key in props.keys() {
        if !required.contains(&key.as_str()) {
            names.push(format!("{key}?"));
        }
    }
    names
}
