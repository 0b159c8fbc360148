//! Action parser: turns raw model text into a structured [`Action`].
//!
//! Strategies, first match wins:
//! 1. a fenced ```` ```json ```` block holding an object with an `action` key
//! 2. any JSON object substring containing `"action"`
//! 3. a bracket command token, `[CMD: NAME optional-arg]`
//!
//! `None` means "no structured action"; the loop decides what that implies.
//! A fenced block that is not valid JSON does not stop the search: the later
//! strategies still run against the whole reply.
//!
//! The bracket form only carries a single argument, so `WRITE_FILE` (which
//! needs a path and content) is deliberately unsupported and yields `None`.

use aria_core::action::Action;
use aria_core::tool::names;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").ok());

static LOOSE_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"action".*\}"#).ok());

static BRACKET_CMD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[CMD:\s*([A-Z_]+)(?:\s+(.*))?\]").ok());

/// Parse a model reply into an action.
pub fn parse_action(response: &str) -> Option<Action> {
    parse_fenced(response)
        .or_else(|| parse_loose(response))
        .or_else(|| parse_bracket(response))
}

/// Render an action in the fenced-JSON form the system prompt asks for.
///
/// `parse_action(&render_action(a)) == Some(a)` for any action.
pub fn render_action(action: &Action) -> String {
    let body = serde_json::json!({
        "thought": action.reasoning,
        "action": {
            "tool": action.tool,
            "params": action.params,
        }
    });
    let pretty = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    format!("```json\n{pretty}\n```")
}

fn parse_fenced(response: &str) -> Option<Action> {
    let captures = FENCED_JSON.as_ref()?.captures(response)?;
    action_from_json(captures.get(1)?.as_str())
}

fn parse_loose(response: &str) -> Option<Action> {
    let found = LOOSE_JSON.as_ref()?.find(response)?;
    action_from_json(found.as_str())
}

/// Extract `{thought|reasoning, action: {tool, params}}` from JSON text.
fn action_from_json(text: &str) -> Option<Action> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    let action = parsed.get("action")?;
    let tool = action.get("tool")?.as_str()?;

    let params = match action.get("params") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let reasoning = ["thought", "reasoning"]
        .iter()
        .filter_map(|key| parsed.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    Some(Action {
        tool: tool.to_string(),
        params,
        reasoning: reasoning.to_string(),
    })
}

fn parse_bracket(response: &str) -> Option<Action> {
    let captures = BRACKET_CMD.as_ref()?.captures(response)?;
    let command = captures.get(1)?.as_str();
    let arg = captures.get(2).map(|m| strip_quotes(m.as_str())).unwrap_or("");

    match command {
        "SCREENSHOT" => Some(
            Action::new(names::VISION_CAPTURE)
                .with_reasoning("User requested visual analysis or screenshot."),
        ),
        "EXECUTE" => Some(
            Action::new(names::SHELL)
                .with_param("command", arg)
                .with_reasoning("Executing terminal command requested by model."),
        ),
        "READ_FILE" => Some(
            Action::new(names::READ_FILE)
                .with_param("path", arg)
                .with_reasoning("Reading file content."),
        ),
        _ => None,
    }
}

/// Drop one leading and one trailing double quote.
fn strip_quotes(arg: &str) -> &str {
    let arg = arg.strip_prefix('"').unwrap_or(arg);
    arg.strip_suffix('"').unwrap_or(arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_json() {
        let reply = r#"Let me check.
```json
{"thought": "List the directory first", "action": {"tool": "list_files", "params": {"path": "."}}}
```"#;
        let action = parse_action(reply).unwrap();
        assert_eq!(action.tool, "list_files");
        assert_eq!(action.param_str("path"), Some("."));
        assert_eq!(action.reasoning, "List the directory first");
    }

    #[test]
    fn parses_loose_json() {
        let reply = r#"Sure: {"reasoning": "done", "action": {"tool": "final_answer", "params": {"answer": "4"}}} hope that helps"#;
        let action = parse_action(reply).unwrap();
        assert_eq!(action.tool, "final_answer");
        assert_eq!(action.param_str("answer"), Some("4"));
        assert_eq!(action.reasoning, "done");
    }

    #[test]
    fn missing_params_default_to_empty() {
        let action = parse_action(r#"{"action": {"tool": "desktop_vision_capture"}}"#).unwrap();
        assert!(action.params.is_empty());
        assert_eq!(action.reasoning, "");
    }

    #[test]
    fn invalid_fenced_block_falls_through() {
        let reply = "```json\n{not json}\n```\n[CMD: READ_FILE \"notes.txt\"]";
        let action = parse_action(reply).unwrap();
        assert_eq!(action.tool, "read_file");
        assert_eq!(action.param_str("path"), Some("notes.txt"));
    }

    #[test]
    fn json_without_action_key_is_not_an_action() {
        assert!(parse_action("```json\n{\"answer\": 4}\n```").is_none());
        assert!(parse_action(r#"{"action": "final_answer"}"#).is_none());
    }

    #[test]
    fn bracket_commands() {
        let shot = parse_action("[CMD: SCREENSHOT]").unwrap();
        assert_eq!(shot.tool, "desktop_vision_capture");
        assert!(shot.params.is_empty());

        let exec = parse_action(r#"I'll run it. [CMD: EXECUTE "ls -la"]"#).unwrap();
        assert_eq!(exec.tool, "run_terminal_command");
        assert_eq!(exec.params.get("command"), Some(&json!("ls -la")));

        let read = parse_action("[CMD: READ_FILE /etc/hostname]").unwrap();
        assert_eq!(read.tool, "read_file");
        assert_eq!(read.param_str("path"), Some("/etc/hostname"));
    }

    #[test]
    fn write_file_and_unknown_commands_are_unsupported() {
        assert!(parse_action(r#"[CMD: WRITE_FILE "a.txt" "hello"]"#).is_none());
        assert!(parse_action("[CMD: REBOOT]").is_none());
    }

    #[test]
    fn plain_text_is_not_an_action() {
        assert!(parse_action("The answer is 4.").is_none());
        assert!(parse_action("").is_none());
    }

    #[test]
    fn rendered_action_parses_back() {
        let action = Action::new("write_file")
            .with_param("path", "out/report.md")
            .with_param("content", "# Report\n\nAll good.")
            .with_reasoning("Persist the summary");
        assert_eq!(parse_action(&render_action(&action)), Some(action));

        let bare = Action::new("final_answer").with_param("answer", "42");
        assert_eq!(parse_action(&render_action(&bare)), Some(bare));
    }

    #[test]
    fn encodings_agree_except_reasoning() {
        let fenced = parse_action(
            "```json\n{\"thought\": \"x\", \"action\": {\"tool\": \"run_terminal_command\", \"params\": {\"command\": \"ls -la\"}}}\n```",
        )
        .unwrap();
        let loose = parse_action(
            r#"{"action": {"tool": "run_terminal_command", "params": {"command": "ls -la"}}}"#,
        )
        .unwrap();
        let bracket = parse_action(r#"[CMD: EXECUTE "ls -la"]"#).unwrap();

        for other in [&loose, &bracket] {
            assert_eq!(fenced.tool, other.tool);
            assert_eq!(fenced.params, other.params);
        }
    }
}
