//! The agent execution loop.
//!
//! One run turns a task into a final text answer:
//!
//! 1. **Init**: reset the stop flag, append the task to memory, recall
//!    relevant notes and build the system prompt
//! 2. **Ask** the failover engine for a completion, preferring the provider
//!    that answered last
//! 3. **Parse** the reply into an action
//! 4. **Act**: finish, look up alternatives, or dispatch a tool and feed the
//!    observation back
//! 5. Loop until an answer is produced or the iteration budget runs out
//!
//! Every iteration counts against the budget, including JSON retries and
//! recovered errors. Every way out of a run writes one [`ExecutionLog`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use aria_config::AgentConfig;
use aria_core::action::{Action, ExecutionLog, Step};
use aria_core::error::{Error, ProviderError};
use aria_core::memory::Memory;
use aria_core::message::Message;
use aria_core::tool::{ToolRegistry, names};
use aria_providers::{ChatOptions, FailoverEngine, is_cost_related};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::parser::parse_action;
use crate::prompt::{JSON_RETRY_CORRECTION, build_system_prompt};

/// Result text of a run ended by [`AgentExecutor::stop`].
pub const STOPPED_MESSAGE: &str = "Execution stopped by user (Kill Switch activated)";
/// Result text of a run where no provider, emergency included, answered.
pub const NO_PROVIDER_MESSAGE: &str = "CRITICAL: No AI provider is available.";
/// `error` field of a log for a stopped run.
pub const USER_STOPPED: &str = "USER_STOPPED";

/// Cloneable kill switch for a running executor.
///
/// The flag is checked at the top of every iteration; an in-flight provider
/// call or tool is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        warn!("Kill switch activated, stopping execution");
    }

    pub fn resume(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        info!("Execution resumed");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Drives tasks through the provider engine and the tool registry.
pub struct AgentExecutor {
    engine: Arc<FailoverEngine>,
    memory: Arc<dyn Memory>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    max_json_retries: usize,
    recall_limit: usize,
    /// Sticky-provider seed, reapplied at the start of every run
    default_provider: String,
    stop: StopHandle,
}

/// How one iteration ended.
enum Outcome {
    Continue,
    Finished {
        result: String,
        success: bool,
        error: Option<String>,
    },
}

/// Per-run state, owned by a single `run` call.
struct RunState {
    context: Vec<Message>,
    system_prompt: String,
    steps: Vec<Step>,
    current_provider: String,
    json_retries: usize,
    last_error: Option<String>,
}

impl AgentExecutor {
    pub fn new(
        engine: Arc<FailoverEngine>,
        memory: Arc<dyn Memory>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let defaults = AgentConfig::default();
        Self {
            engine,
            memory,
            tools,
            max_iterations: defaults.max_iterations,
            max_json_retries: defaults.max_json_retries,
            recall_limit: defaults.recall_limit,
            default_provider: defaults.default_provider,
            stop: StopHandle::default(),
        }
    }

    /// Apply the `[agent]` section of the configuration.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.max_json_retries = config.max_json_retries;
        self.recall_limit = config.recall_limit;
        self.default_provider = config.default_provider.clone();
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_json_retries(mut self, max: usize) -> Self {
        self.max_json_retries = max;
        self
    }

    /// Set the maximum number of notes recalled into the system prompt.
    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    pub fn engine(&self) -> &Arc<FailoverEngine> {
        &self.engine
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// A handle that can stop this executor from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn resume(&self) {
        self.stop.resume();
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_stopped()
    }

    /// Run `task` and return only the result text.
    pub async fn execute<F>(&self, task: &str, on_step: F) -> String
    where
        F: Fn(&Step) + Send + Sync,
    {
        self.run(task, on_step).await.result
    }

    /// Run `task` to completion and return its execution log.
    ///
    /// `on_step` is called synchronously after every executed tool call.
    /// Never fails: every error ends up either in the conversation, where
    /// the model can react to it, or in the returned log.
    pub async fn run<F>(&self, task: &str, on_step: F) -> ExecutionLog
    where
        F: Fn(&Step) + Send + Sync,
    {
        self.stop.stopped.store(false, Ordering::SeqCst);
        let started = Instant::now();
        info!(task = %task, max_iterations = self.max_iterations, "Starting agent run");

        let memories = self.recall(task).await;
        let system_prompt = build_system_prompt(&self.tools.definitions(), &memories);

        let context = match self.memory.append_user_message(task).await {
            Ok(()) => self.memory.messages().await,
            Err(e) => {
                warn!(error = %e, "Failed to persist task message");
                let mut context = self.memory.messages().await;
                context.push(Message::user(task));
                context
            }
        };

        let mut state = RunState {
            context,
            system_prompt,
            steps: Vec::new(),
            current_provider: self.default_provider.clone(),
            json_retries: 0,
            last_error: None,
        };

        let mut iteration = 0;
        while iteration < self.max_iterations {
            if self.stop.is_stopped() {
                info!(iteration, "Run stopped by kill switch");
                return self
                    .finish(task, state, started, STOPPED_MESSAGE.into(), false, Some(USER_STOPPED.into()))
                    .await;
            }

            iteration += 1;
            debug!(
                iteration,
                max = self.max_iterations,
                provider = %state.current_provider,
                "Agent iteration"
            );

            let outcome = match self.iterate(&mut state, &on_step).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.recover(&mut state, &e);
                    Outcome::Continue
                }
            };

            if let Outcome::Finished {
                result,
                success,
                error,
            } = outcome
            {
                return self.finish(task, state, started, result, success, error).await;
            }
        }

        let result = format!(
            "Task incomplete after {} iterations. Last error: {}",
            self.max_iterations,
            state.last_error.as_deref().unwrap_or("Max iterations reached")
        );
        warn!(iterations = self.max_iterations, "Iteration budget exhausted");
        let error = state.last_error.clone();
        self.finish(task, state, started, result, false, error).await
    }

    /// Best-effort recall of notes relevant to `task`.
    async fn recall(&self, task: &str) -> Vec<String> {
        if self.recall_limit == 0 {
            return Vec::new();
        }
        match self.memory.search_relevant(task, self.recall_limit).await {
            Ok(memories) => {
                if !memories.is_empty() {
                    debug!(count = memories.len(), "Injected relevant past memories");
                }
                memories
            }
            Err(e) => {
                warn!(error = %e, "Failed to recall long-term memory");
                Vec::new()
            }
        }
    }

    async fn iterate<F>(&self, state: &mut RunState, on_step: &F) -> Result<Outcome, Error>
    where
        F: Fn(&Step) + Send + Sync,
    {
        let mut messages = Vec::with_capacity(state.context.len() + 1);
        messages.push(Message::system(state.system_prompt.as_str()));
        messages.extend(state.context.iter().cloned());

        let options = ChatOptions::preferring(state.current_provider.as_str());
        let response = match self.engine.chat(&messages, &options).await {
            Ok(response) => response,
            Err(e @ ProviderError::Exhausted { .. }) => {
                error!(error = %e, "No AI provider available");
                state.current_provider = "none".into();
                return Ok(Outcome::Finished {
                    result: NO_PROVIDER_MESSAGE.into(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
            Err(e) => return Err(e.into()),
        };

        state.current_provider = response.provider.clone();
        debug!(
            provider = %response.provider,
            latency_ms = response.latency_ms,
            "Completion received"
        );
        let text = response.content;

        let Some(action) = parse_action(&text) else {
            if state.json_retries < self.max_json_retries {
                state.json_retries += 1;
                debug!(
                    retry = state.json_retries,
                    max = self.max_json_retries,
                    "No action in reply, requesting JSON"
                );
                state.context.push(Message::system(JSON_RETRY_CORRECTION));
                return Ok(Outcome::Continue);
            }

            state.context.push(Message::assistant(text.as_str()));
            self.persist_answer(&text).await;
            return Ok(Outcome::Finished {
                result: text,
                success: true,
                error: None,
            });
        };

        state.json_retries = 0;

        let tool = action.tool.clone();
        match tool.as_str() {
            names::FINAL_ANSWER => {
                let answer = ["answer", "response"]
                    .iter()
                    .filter_map(|key| action.param_str(key))
                    .find(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or(text);
                self.persist_answer(&answer).await;
                Ok(Outcome::Finished {
                    result: answer,
                    success: true,
                    error: None,
                })
            }
            names::SEARCH_FREE_ALTERNATIVES => {
                self.search_alternatives(state, action, on_step);
                Ok(Outcome::Continue)
            }
            tool if !self.tools.contains(tool) => {
                warn!(tool = %tool, "Model requested an unknown tool");
                let observation = format!(
                    "Unknown tool: {tool}. Available tools: {}",
                    self.tools.names().join(", ")
                );
                state.context.push(Message::tool(tool, observation));
                Ok(Outcome::Continue)
            }
            _ => {
                self.dispatch(state, action, on_step).await?;
                Ok(Outcome::Continue)
            }
        }
    }

    /// The answer stands even when it cannot be stored.
    async fn persist_answer(&self, answer: &str) {
        if let Err(e) = self.memory.append_assistant_message(answer).await {
            warn!(error = %e, "Failed to persist answer");
        }
    }

    fn search_alternatives<F>(&self, state: &mut RunState, action: Action, on_step: &F)
    where
        F: Fn(&Step) + Send + Sync,
    {
        let service = ["service", "query"]
            .iter()
            .filter_map(|key| action.param_str(key))
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string();

        let alternatives = self.engine.search_free_alternatives(&service);
        let listed: Vec<String> = alternatives
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {a}", i + 1))
            .collect();
        let observation = format!("Free alternatives for \"{service}\":\n{}", listed.join("\n"));
        info!(service = %service, count = alternatives.len(), "Suggested free alternatives");

        let tool = action.tool.clone();
        let step = Step::new(action, observation.as_str());
        on_step(&step);
        state.steps.push(step);

        state
            .context
            .push(Message::assistant(format!("Searching free alternatives for: {service}")));
        state.context.push(Message::tool(tool, observation));
    }

    async fn dispatch<F>(&self, state: &mut RunState, action: Action, on_step: &F) -> Result<(), Error>
    where
        F: Fn(&Step) + Send + Sync,
    {
        info!(tool = %action.tool, reasoning = %action.reasoning, "Executing tool");

        let observation = self.tools.execute(&action.tool, action.params.clone()).await?;
        debug!(tool = %action.tool, len = observation.len(), "Tool finished");

        let announcement = format!("Using tool: {}\nReasoning: {}", action.tool, action.reasoning);
        let tool = action.tool.clone();
        let step = Step::new(action, observation.as_str());
        on_step(&step);
        state.steps.push(step);

        state.context.push(Message::assistant(announcement));
        state.context.push(Message::tool(tool.as_str(), observation.as_str()));

        self.memory.append_tool_result(&tool, &observation).await?;
        Ok(())
    }

    /// Turn an iteration error into conversation context.
    fn recover(&self, state: &mut RunState, error: &Error) {
        let message = describe(error);
        state.last_error = Some(message.clone());

        if is_cost_related(&message) {
            let alternatives = self.engine.search_free_alternatives(&state.current_provider);
            warn!(
                provider = %state.current_provider,
                error = %message,
                "Cost error detected, switching to alternatives"
            );
            state.context.push(Message::system(format!(
                "PROVIDER BLOCKED ({message}). Switching to alternatives: {}. Continue with the task.",
                alternatives.join(", ")
            )));
        } else {
            warn!(error = %message, "Iteration failed");
            state
                .context
                .push(Message::tool("system", format!("Error: {message}")));
        }
    }

    async fn finish(
        &self,
        task: &str,
        state: RunState,
        started: Instant,
        result: String,
        success: bool,
        error: Option<String>,
    ) -> ExecutionLog {
        let mut log = ExecutionLog::new(task);
        log.steps = state.steps;
        log.result = result;
        log.success = success;
        log.duration_ms = started.elapsed().as_millis() as u64;
        log.timestamp = Utc::now();
        log.error = error;
        log.provider = Some(state.current_provider);

        info!(
            success = log.success,
            steps = log.steps.len(),
            duration_ms = log.duration_ms,
            "Agent run finished"
        );

        if let Err(e) = self.memory.log_execution(log.clone()).await {
            warn!(error = %e, "Failed to write execution log");
        }
        log
    }
}

/// The innermost message of an error, without the context-level prefix.
fn describe(error: &Error) -> String {
    match error {
        Error::Provider(e) => e.to_string(),
        Error::Memory(e) => e.to_string(),
        Error::Tool(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_config::ProviderKind;
    use aria_core::error::{MemoryError, ToolError};
    use aria_core::message::Role;
    use aria_core::provider::{ChatRequest, Provider};
    use aria_core::tool::{Tool, ToolParams};
    use aria_memory::InMemoryMemory;
    use aria_providers::{FailoverOptions, ProviderConfig, ProviderStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted replies and records every request it receives.
    struct ScriptedProvider {
        name: String,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(name: &str, script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn replies(name: &str, replies: &[&str]) -> Arc<Self> {
            Self::new(name, replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> ChatRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    /// Records every call; replies with a fixed observation.
    struct EchoTool {
        name: &'static str,
        calls: Mutex<Vec<ToolParams>>,
        on_call: Option<StopHandle>,
    }

    impl EchoTool {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Mutex::new(Vec::new()),
                on_call: None,
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Echo the params back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}})
        }

        async fn execute(&self, params: ToolParams) -> Result<String, ToolError> {
            self.calls.lock().unwrap().push(params.clone());
            if let Some(handle) = &self.on_call {
                handle.stop();
            }
            Ok(format!("{} ran with {}", self.name, serde_json::Value::Object(params)))
        }
    }

    struct FailingTool(ToolError);

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _params: ToolParams) -> Result<String, ToolError> {
            Err(self.0.clone())
        }
    }

    fn engine_with(provider: Arc<ScriptedProvider>) -> Arc<FailoverEngine> {
        Arc::new(FailoverEngine::new(FailoverOptions::default()).with_provider(
            ProviderConfig::new(provider.name.clone(), ProviderKind::OpenaiCompat, 1)
                .with_models(&["test-model"]),
            provider,
        ))
    }

    fn registry(tools: Vec<Box<dyn Tool>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    fn final_answer(answer: &str) -> String {
        format!(
            "```json\n{{\"thought\": \"done\", \"action\": {{\"tool\": \"final_answer\", \"params\": {{\"answer\": \"{answer}\"}}}}}}\n```"
        )
    }

    fn call(tool: &str, params: &str) -> String {
        format!(
            "```json\n{{\"thought\": \"use {tool}\", \"action\": {{\"tool\": \"{tool}\", \"params\": {params}}}}}\n```"
        )
    }

    #[tokio::test]
    async fn final_answer_ends_run() {
        let provider = ScriptedProvider::replies("Local", &[&final_answer("4")]);
        let memory = Arc::new(InMemoryMemory::default());
        let executor = AgentExecutor::new(engine_with(provider.clone()), memory.clone(), registry(vec![]));

        let log = executor.run("what is 2+2", |_| {}).await;

        assert_eq!(log.result, "4");
        assert!(log.success);
        assert!(log.steps.is_empty());
        assert_eq!(log.provider.as_deref(), Some("Local"));
        assert_eq!(provider.calls(), 1);

        let messages = memory.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "what is 2+2");
        assert_eq!(messages[1].content, "4");

        let logs = memory.execution_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].success);
    }

    #[tokio::test]
    async fn final_answer_falls_back_to_response_then_raw_text() {
        let reply = r#"{"action": {"tool": "final_answer", "params": {"response": "via response"}}}"#;
        let provider = ScriptedProvider::replies("Local", &[reply]);
        let executor = AgentExecutor::new(
            engine_with(provider),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        );
        assert_eq!(executor.execute("t", |_| {}).await, "via response");

        let reply = r#"{"action": {"tool": "final_answer", "params": {}}}"#;
        let provider = ScriptedProvider::replies("Local", &[reply]);
        let executor = AgentExecutor::new(
            engine_with(provider),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        );
        assert_eq!(executor.execute("t", |_| {}).await, reply);
    }

    #[tokio::test]
    async fn system_prompt_leads_every_request() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[&call("read_file", r#"{"path": "a.txt"}"#), &final_answer("ok")],
        );
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        );
        executor.run("read a.txt", |_| {}).await;

        for i in 0..2 {
            let request = provider.request(i);
            assert_eq!(request.messages[0].role, Role::System);
            assert!(request.messages[0].content.contains("- read_file: Echo the params back"));
            assert_eq!(request.messages[1].content, "read a.txt");
        }
        assert_eq!(provider.request(1).messages.len(), 4);
    }

    #[tokio::test]
    async fn tool_call_records_step_and_observation() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[&call("read_file", r#"{"path": "notes.txt"}"#), &final_answer("read it")],
        );
        let memory = Arc::new(InMemoryMemory::default());
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            memory.clone(),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        );

        let streamed = Mutex::new(Vec::new());
        let log = executor
            .run("read my notes", |step| streamed.lock().unwrap().push(step.action.tool.clone()))
            .await;

        assert!(log.success);
        assert_eq!(log.steps.len(), 1);
        assert_eq!(log.steps[0].action.param_str("path"), Some("notes.txt"));
        assert!(log.steps[0].observation.starts_with("read_file ran with"));
        assert_eq!(*streamed.lock().unwrap(), vec!["read_file".to_string()]);

        let second = provider.request(1);
        let n = second.messages.len();
        assert_eq!(second.messages[n - 2].role, Role::Assistant);
        assert_eq!(
            second.messages[n - 2].content,
            "Using tool: read_file\nReasoning: use read_file"
        );
        assert_eq!(second.messages[n - 1].role, Role::Tool);
        assert_eq!(second.messages[n - 1].tool_name.as_deref(), Some("read_file"));

        // user task, tool result, final answer
        let persisted = memory.messages().await;
        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted[1].role, Role::Tool);
    }

    #[tokio::test]
    async fn malformed_replies_then_unknown_tool() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[
                "I think the answer is here somewhere",
                "still not json",
                &call("foo", "{}"),
                &final_answer("gave up on foo"),
            ],
        );
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        );

        let log = executor.run("do the foo thing", |_| {}).await;
        assert!(log.success);
        assert_eq!(log.result, "gave up on foo");
        assert_eq!(provider.calls(), 4);

        let last = provider.request(3).messages;
        let corrections = last
            .iter()
            .filter(|m| m.role == Role::System && m.content == JSON_RETRY_CORRECTION)
            .count();
        assert_eq!(corrections, 2);

        let unknown = last.last().unwrap();
        assert_eq!(unknown.role, Role::Tool);
        assert_eq!(unknown.tool_name.as_deref(), Some("foo"));
        assert_eq!(unknown.content, "Unknown tool: foo. Available tools: read_file");
    }

    #[tokio::test]
    async fn plain_text_accepted_after_retries() {
        let provider = ScriptedProvider::replies("Local", &["one", "two", "three"]);
        let memory = Arc::new(InMemoryMemory::default());
        let executor = AgentExecutor::new(engine_with(provider.clone()), memory.clone(), registry(vec![]));

        let log = executor.run("chat", |_| {}).await;
        assert!(log.success);
        assert_eq!(log.result, "three");
        assert_eq!(provider.calls(), 3);
        assert_eq!(memory.messages().await.last().unwrap().content, "three");
    }

    #[tokio::test]
    async fn retry_budget_resets_after_parsed_action() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[
                "not json",
                "not json",
                &call("read_file", r#"{"path": "x"}"#),
                "not json",
                &final_answer("done"),
            ],
        );
        let executor = AgentExecutor::new(
            engine_with(provider),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        );
        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, "done");
        assert_eq!(log.steps.len(), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_reports_last_error() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[
                &call("flaky", "{}"),
                &call("flaky", "{}"),
                &call("flaky", "{}"),
            ],
        );
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(FailingTool(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: "disk on fire".into(),
            }))]),
        )
        .with_max_iterations(3);

        let log = executor.run("t", |_| {}).await;
        assert!(!log.success);
        assert_eq!(provider.calls(), 3);
        assert_eq!(
            log.result,
            "Task incomplete after 3 iterations. Last error: Tool execution failed: flaky: disk on fire"
        );
        assert_eq!(log.error.as_deref(), Some("Tool execution failed: flaky: disk on fire"));

        let last = provider.request(2).messages;
        let error_msg = last.last().unwrap();
        assert_eq!(error_msg.role, Role::Tool);
        assert_eq!(error_msg.tool_name.as_deref(), Some("system"));
        assert!(error_msg.content.starts_with("Error: Tool execution failed"));
    }

    #[tokio::test]
    async fn budget_exhaustion_without_errors() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[&call("read_file", "{}"), &call("read_file", "{}")],
        );
        let executor = AgentExecutor::new(
            engine_with(provider),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        )
        .with_max_iterations(2);

        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, "Task incomplete after 2 iterations. Last error: Max iterations reached");
        assert!(log.error.is_none());
    }

    #[tokio::test]
    async fn cost_error_injects_alternatives() {
        let provider = ScriptedProvider::replies(
            "Groq (Free Tier)",
            &[&call("flaky", "{}"), &final_answer("recovered")],
        );
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(FailingTool(ToolError::ExecutionFailed {
                tool_name: "flaky".into(),
                reason: "Quota exceeded for this month".into(),
            }))]),
        );

        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, "recovered");

        let system = provider.request(1).messages.last().cloned().unwrap();
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with(
            "PROVIDER BLOCKED (Tool execution failed: flaky: Quota exceeded for this month). Switching to alternatives: "
        ));
        assert!(system.content.ends_with(". Continue with the task."));
    }

    #[tokio::test]
    async fn search_free_alternatives_is_handled_inline() {
        let provider = ScriptedProvider::replies(
            "Local",
            &[
                &call("search_free_alternatives", r#"{"query": "OpenAI"}"#),
                &final_answer("use a local model"),
            ],
        );
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        );

        let log = executor.run("replace openai", |_| {}).await;
        assert_eq!(log.steps.len(), 1);
        assert!(log.steps[0].observation.starts_with("Free alternatives for \"OpenAI\":\n1. "));

        let messages = provider.request(1).messages;
        let n = messages.len();
        assert_eq!(messages[n - 2].content, "Searching free alternatives for: OpenAI");
        assert_eq!(messages[n - 1].tool_name.as_deref(), Some("search_free_alternatives"));
    }

    #[tokio::test]
    async fn stop_prevents_further_tools() {
        let executor_stop = StopHandle::default();
        let provider = ScriptedProvider::replies(
            "Local",
            &[
                &call("read_file", r#"{"path": "a"}"#),
                &call("read_file", r#"{"path": "b"}"#),
            ],
        );
        let mut executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        );
        executor.stop = executor_stop.clone();
        let tool = EchoTool {
            on_call: Some(executor_stop.clone()),
            ..EchoTool::new("read_file")
        };
        executor.tools = registry(vec![Box::new(tool)]);

        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, STOPPED_MESSAGE);
        assert!(!log.success);
        assert_eq!(log.error.as_deref(), Some(USER_STOPPED));
        assert_eq!(log.steps.len(), 1);
        assert_eq!(provider.calls(), 1);
        assert!(!executor.is_running());

        executor.resume();
        assert!(executor.is_running());
    }

    #[tokio::test]
    async fn run_resets_stop_flag() {
        let provider = ScriptedProvider::replies("Local", &[&final_answer("fine")]);
        let executor = AgentExecutor::new(
            engine_with(provider),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        );
        executor.stop();
        assert_eq!(executor.execute("t", |_| {}).await, "fine");
    }

    #[tokio::test]
    async fn exhausted_providers_end_run() {
        let engine = Arc::new(FailoverEngine::new(FailoverOptions::default()));
        let memory = Arc::new(InMemoryMemory::default());
        let executor = AgentExecutor::new(engine, memory.clone(), registry(vec![]));

        let log = executor.run("anything", |_| {}).await;
        assert_eq!(log.result, NO_PROVIDER_MESSAGE);
        assert!(!log.success);
        assert_eq!(log.provider.as_deref(), Some("none"));
        assert!(log.error.unwrap().contains("All AI providers"));
        assert_eq!(memory.execution_logs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sticky_provider_follows_last_success() {
        let alpha = ScriptedProvider::new(
            "Alpha",
            vec![Err(ProviderError::ApiError {
                status_code: 500,
                message: "Alpha error: 500 - boom".into(),
            })],
        );
        let beta = ScriptedProvider::replies(
            "Beta",
            &[&call("read_file", "{}"), &final_answer("beta wins")],
        );
        let engine = Arc::new(
            FailoverEngine::new(FailoverOptions::default())
                .with_provider(ProviderConfig::new("Alpha", ProviderKind::OpenaiCompat, 1), alpha.clone())
                .with_provider(ProviderConfig::new("Beta", ProviderKind::OpenaiCompat, 2), beta.clone()),
        );
        let executor = AgentExecutor::new(
            engine.clone(),
            Arc::new(InMemoryMemory::default()),
            registry(vec![Box::new(EchoTool::new("read_file"))]),
        );

        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, "beta wins");
        assert_eq!(log.provider.as_deref(), Some("Beta"));
        // Second iteration went straight to Beta.
        assert_eq!(alpha.calls(), 1);
        assert_eq!(beta.calls(), 2);
        assert!(engine
            .provider_status()
            .iter()
            .all(|r| r.status != ProviderStatus::Blocked));
    }

    #[tokio::test]
    async fn recalled_memories_reach_the_prompt() {
        let provider = ScriptedProvider::replies("Local", &[&final_answer("ok")]);
        let memory = Arc::new(InMemoryMemory::default());
        memory.remember("Deploys run through scripts/deploy.sh").await.unwrap();
        let executor = AgentExecutor::new(engine_with(provider.clone()), memory, registry(vec![]));

        executor.run("how do deploys work", |_| {}).await;
        let prompt = &provider.request(0).messages[0].content;
        assert!(prompt.contains("=== RELEVANT PAST MEMORIES ===\n- Deploys run through scripts/deploy.sh"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_provider_recovers_during_run() {
        let alpha = ScriptedProvider::new(
            "Alpha",
            vec![
                Err(ProviderError::RateLimited("Alpha error: 429 - too many requests".into())),
                Ok(final_answer("alpha back")),
            ],
        );
        let beta = ScriptedProvider::replies("Beta", &["plain text from beta"]);
        let engine = Arc::new(
            FailoverEngine::new(FailoverOptions::default())
                .with_provider(ProviderConfig::new("Alpha", ProviderKind::Groq, 1), alpha.clone())
                .with_provider(ProviderConfig::new("Beta", ProviderKind::Together, 2), beta.clone()),
        );
        let executor = AgentExecutor::new(
            engine.clone(),
            Arc::new(InMemoryMemory::default()),
            registry(vec![]),
        )
        .with_max_json_retries(0);

        let log = executor.run("t", |_| {}).await;
        assert_eq!(log.result, "plain text from beta");
        assert_eq!(engine.provider_status()[0].status, ProviderStatus::RateLimited);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(engine.provider_status()[0].status, ProviderStatus::Active);

        let log = executor.with_default_provider("alpha").run("again", |_| {}).await;
        assert_eq!(log.result, "alpha back");
    }

    /// Accepts the task message, then fails every write and every recall.
    struct BrokenMemory {
        inner: InMemoryMemory,
        accepted: Mutex<usize>,
    }

    impl BrokenMemory {
        fn new() -> Self {
            Self {
                inner: InMemoryMemory::default(),
                accepted: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Memory for BrokenMemory {
        fn name(&self) -> &str {
            "broken"
        }

        async fn append(&self, message: Message) -> Result<(), MemoryError> {
            {
                let mut accepted = self.accepted.lock().unwrap();
                if *accepted > 0 {
                    return Err(MemoryError::Storage("disk full".into()));
                }
                *accepted += 1;
            }
            self.inner.append(message).await
        }

        async fn messages(&self) -> Vec<Message> {
            self.inner.messages().await
        }

        async fn remember(&self, _content: &str) -> Result<(), MemoryError> {
            Err(MemoryError::Storage("disk full".into()))
        }

        async fn search_relevant(&self, _query: &str, _limit: usize) -> Result<Vec<String>, MemoryError> {
            Err(MemoryError::QueryFailed("index unavailable".into()))
        }

        async fn log_execution(&self, log: ExecutionLog) -> Result<(), MemoryError> {
            self.inner.log_execution(log).await
        }

        async fn execution_logs(&self, limit: usize) -> Result<Vec<ExecutionLog>, MemoryError> {
            self.inner.execution_logs(limit).await
        }

        async fn clear(&self) -> Result<(), MemoryError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn final_answer_survives_failed_persist() {
        let provider = ScriptedProvider::replies("Local", &[&final_answer("4"), &final_answer("4")]);
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(BrokenMemory::new()),
            registry(vec![]),
        );

        let log = executor.run("what is 2+2", |_| {}).await;

        assert_eq!(log.result, "4");
        assert!(log.success);
        assert!(log.error.is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn plain_text_answer_survives_failed_persist() {
        let provider = ScriptedProvider::replies("Local", &["just text", "still text", "plain answer"]);
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(BrokenMemory::new()),
            registry(vec![]),
        );

        let log = executor.run("say something", |_| {}).await;

        assert_eq!(log.result, "plain answer");
        assert!(log.success);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn failed_recall_is_ignored() {
        let provider = ScriptedProvider::replies("Local", &[&final_answer("done")]);
        let executor = AgentExecutor::new(
            engine_with(provider.clone()),
            Arc::new(BrokenMemory::new()),
            registry(vec![]),
        );

        let log = executor.run("deploy the service", |_| {}).await;

        assert!(log.success);
        assert_eq!(log.result, "done");
        let system = &provider.request(0).messages[0];
        assert_eq!(system.role, Role::System);
        assert!(!system.content.contains("RELEVANT PAST MEMORIES"));
    }
}
