//! Memory trait: conversation history, long-term recall and the
//! execution-log sink.
//!
//! The conversation history is the source of truth for what the model sees.
//! Recall is best-effort: callers treat a failed lookup as "nothing found".

use async_trait::async_trait;

use crate::action::ExecutionLog;
use crate::error::MemoryError;
use crate::message::Message;

/// The collaborator the execution loop reads context from and writes to.
///
/// Implementations: in-memory (tests, ephemeral sessions) and file-backed.
#[async_trait]
pub trait Memory: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Append a message to the conversation history.
    async fn append(&self, message: Message) -> std::result::Result<(), MemoryError>;

    async fn append_user_message(&self, content: &str) -> std::result::Result<(), MemoryError> {
        self.append(Message::user(content)).await
    }

    async fn append_assistant_message(&self, content: &str) -> std::result::Result<(), MemoryError> {
        self.append(Message::assistant(content)).await
    }

    async fn append_tool_result(
        &self,
        tool_name: &str,
        content: &str,
    ) -> std::result::Result<(), MemoryError> {
        self.append(Message::tool(tool_name, content)).await
    }

    /// The conversation so far, oldest first.
    async fn messages(&self) -> Vec<Message>;

    /// Store a long-term note for later recall.
    async fn remember(&self, content: &str) -> std::result::Result<(), MemoryError>;

    /// Up to `limit` remembered notes relevant to `query`, best match first.
    async fn search_relevant(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<String>, MemoryError>;

    /// Persist the record of a finished run.
    async fn log_execution(&self, log: ExecutionLog) -> std::result::Result<(), MemoryError>;

    /// The most recent `limit` execution logs, newest first.
    async fn execution_logs(&self, limit: usize) -> std::result::Result<Vec<ExecutionLog>, MemoryError>;

    /// Clear the conversation history. Notes and logs are kept.
    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}
