//! In-memory backend for tests and ephemeral sessions.

use async_trait::async_trait;
use aria_core::action::ExecutionLog;
use aria_core::error::MemoryError;
use aria_core::memory::Memory;
use aria_core::message::Message;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::recall::{Note, rank_notes};
use crate::{MAX_EXECUTION_LOGS, newest_first, trim_front};

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    notes: Vec<Note>,
    logs: Vec<ExecutionLog>,
}

/// Conversation, notes and execution logs held in process memory.
pub struct InMemoryMemory {
    state: Arc<RwLock<State>>,
    max_messages: usize,
}

impl InMemoryMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            max_messages,
        }
    }
}

impl Default for InMemoryMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, message: Message) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.messages.push(message);
        trim_front(&mut state.messages, self.max_messages);
        Ok(())
    }

    async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    async fn remember(&self, content: &str) -> Result<(), MemoryError> {
        self.state.write().await.notes.push(Note::new(content));
        Ok(())
    }

    async fn search_relevant(&self, query: &str, limit: usize) -> Result<Vec<String>, MemoryError> {
        Ok(rank_notes(&self.state.read().await.notes, query, limit))
    }

    async fn log_execution(&self, log: ExecutionLog) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.logs.push(log);
        trim_front(&mut state.logs, MAX_EXECUTION_LOGS);
        Ok(())
    }

    async fn execution_logs(&self, limit: usize) -> Result<Vec<ExecutionLog>, MemoryError> {
        Ok(newest_first(&self.state.read().await.logs, limit))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.state.write().await.messages.clear();
        Ok(())
    }
}
