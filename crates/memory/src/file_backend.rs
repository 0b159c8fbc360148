//! File-based memory backend: persistent JSON and JSON-lines storage.
//!
//! Layout under the data directory:
//! - `conversation.json`: `{messages, updated_at}`, rewritten on every append
//! - `memories.jsonl`: one remembered note per line
//! - `execution-logs.jsonl`: one execution log per line
//!
//! Everything is loaded on creation and kept in memory; writes go straight
//! to disk. Corrupt lines are skipped with a warning.

use async_trait::async_trait;
use aria_core::action::ExecutionLog;
use aria_core::error::MemoryError;
use aria_core::memory::Memory;
use aria_core::message::Message;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::recall::{Note, rank_notes};
use crate::{MAX_EXECUTION_LOGS, newest_first, trim_front};

const CONVERSATION_FILE: &str = "conversation.json";
const NOTES_FILE: &str = "memories.jsonl";
const LOGS_FILE: &str = "execution-logs.jsonl";

#[derive(Serialize, Deserialize)]
struct ConversationFile {
    messages: Vec<Message>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    notes: Vec<Note>,
    logs: Vec<ExecutionLog>,
}

/// A file-backed [`Memory`] rooted at a data directory.
pub struct FileMemory {
    dir: PathBuf,
    state: Arc<RwLock<State>>,
    max_messages: usize,
}

impl FileMemory {
    /// Open (or lazily create) the store in `dir`.
    pub fn new(dir: impl Into<PathBuf>, max_messages: usize) -> Self {
        let dir = dir.into();

        let mut messages = load_conversation(&dir.join(CONVERSATION_FILE));
        trim_front(&mut messages, max_messages);
        let notes: Vec<Note> = load_jsonl(&dir.join(NOTES_FILE));
        let mut logs: Vec<ExecutionLog> = load_jsonl(&dir.join(LOGS_FILE));
        trim_front(&mut logs, MAX_EXECUTION_LOGS);

        debug!(
            dir = %dir.display(),
            messages = messages.len(),
            notes = notes.len(),
            logs = logs.len(),
            "File memory loaded"
        );

        Self {
            dir,
            state: Arc::new(RwLock::new(State {
                messages,
                notes,
                logs,
            })),
            max_messages,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to create memory directory: {e}")))
    }

    async fn write_conversation(&self, messages: &[Message]) -> Result<(), MemoryError> {
        self.ensure_dir().await?;
        let file = ConversationFile {
            messages: messages.to_vec(),
            updated_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize conversation: {e}")))?;
        tokio::fs::write(self.dir.join(CONVERSATION_FILE), content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write conversation file: {e}")))
    }

    async fn append_line<T: Serialize>(&self, file: &str, value: &T) -> Result<(), MemoryError> {
        self.ensure_dir().await?;
        let mut line = serde_json::to_string(value)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize entry: {e}")))?;
        line.push('\n');

        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open {file}: {e}")))?;
        handle
            .write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write {file}: {e}")))
    }

    async fn rewrite_lines<T: Serialize>(&self, file: &str, values: &[T]) -> Result<(), MemoryError> {
        self.ensure_dir().await?;
        let mut content = String::new();
        for value in values {
            let line = serde_json::to_string(value)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize entry: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }
        tokio::fs::write(self.dir.join(file), content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write {file}: {e}")))
    }
}

fn load_conversation(path: &Path) -> Vec<Message> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str::<ConversationFile>(&content) {
        Ok(file) => file.messages,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable conversation file");
            Vec::new()
        }
    }
}

fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(), // not created yet
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted line");
                None
            }
        })
        .collect()
}

#[async_trait]
impl Memory for FileMemory {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, message: Message) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.messages.push(message);
        trim_front(&mut state.messages, self.max_messages);
        self.write_conversation(&state.messages).await
    }

    async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    async fn remember(&self, content: &str) -> Result<(), MemoryError> {
        let note = Note::new(content);
        let mut state = self.state.write().await;
        self.append_line(NOTES_FILE, &note).await?;
        state.notes.push(note);
        Ok(())
    }

    async fn search_relevant(&self, query: &str, limit: usize) -> Result<Vec<String>, MemoryError> {
        Ok(rank_notes(&self.state.read().await.notes, query, limit))
    }

    async fn log_execution(&self, log: ExecutionLog) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        if state.logs.len() >= MAX_EXECUTION_LOGS {
            state.logs.push(log);
            trim_front(&mut state.logs, MAX_EXECUTION_LOGS);
            self.rewrite_lines(LOGS_FILE, &state.logs).await
        } else {
            self.append_line(LOGS_FILE, &log).await?;
            state.logs.push(log);
            Ok(())
        }
    }

    async fn execution_logs(&self, limit: usize) -> Result<Vec<ExecutionLog>, MemoryError> {
        Ok(newest_first(&self.state.read().await.logs, limit))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.messages.clear();
        self.write_conversation(&state.messages).await
    }
}
