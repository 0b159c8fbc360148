//! Memory implementations for Aria.
//!
//! Both backends implement `aria_core::Memory`: a bounded conversation
//! history, keyword recall over remembered notes, and the execution-log sink.

pub mod file_backend;
pub mod in_memory;
pub mod recall;

use std::sync::Arc;

use aria_config::{MemoryBackendKind, MemoryConfig};
use aria_core::action::ExecutionLog;
use aria_core::memory::Memory;

pub use file_backend::FileMemory;
pub use in_memory::InMemoryMemory;
pub use recall::{Note, rank_notes, success_rate};

/// Execution logs retained per store.
pub const MAX_EXECUTION_LOGS: usize = 1000;

/// Build the configured backend.
pub fn from_config(config: &MemoryConfig) -> Arc<dyn Memory> {
    match config.backend {
        MemoryBackendKind::File => Arc::new(FileMemory::new(&config.data_dir, config.max_messages)),
        MemoryBackendKind::InMemory => Arc::new(InMemoryMemory::new(config.max_messages)),
    }
}

/// Drop the oldest items so at most `max` remain.
pub(crate) fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

/// The last `limit` logs, newest first.
pub(crate) fn newest_first(logs: &[ExecutionLog], limit: usize) -> Vec<ExecutionLog> {
    logs.iter().rev().take(limit).cloned().collect()
}
