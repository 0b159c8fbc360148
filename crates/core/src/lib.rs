//! # Aria Core
//!
//! Domain types, collaborator traits, and error definitions for the Aria
//! agent runtime. This crate has no runtime or transport dependencies; it
//! defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the execution loop is a trait here. Implementations
//! live in their respective crates, so tests can substitute scripted
//! providers, tools and memories.

pub mod error;
pub mod message;
pub mod action;
pub mod provider;
pub mod tool;
pub mod memory;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use action::{Action, ExecutionLog, Step};
pub use provider::{ChatRequest, Provider, ProviderResponse};
pub use tool::{Tool, ToolDefinition, ToolParams, ToolRegistry};
pub use memory::Memory;
