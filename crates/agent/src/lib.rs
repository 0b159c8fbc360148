//! The agent loop for Aria.
//!
//! The agent follows an **Ask → Parse → Act → Observe** cycle:
//!
//! 1. **Ask** the failover engine for a completion (system prompt + conversation)
//! 2. **Parse** the reply into an [`Action`](aria_core::Action), tolerating
//!    fenced JSON, loose JSON and bracket commands
//! 3. **Act**: run the requested tool, or finish with the answer
//! 4. **Observe**: feed the tool result back and loop
//!
//! The loop continues until the model produces an answer, the iteration
//! budget runs out, or the kill switch is pulled.

pub mod executor;
pub mod parser;
pub mod prompt;

pub use executor::{AgentExecutor, NO_PROVIDER_MESSAGE, STOPPED_MESSAGE, StopHandle, USER_STOPPED};
pub use parser::{parse_action, render_action};
pub use prompt::build_system_prompt;
