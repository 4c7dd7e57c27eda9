//! Orchestrator — the chat/tool-calling state machine.
//!
//! Submodules:
//! - `types`: conversation turns, tool calls, and streamed events
//! - `process`: the bounded loop interleaving LLM turns and tool calls
//!
//! One `process` invocation drives one run from the initial `thinking`
//! event to a single terminal event. The collaborators are injected as
//! trait objects so the loop is testable against stubs.

pub mod process;
pub mod types;

// Re-exports for convenience
pub use types::{ChatMessage, OrchestratorEvent, Role, ToolCall};

use std::sync::Arc;

use crate::llm::TurnClient;
use crate::mcp_client::ToolServer;

/// Maximum LLM/tool iterations per run. A liveness guard against a model
/// that calls tools indefinitely, not a tunable.
pub const MAX_TOOL_ITERATIONS: usize = 10;

/// Orchestrates the flow between user, LLM, and MCP tools.
///
/// Constructed once at startup and shared across requests; holds no
/// per-run state.
pub struct ChatOrchestrator {
    llm: Arc<dyn TurnClient>,
    tools: Arc<dyn ToolServer>,
}

impl ChatOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(llm: Arc<dyn TurnClient>, tools: Arc<dyn ToolServer>) -> Self {
        Self { llm, tools }
    }

    /// Access the tool-server client (diagnostic endpoints, shutdown).
    pub fn tool_server(&self) -> &Arc<dyn ToolServer> {
        &self.tools
    }
}
