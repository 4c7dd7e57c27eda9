//! Shared types for the orchestration core.
//!
//! Conversation turns, tool calls, and the events streamed to the caller.
//! These are plain value types — all behavior lives in the orchestrator loop
//! and the two clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object used for tool-call arguments.
pub type ArgumentMap = Map<String, Value>;

// ─── Conversation ────────────────────────────────────────────────────────────

/// Role of a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A single turn in the conversation.
///
/// Invariants (enforced by the constructors below):
/// - a `tool` turn always carries `tool_call_id` referencing a prior call
/// - an assistant turn carrying `tool_calls` has empty `content`
///
/// Turns are appended by the orchestrator and never mutated. The caller owns
/// retention of history across `process` invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// An assistant turn carrying plain text.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// An assistant turn recording requested tool calls. Content is always
    /// empty on these turns.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// A tool turn carrying the flattened result for one call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// A tool call requested by the model.
///
/// `id` is opaque and unique within one LLM turn; it is echoed back on the
/// matching tool-result turn so providers can correlate the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: ArgumentMap,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Events streamed to the caller during one orchestration run.
///
/// The sequence for a run is strictly ordered and terminated by exactly one
/// of `done` (success) or `error` (failure) — never both, never neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Processing has begun — emitted before any network call completes.
    Thinking { text: String },
    /// A tool call is about to execute.
    ToolStart { name: String, args: ArgumentMap },
    /// A tool call completed successfully.
    ToolComplete { name: String, result: String },
    /// A tool call returned an error result or failed to execute.
    /// The run continues — the result text is fed back to the model.
    ToolError { name: String, result: String },
    /// The model's final answer.
    Response { text: String },
    /// Terminal failure. No `done` follows.
    Error { text: String },
    /// Success terminal — always immediately follows `response`.
    Done,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
