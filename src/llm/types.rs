//! Wire types for the LLM turn client.
//!
//! These mirror the OpenAI Chat Completions API shapes, request building on
//! one side and non-streaming response parsing on the other.

use serde::{Deserialize, Serialize};

use crate::orchestrator::types::Role;

// ─── Request Types ───────────────────────────────────────────────────────────

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Only set when tools are offered — the provider must not be told
    /// tools exist if none are.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// A conversation turn in the provider's message shape.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

/// A tool call re-encoded onto an assistant turn.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallPayload {
    pub id: String,
    pub r#type: String,
    pub function: FunctionPayload,
}

/// Function call details: arguments travel as a JSON text blob.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionPayload {
    pub name: String,
    pub arguments: String,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Response body of a non-streaming chat completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

/// The assistant message within a choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

/// A tool call as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseToolCall {
    /// Some providers omit the id; a fallback is generated during
    /// classification.
    #[serde(default)]
    pub id: Option<String>,
    pub function: ResponseFunction,
}

/// Function call details in a response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
