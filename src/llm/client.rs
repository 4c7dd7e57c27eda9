//! LLM turn client — one chat-completion exchange per call.
//!
//! Translates the conversation and tool catalogue into the provider's wire
//! shape, performs the request, and classifies the reply into one of
//! {final text, requested tool calls, failure}. Classification, not error
//! propagation, is the contract: `turn` never fails, it returns
//! [`TurnOutcome::Failed`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::errors::LlmError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, FunctionDefinition, FunctionPayload,
    ToolCallPayload, ToolDefinition, WireMessage,
};
use crate::mcp_client::McpTool;
use crate::orchestrator::types::{ChatMessage, Role, ToolCall};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Completions over long tool-heavy conversations
/// can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed system instruction prepended to every turn.
const SYSTEM_PROMPT: &str = "\
You are a helpful Indian Railways assistant powered by IRCTC tools.
You can help users with:
- Checking PNR status
- Finding trains between stations
- Getting train schedules
- Checking seat availability
- Getting fare information
- Train live status
- And more railway-related queries

When users ask about trains, use the available tools to fetch real-time information.
Always be helpful and provide clear, concise responses.
If a tool returns an error, explain it to the user in a friendly way.";

// ─── Classification ──────────────────────────────────────────────────────────

/// Outcome of one LLM turn.
///
/// A closed variant — call sites match exhaustively.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The model produced its final answer.
    Text(String),
    /// The model wants one or more tools executed first, in this order.
    ToolCalls(Vec<ToolCall>),
    /// The exchange failed (transport, provider error, malformed envelope).
    Failed { message: String },
}

/// One request/response exchange with the LLM service.
///
/// `LlmClient` is the production implementation; tests substitute stubs.
#[async_trait]
pub trait TurnClient: Send + Sync {
    async fn turn(&self, messages: &[ChatMessage], tools: &[McpTool]) -> TurnOutcome;
}

// ─── LlmClient ───────────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct LlmClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Create a new client for the given endpoint and model.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, LlmError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::ConnectionFailed {
                endpoint: base_url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn try_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[McpTool],
    ) -> Result<TurnOutcome, LlmError> {
        let wire_tools = build_tools(tools);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(messages),
            tool_choice: wire_tools.as_ref().map(|_| "auto".to_string()),
            tools: wire_tools,
        };

        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse {
                    reason: format!("failed to decode completion: {e}"),
                })?;

        classify(parsed)
    }
}

#[async_trait]
impl TurnClient for LlmClient {
    async fn turn(&self, messages: &[ChatMessage], tools: &[McpTool]) -> TurnOutcome {
        match self.try_turn(messages, tools).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "LLM turn failed");
                TurnOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

// ─── Translation ─────────────────────────────────────────────────────────────

/// Translate the conversation into the provider's message shape, with the
/// system instruction prepended.
fn build_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(WireMessage {
        role: Role::System,
        content: SYSTEM_PROMPT.to_string(),
        tool_call_id: None,
        tool_calls: None,
    });

    for msg in messages {
        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCallPayload {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: FunctionPayload {
                        name: tc.name.clone(),
                        arguments: serde_json::to_string(&tc.arguments).unwrap_or_default(),
                    },
                })
                .collect()
        });

        wire.push(WireMessage {
            role: msg.role,
            content: msg.content.clone(),
            tool_call_id: msg.tool_call_id.clone(),
            tool_calls,
        });
    }

    wire
}

/// Translate the tool catalogue into function tools. Returns `None` when the
/// catalogue is empty so the request omits tools entirely.
fn build_tools(tools: &[McpTool]) -> Option<Vec<ToolDefinition>> {
    if tools.is_empty() {
        return None;
    }

    Some(
        tools
            .iter()
            .map(|tool| ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool
                        .description
                        .clone()
                        .unwrap_or_else(|| tool.name.clone()),
                    parameters: tool.input_schema.clone().unwrap_or_else(|| {
                        serde_json::json!({"type": "object", "properties": {}})
                    }),
                },
            })
            .collect(),
    )
}

/// Classify a completion reply.
///
/// Requested function calls win over text content. Malformed argument JSON
/// yields empty arguments rather than aborting the turn.
fn classify(response: ChatCompletionResponse) -> Result<TurnOutcome, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::MalformedResponse {
            reason: "completion contained no choices".into(),
        })?;

    if let Some(raw_calls) = choice.message.tool_calls {
        if !raw_calls.is_empty() {
            let calls = raw_calls
                .into_iter()
                .map(|tc| {
                    let arguments = match serde_json::from_str(&tc.function.arguments) {
                        Ok(serde_json::Value::Object(map)) => map,
                        Ok(_) | Err(_) => {
                            tracing::warn!(
                                tool = %tc.function.name,
                                "unparseable tool call arguments, using empty map"
                            );
                            serde_json::Map::new()
                        }
                    };
                    ToolCall {
                        id: tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
                        name: tc.function.name,
                        arguments,
                    }
                })
                .collect::<Vec<_>>();

            tracing::info!(count = calls.len(), "LLM requested tool calls");
            return Ok(TurnOutcome::ToolCalls(calls));
        }
    }

    Ok(TurnOutcome::Text(choice.message.content.unwrap_or_default()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
