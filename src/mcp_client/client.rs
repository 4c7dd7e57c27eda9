//! MCP Client — session handshake, tool discovery, and tool execution.
//!
//! Wraps the HTTP transport with the MCP session protocol: the
//! `initialize` handshake, the cached `tools/list` catalogue, and
//! `tools/call` dispatch with argument coercion.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::errors::McpError;
use super::transport::{self, HttpTransport, PROTOCOL_VERSION};
use super::types::{McpTool, McpToolResult, ToolsListResult};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Client identity sent in the initialize handshake.
const CLIENT_NAME: &str = "railchat";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ─── ToolServer Seam ─────────────────────────────────────────────────────────

/// Operations the orchestrator needs from the remote tool server.
///
/// `McpClient` is the production implementation; tests substitute stubs.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Perform the session handshake. Idempotent.
    async fn initialize(&self) -> Result<(), McpError>;

    /// Fetch (or return the cached) tool catalogue.
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError>;

    /// Execute one tool call.
    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<McpToolResult, McpError>;

    /// Whether the handshake has completed.
    async fn is_connected(&self) -> bool;

    /// Reset session state and the tool cache.
    async fn disconnect(&self);
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Session state guarded by one async mutex.
///
/// The mutex is held across the handshake so that concurrent `initialize`
/// calls converge on a single handshake: the second caller observes
/// `initialized == true` and returns without touching the wire.
#[derive(Default)]
struct SessionState {
    initialized: bool,
    tools: Vec<McpTool>,
}

/// Client for a single remote MCP server.
pub struct McpClient {
    transport: HttpTransport,
    state: tokio::sync::Mutex<SessionState>,
}

impl McpClient {
    /// Create a new client targeting the given server URL.
    pub fn new(url: &str, api_host: &str, api_key: &str) -> Result<Self, McpError> {
        Ok(Self {
            transport: HttpTransport::new(url, api_host, api_key)?,
            state: tokio::sync::Mutex::new(SessionState::default()),
        })
    }

    /// Run the initialize handshake if it hasn't completed yet.
    ///
    /// On a JSON-RPC error the state is left uninitialized so a later run
    /// can retry the handshake.
    async fn initialize_locked(&self, state: &mut SessionState) -> Result<(), McpError> {
        if state.initialized {
            tracing::debug!("MCP client already initialized");
            return Ok(());
        }

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
        });

        let response = self.transport.request("initialize", Some(params)).await?;
        transport::extract_result(response)?;

        // One-way acknowledgement. A transport failure here is logged and
        // swallowed — the handshake is still considered complete.
        if let Err(e) = self.transport.notify("notifications/initialized").await {
            tracing::warn!(error = %e, "failed to send initialized notification");
        }

        state.initialized = true;
        tracing::info!("MCP client initialized");
        Ok(())
    }
}

#[async_trait]
impl ToolServer for McpClient {
    async fn initialize(&self) -> Result<(), McpError> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut state = self.state.lock().await;
        self.initialize_locked(&mut state).await?;

        if !state.tools.is_empty() {
            return Ok(state.tools.clone());
        }

        let response = self.transport.request("tools/list", None).await?;
        let result = transport::extract_result(response)?;

        let listed: ToolsListResult =
            serde_json::from_value(result).map_err(|e| McpError::InvalidResponse {
                reason: format!("malformed tools/list result: {e}"),
            })?;

        tracing::info!(count = listed.tools.len(), "fetched MCP tool catalogue");
        state.tools = listed.tools.clone();
        Ok(listed.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<McpToolResult, McpError> {
        {
            let mut state = self.state.lock().await;
            self.initialize_locked(&mut state).await?;
        }

        let params = serde_json::json!({
            "name": name,
            "arguments": Value::Object(coerce_arguments(arguments)),
        });

        tracing::info!(tool = name, "calling MCP tool");

        let response = self.transport.request("tools/call", Some(params)).await?;
        let result = transport::extract_result(response)?;

        serde_json::from_value(result).map_err(|e| McpError::InvalidResponse {
            reason: format!("malformed tools/call result: {e}"),
        })
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().await.initialized
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.initialized = false;
        state.tools.clear();
        self.transport.clear_session();
        tracing::info!("MCP client disconnected");
    }
}

// ─── Argument Coercion ───────────────────────────────────────────────────────

/// Coerce argument values to their textual representation.
///
/// The tool protocol accepts only string-typed arguments: numbers and
/// booleans are stringified (lowercase `true`/`false`), strings pass
/// through, `null` passes through, and composite values are encoded as
/// compact JSON.
fn coerce_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
    arguments
        .iter()
        .map(|(key, value)| {
            let coerced = match value {
                Value::String(_) | Value::Null => value.clone(),
                Value::Bool(b) => Value::String(b.to_string()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    Value::String(serde_json::to_string(value).unwrap_or_default())
                }
            };
            (key.clone(), coerced)
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
