//! JSON-RPC over HTTP transport.
//!
//! Handles the wire-level exchange with the MCP server:
//! - POSTing JSON-RPC requests and notifications to the server URL
//! - Credential, protocol-version, and session headers
//! - Monotonic request-id allocation (ids are never reused within a session)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Client as HttpClient;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// MCP protocol revision spoken by this client.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Session header, established by the server on `initialize` and echoed on
/// every subsequent request.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Remote tool execution can be slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Transport ───────────────────────────────────────────────────────────────

/// JSON-RPC 2.0 transport over HTTP POST.
///
/// One request is in flight at a time per caller, but ids are allocated from
/// an atomic counter so responses stay correlatable even on a pipelined
/// transport.
pub struct HttpTransport {
    http: HttpClient,
    url: String,
    api_host: String,
    api_key: String,
    /// Session id captured from the server's initialize response.
    session_id: Mutex<Option<String>>,
    /// Next JSON-RPC request id. Starts at 1, strictly increasing.
    next_request_id: AtomicU64,
}

impl HttpTransport {
    /// Create a new transport targeting the given server URL.
    pub fn new(url: &str, api_host: &str, api_key: &str) -> Result<Self, McpError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| McpError::TransportError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            url: url.to_string(),
            api_host: api_host.to_string(),
            api_key: api_key.to_string(),
            session_id: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Send a JSON-RPC request and parse the response envelope.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.allocate_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        tracing::debug!(method, id, "sending MCP request");

        let response = self
            .post(&req)
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("request failed: {e}"),
            })?;

        self.capture_session(response.headers());

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("failed to read response body: {e}"),
            })?;

        serde_json::from_str::<JsonRpcResponse>(&body).map_err(|e| {
            if status.is_success() {
                McpError::InvalidResponse {
                    reason: format!("malformed JSON-RPC response: {e}"),
                }
            } else {
                McpError::TransportError {
                    reason: format!("HTTP {status}: {body}"),
                }
            }
        })
    }

    /// Send a JSON-RPC notification (no id, no response expected).
    pub async fn notify(&self, method: &str) -> Result<(), McpError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });

        tracing::debug!(method, "sending MCP notification");

        let response = self
            .post(&body)
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("notification failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::TransportError {
                reason: format!("notification rejected with HTTP {status}"),
            });
        }

        Ok(())
    }

    /// Forget the established session id.
    pub fn clear_session(&self) {
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn post<T: serde::Serialize>(
        &self,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http
            .post(&self.url)
            .header("x-api-host", &self.api_host)
            .header("x-api-key", &self.api_key)
            .header("MCP-Protocol-Version", PROTOCOL_VERSION)
            .json(body);

        let session = self
            .session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(sid) = session {
            request = request.header(SESSION_HEADER, sid);
        }

        request.send().await
    }

    /// Store the session id from a response, if the server issued one.
    fn capture_session(&self, headers: &HeaderMap) {
        if let Some(sid) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            let mut session = self.session_id.lock().unwrap_or_else(|e| e.into_inner());
            if session.as_deref() != Some(sid) {
                tracing::debug!(session_id = sid, "MCP session established");
                *session = Some(sid.to_string());
            }
        }
    }

    fn allocate_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::InvalidResponse {
        reason: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
