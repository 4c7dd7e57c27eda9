//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// HTTP communication error (connection, timeout, malformed body).
    #[error("transport error: {reason}")]
    TransportError {
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The response body was not a usable JSON-RPC message.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        reason: String,
    },
}
