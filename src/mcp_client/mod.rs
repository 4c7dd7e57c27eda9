//! MCP Client — JSON-RPC 2.0 over HTTP to the remote tool server.
//!
//! This module handles:
//! - The `initialize` handshake and session bookkeeping
//! - Tool discovery via `tools/list` (cached for the client's lifetime)
//! - Tool execution via `tools/call` with textual argument coercion
//! - Credential, protocol-version, and session headers on every exchange
//!
//! The orchestrator consumes the client through the [`ToolServer`] trait so
//! the loop can be exercised against stubs in tests.

pub mod client;
pub mod errors;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{McpClient, ToolServer};
pub use errors::McpError;
pub use types::{McpContent, McpTool, McpToolResult};
