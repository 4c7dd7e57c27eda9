//! LLM Turn Client — OpenAI-compatible chat completions with tool calling.
//!
//! One `turn` is one request/response exchange: the full conversation and
//! the current tool catalogue go in, and the reply is classified into final
//! text, requested tool calls, or a failure. The orchestrator consumes the
//! client through the [`TurnClient`] trait.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{LlmClient, TurnClient, TurnOutcome};
pub use errors::LlmError;
