//! LLM client error types.
//!
//! These never cross the orchestrator boundary directly — the turn client
//! classifies every failure into [`TurnOutcome::Failed`] carrying the error
//! text, so the taxonomy here only shapes that message.
//!
//! [`TurnOutcome::Failed`]: super::client::TurnOutcome::Failed

use thiserror::Error;

/// Errors that can occur during a chat completion exchange.
#[derive(Debug, Error)]
pub enum LlmError {
    /// TCP/HTTP connection to the provider failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// Non-2xx HTTP response from the provider.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body was not a usable completion envelope.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
    },
}
