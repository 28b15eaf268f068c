//! Error types for the agent connection.

use std::io;

/// Errors that can occur while encoding or decoding CODA messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame did not have the expected fields.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A frame exceeded the configured limit before its end marker arrived.
    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("JSON field could not be parsed: {0}")]
    Json(#[source] serde_json::Error),
}

/// A command that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodaError {
    /// The agent answered with an error report.
    #[error("agent error {code}: {message}")]
    Agent { code: i64, message: String },

    /// The reply or event did not carry what the command promised.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// The command never reached the agent.
    #[error("agent connection closed")]
    Disconnected,
}

impl CodaError {
    pub fn unexpected(what: impl Into<String>) -> Self {
        Self::UnexpectedPayload(what.into())
    }
}
