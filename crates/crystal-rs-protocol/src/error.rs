//! Error types for canonical model validation.

use thiserror::Error;

/// Errors raised when data violates the canonical model.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Source tag outside the closed set of providers.
    #[error("unknown conversation source: {0}")]
    UnknownSource(String),
    /// Role outside the closed set of message roles.
    #[error("unknown message role: {0}")]
    UnknownRole(String),
    /// Stage name outside the pipeline state machine.
    #[error("unknown pipeline stage: {0}")]
    UnknownStage(String),
    /// Conversation breaks a structural invariant.
    #[error("invalid conversation {id}: {reason}")]
    InvalidConversation { id: String, reason: String },
    /// Compression settings are out of range.
    #[error("invalid compression config: {0}")]
    InvalidConfig(String),
}
