use crystal_rs_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by conversation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported store schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("store log at line {line} is corrupt: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("rejected conversation: {0}")]
    InvalidConversation(#[from] ProtocolError),
    #[error("store write task failed: {0}")]
    Task(String),
}
