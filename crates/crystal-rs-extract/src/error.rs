//! Error types for export extraction.

use thiserror::Error;

/// Errors surfaced to callers of the extractor registry.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No extractor is registered for the tag, or the tag is unknown.
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    /// Payload exceeds the configured size limit.
    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: u64, limit: u64 },
    /// Reading the export failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reason a single export item was skipped.
///
/// Never escapes a batch: extractors log it and move on to the next item.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("payload is not valid UTF-8 JSON: {0}")]
    InvalidPayload(String),
    #[error("item is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is malformed: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("no usable messages after filtering")]
    NoMessages,
}
