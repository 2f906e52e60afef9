//! Error types for config loading and validation.

use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a config file failed.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// A layer is not valid JSON5.
    #[error("failed to parse config layer {layer}: {source}")]
    ParseFailed {
        layer: String,
        #[source]
        source: json5::Error,
    },
    /// Converting the merged JSON into the config model failed.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A field has the wrong shape or is not part of the schema.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// A well-typed value lies outside its allowed range.
    #[error("config value out of range at {path}: {message}")]
    OutOfRange { path: String, message: String },
}
