//! Error types shared across llmcore crates.

use thiserror::Error;

/// Errors raised while loading or validating settings and requests.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// A setting holds a value outside its valid range
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Request payload could not be parsed
    #[error("Invalid request: {0}")]
    Request(#[from] serde_json::Error),
}
