//! Inference and artifact error types.

use thiserror::Error;

/// Errors raised by the shared inference pipeline.
///
/// `VocabularyLoad` and `SessionInit` are startup failures and should abort
/// service construction. The rest are per-call and go back to the caller
/// without any partial output.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Vocabulary or tokenizer file missing or malformed
    #[error("Vocabulary load error: {0}")]
    VocabularyLoad(String),

    /// Graph failed to load, or its exported names do not match the contract
    #[error("Session init error: {0}")]
    SessionInit(String),

    /// An output tensor has an unexpected rank or shape
    #[error("Shape error: {0}")]
    Shape(String),

    /// Input reduced to an empty token sequence
    #[error("Degenerate encoding: {0}")]
    EncodingDegenerate(String),

    /// The execution call itself failed
    #[error("Runtime execution error: {0}")]
    RuntimeExec(String),
}

impl From<candle_core::Error> for InferenceError {
    fn from(e: candle_core::Error) -> Self {
        InferenceError::RuntimeExec(e.to_string())
    }
}

/// Errors raised while resolving artifacts to local files.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No spec registered for the requested key
    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    /// Every mirror failed; carries the last failure
    #[error("Failed to download {artifact}: {reason}")]
    Download { artifact: String, reason: String },

    /// Mirror string could not be parsed
    #[error("Invalid mirror: {0}")]
    InvalidMirror(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
