//! Embedding error types.

use llmcore_runtime::{ArtifactError, InferenceError};
use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Tokenizer, session or tensor failure
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Model or vocabulary could not be resolved
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
