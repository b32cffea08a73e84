//! Generation error types.

use llmcore_runtime::{ArtifactError, InferenceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Tokenizer, session or tensor failure
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Model graph or tokenizer could not be resolved
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
