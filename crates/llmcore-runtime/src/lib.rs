//! # llmcore-runtime
//!
//! The shared half of the local inference pipeline:
//!
//! text -> tokenizer -> tensor builder -> inference session -> raw outputs
//!
//! ## Features
//! - WordPiece (embedding path) and whole-word lookup (generation path) tokenizers
//! - Fixed-width embedding batches and sliding-window generation tensors
//! - Sessions bound to validated input/output contracts, runs serialized per session
//! - ONNX graphs via `candle-onnx`, BERT safetensors via `candle-transformers`
//! - Artifact provider with mirror fallback and atomic installs

pub mod artifacts;
pub mod bert;
pub mod error;
pub mod onnx;
pub mod sequence;
pub mod session;
pub mod tensors;
pub mod tokenizer;
pub mod vocab;

pub use artifacts::{
    ArtifactKey, ArtifactKind, ArtifactProvider, ArtifactSpec, DownloadOptions, LocalArtifacts,
    Mirror, MirrorArtifactProvider,
};
pub use bert::BertGraph;
pub use error::{ArtifactError, InferenceError};
pub use onnx::OnnxGraph;
pub use sequence::TokenSequence;
pub use session::{
    Graph, InferenceSession, SessionContract, EMBEDDING_CONTRACT, GENERATION_CONTRACT,
    LAST_HIDDEN_STATE, LOGITS,
};
pub use tensors::{AuxiliaryIds, BatchTensors, NamedTensors};
pub use tokenizer::{LookupTokenizer, TextTokenizer, WordPieceTokenizer};
pub use vocab::{SpecialTokens, Vocabulary};
