//! # llmcore-embeddings
//!
//! Local text embeddings.
//!
//! ## Features
//! - Model-backed embedder: WordPiece, fixed-width batches, masked mean pooling
//! - ONNX (`candle-onnx`) or BERT safetensors (`candle-transformers`) graphs
//! - Offline hash-bucket fallback with no model download
//! - Unit-length vectors; text with nothing to tokenize embeds to zero on the model path
//!
//! ## Usage
//! ```rust,ignore
//! use llmcore_embeddings::{build_embedder, EmbeddingModel};
//!
//! let embedder = build_embedder(&settings.embeddings, &provider)?;
//! let embedding = embedder.embed("Hello, world!")?;
//! ```

pub mod backend;
pub mod embedder;
pub mod error;
pub mod hash;
pub mod model;
pub mod pooling;

pub use backend::{artifact_keys, build_embedder, register_artifacts};
pub use embedder::SessionEmbedder;
pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use model::{Embedding, EmbeddingBatch, EmbeddingModel, ModelInfo};
pub use pooling::{mean_pool, pool_hidden_states};
