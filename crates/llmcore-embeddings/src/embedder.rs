//! Session-backed embedder.
//!
//! WordPiece encoding, fixed-width batches, one session run per batch, then
//! masked mean pooling and L2 normalization. Text without any letter or
//! digit becomes a fully masked row and therefore the all-zero vector.

use std::sync::Arc;

use candle_core::Device;
use llmcore_runtime::{
    BatchTensors, InferenceError, InferenceSession, TextTokenizer, TokenSequence,
    WordPieceTokenizer, EMBEDDING_CONTRACT, LAST_HIDDEN_STATE,
};
use tracing::debug;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};
use crate::pooling::pool_hidden_states;

/// Embedder over a shared inference session.
pub struct SessionEmbedder {
    session: Arc<InferenceSession>,
    tokenizer: WordPieceTokenizer,
    device: Device,
    info: ModelInfo,
}

impl SessionEmbedder {
    /// Wrap an opened session; it must be bound to the embedding contract.
    pub fn new(
        session: Arc<InferenceSession>,
        tokenizer: WordPieceTokenizer,
        name: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        if session.contract() != EMBEDDING_CONTRACT {
            return Err(InferenceError::SessionInit(format!(
                "embedding requires contract {:?}, session has {:?}",
                EMBEDDING_CONTRACT,
                session.contract()
            ))
            .into());
        }

        let info = ModelInfo {
            name: name.into(),
            dimension,
            max_sequence_length: tokenizer.max_length(),
        };

        Ok(Self {
            session,
            tokenizer,
            device: Device::Cpu,
            info,
        })
    }

    pub fn tokenizer(&self) -> &WordPieceTokenizer {
        &self.tokenizer
    }

    /// Token row for one text: `[CLS] pieces [SEP]`, or empty when the text
    /// has nothing to tokenize.
    fn encode_row(&self, text: &str) -> TokenSequence {
        let pieces = self.tokenizer.pieces(text);
        if pieces.is_empty() {
            TokenSequence::empty()
        } else {
            self.tokenizer.wrap(&pieces)
        }
    }
}

impl EmbeddingModel for SessionEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = texts.len(), "Embedding batch");

        let rows: Vec<TokenSequence> = texts.iter().map(|text| self.encode_row(text)).collect();
        let pad = self.tokenizer.vocabulary().specials().pad;
        let batch = BatchTensors::embedding(&rows, self.tokenizer.max_length(), pad)?;

        let inputs = batch.to_named_tensors(&self.device)?;
        let hidden = self.session.run_single(inputs, LAST_HIDDEN_STATE)?;

        let (_, _, hidden_dim) = hidden.dims3().map_err(|_| {
            InferenceError::Shape(format!(
                "{LAST_HIDDEN_STATE} must have rank 3 (batch, sequence, hidden), got {:?}",
                hidden.dims()
            ))
        })?;
        if hidden_dim != self.info.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.info.dimension,
                actual: hidden_dim,
            });
        }

        let embeddings = pool_hidden_states(&hidden, &batch)?;

        debug!(
            count = embeddings.len(),
            dim = self.info.dimension,
            "Batch complete"
        );

        Ok(embeddings)
    }
}
