//! Embedding model trait and types.
//!
//! Defines the interface for generating vector embeddings from text.

use llmcore_types::EmbedInput;

use crate::error::EmbeddingError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector (unit length, or all zero for degenerate input)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length; an all-zero vector stays zero.
    pub fn new(values: Vec<f32>) -> Self {
        let mut embedding = Self { values };
        let norm = embedding.norm();
        if norm > 0.0 {
            embedding.values.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean norm; 1.0 for pooled vectors with nonzero magnitude.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&x| x == 0.0)
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        // Since both are normalized, dot product = cosine similarity
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Vectors for one request plus the name of the model that produced them.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Embedding>,
    pub model: String,
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Trait for embedding models.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate embeddings for multiple texts, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidInput("model returned no vector".to_string()))
    }

    /// Generate embeddings for multiple owned strings.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed_batch(&refs)
    }

    /// Embed a transport request, tagging the result with the model name.
    fn embed_input(&self, input: EmbedInput) -> Result<EmbeddingBatch, EmbeddingError> {
        let texts = input.into_texts();
        let vectors = self.embed_texts(&texts)?;
        Ok(EmbeddingBatch {
            vectors,
            model: self.info().name.clone(),
        })
    }
}
