//! Hash-bucket fallback embedder.
//!
//! Deterministic, offline and model-free: lower-cased letter runs and digit
//! runs are hashed (FNV-1a) into signed buckets and the result is L2
//! normalized. Unlike the session-backed embedder, degenerate input never
//! yields the zero vector; it lands in the bucket of the empty string.

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Letter,
    Digit,
}

fn char_class(c: char) -> Option<CharClass> {
    if c.is_alphabetic() {
        Some(CharClass::Letter)
    } else if c.is_numeric() {
        Some(CharClass::Digit)
    } else {
        None
    }
}

/// Lower-cased maximal runs of letters, and of digits, in order.
fn feature_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_class = None;

    for c in text.to_lowercase().chars() {
        let class = char_class(c);
        if class != current_class && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if class.is_some() {
            current.push(c);
        }
        current_class = class;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(name: impl Into<String>, dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "hash embedding dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            info: ModelInfo {
                name: name.into(),
                dimension,
                max_sequence_length: usize::MAX,
            },
        })
    }

    fn bucket(&self, token: &str) -> usize {
        (fnv1a(token.as_bytes()) % self.info.dimension as u32) as usize
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut values = vec![0f32; self.info.dimension];
        let tokens = feature_tokens(text);

        if tokens.is_empty() {
            values[self.bucket("")] = 1.0;
            return Embedding::from_normalized(values);
        }

        for token in &tokens {
            let sign = if fnv1a(format!("{token}_alt").as_bytes()) & 1 == 1 {
                -1.0
            } else {
                1.0
            };
            values[self.bucket(token)] += sign;
        }

        let embedding = Embedding::new(values);
        if embedding.is_zero() {
            // Signed collisions cancelled out; fall back to the degenerate bucket.
            let mut values = vec![0f32; self.info.dimension];
            values[self.bucket("")] = 1.0;
            return Embedding::from_normalized(values);
        }
        embedding
    }
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
