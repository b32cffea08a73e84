//! Masked mean pooling over per-token hidden states.

use candle_core::{DType, Tensor};
use llmcore_runtime::{BatchTensors, InferenceError};

use crate::error::EmbeddingError;
use crate::model::Embedding;

/// Average the rows of `hidden` whose mask entry is 1.
///
/// Masked positions are skipped rather than multiplied by zero, so
/// non-finite values at padding positions cannot leak into the result.
/// With no unmasked position the result is the all-zero vector.
pub fn mean_pool(hidden: &[Vec<f32>], mask: &[i64]) -> Vec<f32> {
    let dim = hidden.first().map_or(0, Vec::len);
    let mut sum = vec![0f32; dim];
    let mut count = 0usize;

    for (row, _) in hidden.iter().zip(mask).filter(|&(_, &m)| m == 1) {
        for (acc, &value) in sum.iter_mut().zip(row) {
            *acc += value;
        }
        count += 1;
    }

    if count > 0 {
        let inv = 1.0 / count as f32;
        sum.iter_mut().for_each(|v| *v *= inv);
    }
    sum
}

/// Pool a `(batch, seq, hidden)` tensor into one normalized vector per row.
pub fn pool_hidden_states(
    hidden: &Tensor,
    batch: &BatchTensors,
) -> Result<Vec<Embedding>, EmbeddingError> {
    let (batch_size, seq_len, _) = hidden.dims3().map_err(|_| {
        InferenceError::Shape(format!(
            "expected (batch, sequence, hidden), got {:?}",
            hidden.dims()
        ))
    })?;
    if batch_size != batch.batch_size() || seq_len != batch.width() {
        return Err(InferenceError::Shape(format!(
            "hidden states {:?} do not match input batch ({}, {})",
            hidden.dims(),
            batch.batch_size(),
            batch.width()
        ))
        .into());
    }

    let values: Vec<Vec<Vec<f32>>> = hidden
        .to_dtype(DType::F32)
        .and_then(|t| t.to_vec3())
        .map_err(InferenceError::from)?;

    Ok(values
        .iter()
        .enumerate()
        .map(|(row, tokens)| Embedding::new(mean_pool(tokens, batch.mask_row(row))))
        .collect())
}
