//! Model-ready integer tensors.
//!
//! Two layouts are built here:
//! - embedding batches: fixed width, right-padded or right-truncated, with
//!   all-zero token type ids
//! - generation steps: batch of one, width = live sequence length, all-ones
//!   mask, position ids `0..width`
//!
//! Position ids are recomputed from the current window on every step, so
//! position 0 is always the oldest retained token rather than the absolute
//! step count since generation began.

use std::collections::HashMap;

use candle_core::{Device, Tensor};

use crate::error::InferenceError;
use crate::sequence::TokenSequence;

/// Named input tensors for a session run.
pub type NamedTensors = HashMap<String, Tensor>;

pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";
pub const POSITION_IDS: &str = "position_ids";

/// The third input tensor, which differs between the two paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxiliaryIds {
    /// Segment ids, all zero
    TokenTypes(Vec<i64>),
    /// Positions within the current window
    Positions(Vec<i64>),
}

impl AuxiliaryIds {
    pub fn input_name(&self) -> &'static str {
        match self {
            Self::TokenTypes(_) => TOKEN_TYPE_IDS,
            Self::Positions(_) => POSITION_IDS,
        }
    }

    pub fn values(&self) -> &[i64] {
        match self {
            Self::TokenTypes(v) | Self::Positions(v) => v,
        }
    }
}

/// A rectangular batch of token sequences, stored row-major.
#[derive(Debug, Clone)]
pub struct BatchTensors {
    batch_size: usize,
    width: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    auxiliary: AuxiliaryIds,
}

impl BatchTensors {
    /// Embedding layout: every row is padded with `pad_id` (mask 0) or
    /// truncated on the right to exactly `width`.
    pub fn embedding(
        sequences: &[TokenSequence],
        width: usize,
        pad_id: u32,
    ) -> Result<Self, InferenceError> {
        if width == 0 {
            return Err(InferenceError::EncodingDegenerate(
                "embedding batch width must be > 0".to_string(),
            ));
        }

        let batch_size = sequences.len();
        let mut input_ids = vec![i64::from(pad_id); batch_size * width];
        let mut attention_mask = vec![0i64; batch_size * width];

        for (row, sequence) in sequences.iter().enumerate() {
            let start = row * width;
            for (col, &id) in sequence.ids().iter().take(width).enumerate() {
                input_ids[start + col] = i64::from(id);
                attention_mask[start + col] = 1;
            }
        }

        Ok(Self {
            batch_size,
            width,
            input_ids,
            attention_mask,
            auxiliary: AuxiliaryIds::TokenTypes(vec![0; batch_size * width]),
        })
    }

    /// Generation layout for the current window.
    pub fn generation(sequence: &TokenSequence) -> Result<Self, InferenceError> {
        if sequence.is_empty() {
            return Err(InferenceError::EncodingDegenerate(
                "generation window is empty".to_string(),
            ));
        }

        let width = sequence.len();
        Ok(Self {
            batch_size: 1,
            width,
            input_ids: sequence.ids().iter().map(|&id| i64::from(id)).collect(),
            attention_mask: vec![1; width],
            auxiliary: AuxiliaryIds::Positions((0..width as i64).collect()),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn input_ids(&self) -> &[i64] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[i64] {
        &self.attention_mask
    }

    pub fn auxiliary(&self) -> &AuxiliaryIds {
        &self.auxiliary
    }

    /// Attention mask of one batch row.
    pub fn mask_row(&self, row: usize) -> &[i64] {
        &self.attention_mask[row * self.width..(row + 1) * self.width]
    }

    /// Convert into `(batch, width)` i64 tensors keyed by input name.
    pub fn to_named_tensors(&self, device: &Device) -> Result<NamedTensors, InferenceError> {
        let shape = (self.batch_size, self.width);
        let mut named = HashMap::with_capacity(3);
        named.insert(
            INPUT_IDS.to_string(),
            Tensor::from_slice(&self.input_ids, shape, device)?,
        );
        named.insert(
            ATTENTION_MASK.to_string(),
            Tensor::from_slice(&self.attention_mask, shape, device)?,
        );
        named.insert(
            self.auxiliary.input_name().to_string(),
            Tensor::from_slice(self.auxiliary.values(), shape, device)?,
        );
        Ok(named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_pads_to_fixed_width() {
        let seqs = vec![TokenSequence::new(vec![101, 7, 102])];
        let batch = BatchTensors::embedding(&seqs, 5, 0).unwrap();

        assert_eq!(batch.batch_size(), 1);
        assert_eq!(batch.width(), 5);
        assert_eq!(batch.input_ids(), &[101, 7, 102, 0, 0]);
        assert_eq!(batch.attention_mask(), &[1, 1, 1, 0, 0]);
        assert_eq!(batch.auxiliary(), &AuxiliaryIds::TokenTypes(vec![0; 5]));
    }

    #[test]
    fn test_embedding_truncates_long_rows() {
        let seqs = vec![
            TokenSequence::new((1..=10).collect()),
            TokenSequence::new(vec![4]),
        ];
        let batch = BatchTensors::embedding(&seqs, 4, 9).unwrap();

        assert_eq!(batch.input_ids(), &[1, 2, 3, 4, 4, 9, 9, 9]);
        assert_eq!(batch.mask_row(0), &[1, 1, 1, 1]);
        assert_eq!(batch.mask_row(1), &[1, 0, 0, 0]);
    }

    #[test]
    fn test_embedding_empty_row_fully_masked() {
        let seqs = vec![TokenSequence::empty()];
        let batch = BatchTensors::embedding(&seqs, 3, 0).unwrap();
        assert_eq!(batch.mask_row(0), &[0, 0, 0]);
    }

    #[test]
    fn test_embedding_zero_width_rejected() {
        let err = BatchTensors::embedding(&[], 0, 0).unwrap_err();
        assert!(matches!(err, InferenceError::EncodingDegenerate(_)));
    }

    #[test]
    fn test_generation_layout() {
        let seq = TokenSequence::new(vec![5, 6, 7]);
        let batch = BatchTensors::generation(&seq).unwrap();

        assert_eq!(batch.batch_size(), 1);
        assert_eq!(batch.width(), 3);
        assert_eq!(batch.input_ids(), &[5, 6, 7]);
        assert_eq!(batch.attention_mask(), &[1, 1, 1]);
        assert_eq!(batch.auxiliary(), &AuxiliaryIds::Positions(vec![0, 1, 2]));
        assert_eq!(batch.auxiliary().input_name(), POSITION_IDS);
    }

    #[test]
    fn test_generation_empty_window_rejected() {
        let err = BatchTensors::generation(&TokenSequence::empty()).unwrap_err();
        assert!(matches!(err, InferenceError::EncodingDegenerate(_)));
    }

    #[test]
    fn test_named_tensors_shapes() {
        let seqs = vec![TokenSequence::new(vec![1, 2]), TokenSequence::new(vec![3])];
        let batch = BatchTensors::embedding(&seqs, 4, 0).unwrap();
        let named = batch.to_named_tensors(&Device::Cpu).unwrap();

        assert_eq!(named.len(), 3);
        for name in [INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS] {
            assert_eq!(named[name].dims(), &[2, 4]);
        }
        let ids: Vec<Vec<i64>> = named[INPUT_IDS].to_vec2().unwrap();
        assert_eq!(ids, vec![vec![1, 2, 0, 0], vec![3, 0, 0, 0]]);
    }
}
