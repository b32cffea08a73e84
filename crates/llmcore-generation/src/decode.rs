//! Greedy next-token selection.

use candle_core::{DType, IndexOp, Tensor};
use llmcore_runtime::InferenceError;

/// Index of the largest value; ties go to the lowest index. NaN is skipped.
pub fn argmax(values: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index as u32)
}

/// Logits at the last sequence position of a `(1, sequence, vocab)` tensor.
pub fn last_position_logits(logits: &Tensor) -> Result<Vec<f32>, InferenceError> {
    let (batch, sequence, vocab) = logits.dims3().map_err(|_| {
        InferenceError::Shape(format!(
            "logits must have rank 3 (batch, sequence, vocab), got {:?}",
            logits.dims()
        ))
    })?;
    if batch != 1 {
        return Err(InferenceError::Shape(format!(
            "generation expects batch size 1, got {batch}"
        )));
    }
    if sequence == 0 || vocab == 0 {
        return Err(InferenceError::Shape(format!(
            "logits have an empty axis: {:?}",
            logits.dims()
        )));
    }

    Ok(logits
        .i((0, sequence - 1))?
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()?)
}

/// Greedy choice from a logits tensor.
pub fn select_next(logits: &Tensor) -> Result<u32, InferenceError> {
    let row = last_position_logits(logits)?;
    argmax(&row).ok_or_else(|| {
        InferenceError::Shape(format!(
            "logits row has no comparable values: all {} entries are NaN",
            row.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Some(1));
        assert_eq!(argmax(&[3.0]), Some(0));
        assert_eq!(argmax(&[-1.0, -0.5, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ignores_nan() {
        assert_eq!(argmax(&[f32::NAN, 1.0, 0.5]), Some(1));
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_all_nan_row_is_not_reported_as_empty() {
        let logits = Tensor::from_vec(vec![f32::NAN; 3], (1, 1, 3), &Device::Cpu).unwrap();
        match select_next(&logits) {
            Err(InferenceError::Shape(message)) => {
                assert!(message.contains("NaN"), "{message}");
                assert!(!message.contains("empty"), "{message}");
            }
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_last_position_row() {
        let data: Vec<f32> = vec![
            9.0, 0.0, 0.0, // position 0 prefers id 0
            0.0, 0.0, 5.0, // position 1 prefers id 2
        ];
        let logits = Tensor::from_vec(data, (1, 2, 3), &Device::Cpu).unwrap();
        assert_eq!(last_position_logits(&logits).unwrap(), vec![0.0, 0.0, 5.0]);
        assert_eq!(select_next(&logits).unwrap(), 2);
    }

    #[test]
    fn test_rank_and_batch_checked() {
        let rank2 = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            last_position_logits(&rank2),
            Err(InferenceError::Shape(_))
        ));

        let batch2 = Tensor::zeros((2, 1, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            last_position_logits(&batch2),
            Err(InferenceError::Shape(_))
        ));
    }
}
