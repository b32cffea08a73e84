//! BERT encoders loaded from safetensors weights.
//!
//! Exposes a sentence-transformers checkpoint (`config.json` +
//! `model.safetensors`) under the embedding contract, so it can be served by
//! the same session and pooling code as an ONNX export.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tracing::info;

use crate::error::InferenceError;
use crate::session::{Graph, EMBEDDING_CONTRACT, LAST_HIDDEN_STATE};
use crate::tensors::{NamedTensors, ATTENTION_MASK, INPUT_IDS, TOKEN_TYPE_IDS};

pub struct BertGraph {
    model: BertModel,
    hidden_size: usize,
}

impl BertGraph {
    /// Load from explicit file paths
    pub fn from_files(config_path: &Path, weights_path: &Path) -> Result<Self, InferenceError> {
        // Use CPU device (GPU support can be added later with feature flags)
        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path).map_err(|e| {
            InferenceError::SessionInit(format!("{}: {}", config_path.display(), e))
        })?;
        let config: BertConfig = serde_json::from_str(&config_str).map_err(|e| {
            InferenceError::SessionInit(format!("Invalid config {}: {}", config_path.display(), e))
        })?;

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)
        }
        .map_err(|e| InferenceError::SessionInit(format!("{}: {}", weights_path.display(), e)))?;

        let model = BertModel::load(vb, &config)
            .map_err(|e| InferenceError::SessionInit(format!("BERT load failed: {}", e)))?;

        info!(hidden = config.hidden_size, "BERT graph loaded");

        Ok(Self {
            model,
            hidden_size: config.hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

impl Graph for BertGraph {
    fn input_names(&self) -> Vec<String> {
        EMBEDDING_CONTRACT
            .inputs
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn output_names(&self) -> Vec<String> {
        vec![LAST_HIDDEN_STATE.to_string()]
    }

    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        let get = |name: &str| {
            inputs
                .get(name)
                .ok_or_else(|| candle_core::Error::Msg(format!("missing input {name}")))
        };
        let input_ids = get(INPUT_IDS)?;
        let attention_mask = get(ATTENTION_MASK)?;
        let token_type_ids = get(TOKEN_TYPE_IDS)?;

        let hidden = self
            .model
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        Ok(HashMap::from([(LAST_HIDDEN_STATE.to_string(), hidden)]))
    }
}
