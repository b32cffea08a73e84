//! ONNX graphs evaluated in-process through `candle-onnx`.

use std::collections::HashSet;
use std::path::Path;

use candle_onnx::onnx::ModelProto;
use tracing::info;

use crate::error::InferenceError;
use crate::session::Graph;
use crate::tensors::NamedTensors;

/// A loaded `.onnx` model.
pub struct OnnxGraph {
    model: ModelProto,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl OnnxGraph {
    /// Read and index an ONNX model file.
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let model = candle_onnx::read_file(path)
            .map_err(|e| InferenceError::SessionInit(format!("{}: {}", path.display(), e)))?;
        let graph = Self::from_model(model).map_err(|e| match e {
            InferenceError::SessionInit(msg) => {
                InferenceError::SessionInit(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        info!(
            path = %path.display(),
            inputs = ?graph.inputs,
            outputs = ?graph.outputs,
            "Loaded ONNX graph"
        );
        Ok(graph)
    }

    /// Index an already decoded model.
    pub fn from_model(model: ModelProto) -> Result<Self, InferenceError> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| InferenceError::SessionInit("model has no graph".to_string()))?;

        // Initializers may also be listed as graph inputs; they are weights,
        // not feeds.
        let initializers: HashSet<&str> =
            graph.initializer.iter().map(|t| t.name.as_str()).collect();
        let inputs: Vec<String> = graph
            .input
            .iter()
            .map(|v| v.name.clone())
            .filter(|name| !initializers.contains(name.as_str()))
            .collect();
        let outputs: Vec<String> = graph.output.iter().map(|v| v.name.clone()).collect();

        Ok(Self {
            model,
            inputs,
            outputs,
        })
    }
}

impl Graph for OnnxGraph {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        candle_onnx::simple_eval(&self.model, inputs)
    }
}
