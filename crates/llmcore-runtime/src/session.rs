//! Inference sessions over loaded graphs.
//!
//! A session binds a [`Graph`] to a fixed input/output contract. Names are
//! checked once in [`InferenceSession::open`]; a graph that does not export
//! the declared names fails there and is never silently remapped. Runs are
//! serialized through an internal lock, so one session can be shared by
//! every request handler of a service.

use std::collections::HashMap;
use std::sync::Mutex;

use candle_core::Tensor;
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::tensors::{
    NamedTensors, ATTENTION_MASK, INPUT_IDS, POSITION_IDS, TOKEN_TYPE_IDS,
};

/// Embedding graph output: per-token hidden states `(batch, seq, hidden)`.
pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";
/// Generation graph output: next-token scores `(1, seq, vocab)`.
pub const LOGITS: &str = "logits";

/// Declared input and output names of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContract {
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

pub const EMBEDDING_CONTRACT: SessionContract = SessionContract {
    inputs: &[INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS],
    outputs: &[LAST_HIDDEN_STATE],
};

pub const GENERATION_CONTRACT: SessionContract = SessionContract {
    inputs: &[INPUT_IDS, ATTENTION_MASK, POSITION_IDS],
    outputs: &[LOGITS],
};

/// An executable computational graph.
///
/// Implementations are read-only after loading.
pub trait Graph: Send + Sync {
    /// Names of the inputs the graph consumes.
    fn input_names(&self) -> Vec<String>;

    /// Names of the outputs the graph produces.
    fn output_names(&self) -> Vec<String>;

    /// Run a forward pass.
    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors>;
}

/// A graph bound to a validated contract.
pub struct InferenceSession {
    graph: Box<dyn Graph>,
    contract: SessionContract,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

impl InferenceSession {
    /// Bind `graph` to `contract`, failing if any declared name is missing.
    pub fn open(graph: Box<dyn Graph>, contract: SessionContract) -> Result<Self, InferenceError> {
        let graph_inputs = graph.input_names();
        let graph_outputs = graph.output_names();

        let missing_inputs: Vec<&str> = contract
            .inputs
            .iter()
            .copied()
            .filter(|name| !graph_inputs.iter().any(|g| g == name))
            .collect();
        if !missing_inputs.is_empty() {
            return Err(InferenceError::SessionInit(format!(
                "graph inputs {graph_inputs:?} lack declared {missing_inputs:?}"
            )));
        }

        let missing_outputs: Vec<&str> = contract
            .outputs
            .iter()
            .copied()
            .filter(|name| !graph_outputs.iter().any(|g| g == name))
            .collect();
        if !missing_outputs.is_empty() {
            return Err(InferenceError::SessionInit(format!(
                "graph outputs {graph_outputs:?} lack declared {missing_outputs:?}"
            )));
        }

        info!(
            inputs = ?contract.inputs,
            outputs = ?contract.outputs,
            "Inference session opened"
        );

        Ok(Self {
            graph,
            contract,
            run_lock: Mutex::new(()),
        })
    }

    pub fn contract(&self) -> SessionContract {
        self.contract
    }

    /// Execute one forward pass and return exactly the declared outputs.
    pub fn run(&self, mut inputs: NamedTensors) -> Result<NamedTensors, InferenceError> {
        let mut declared = HashMap::with_capacity(self.contract.inputs.len());
        for &name in self.contract.inputs {
            let tensor = inputs.remove(name).ok_or_else(|| {
                InferenceError::RuntimeExec(format!("missing input tensor {name}"))
            })?;
            declared.insert(name.to_string(), tensor);
        }

        let mut outputs = {
            let _guard = self
                .run_lock
                .lock()
                .map_err(|_| InferenceError::RuntimeExec("session lock poisoned".to_string()))?;
            self.graph.run(declared)?
        };

        let mut result = HashMap::with_capacity(self.contract.outputs.len());
        for &name in self.contract.outputs {
            let tensor: Tensor = outputs.remove(name).ok_or_else(|| {
                InferenceError::RuntimeExec(format!("graph did not produce output {name}"))
            })?;
            debug!(output = name, shape = ?tensor.dims(), "Session output");
            result.insert(name.to_string(), tensor);
        }
        Ok(result)
    }

    /// Run and take the single declared output `name`.
    pub fn run_single(&self, inputs: NamedTensors, name: &str) -> Result<Tensor, InferenceError> {
        self.run(inputs)?.remove(name).ok_or_else(|| {
            InferenceError::RuntimeExec(format!("output {name} is not part of the contract"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    struct StubGraph {
        inputs: Vec<&'static str>,
        outputs: Vec<&'static str>,
        fail: bool,
    }

    impl Graph for StubGraph {
        fn input_names(&self) -> Vec<String> {
            self.inputs.iter().map(|s| s.to_string()).collect()
        }

        fn output_names(&self) -> Vec<String> {
            self.outputs.iter().map(|s| s.to_string()).collect()
        }

        fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
            if self.fail {
                candle_core::bail!("stub failure");
            }
            let ids = &inputs[INPUT_IDS];
            let (b, s) = ids.dims2()?;
            let mut out = HashMap::new();
            for name in &self.outputs {
                out.insert(name.to_string(), Tensor::ones((b, s, 2), DType::F32, &Device::Cpu)?);
            }
            out.insert("extra".to_string(), Tensor::zeros(1, DType::F32, &Device::Cpu)?);
            Ok(out)
        }
    }

    fn embedding_graph() -> Box<dyn Graph> {
        Box::new(StubGraph {
            inputs: vec![INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS],
            outputs: vec![LAST_HIDDEN_STATE],
            fail: false,
        })
    }

    fn inputs(names: &[&str]) -> NamedTensors {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    Tensor::zeros((1, 3), DType::I64, &Device::Cpu).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_open_validates_names() {
        assert!(InferenceSession::open(embedding_graph(), EMBEDDING_CONTRACT).is_ok());

        let err = InferenceSession::open(embedding_graph(), GENERATION_CONTRACT).unwrap_err();
        assert!(matches!(err, InferenceError::SessionInit(ref m) if m.contains("position_ids")));
    }

    #[test]
    fn test_open_rejects_missing_output() {
        let graph = Box::new(StubGraph {
            inputs: vec![INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS],
            outputs: vec!["pooler_output"],
            fail: false,
        });
        let err = InferenceSession::open(graph, EMBEDDING_CONTRACT).unwrap_err();
        assert!(matches!(err, InferenceError::SessionInit(_)));
    }

    #[test]
    fn test_run_returns_declared_outputs_only() {
        let session = InferenceSession::open(embedding_graph(), EMBEDDING_CONTRACT).unwrap();
        let outputs = session.run(inputs(EMBEDDING_CONTRACT.inputs)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[LAST_HIDDEN_STATE].dims(), &[1, 3, 2]);
    }

    #[test]
    fn test_run_requires_declared_inputs() {
        let session = InferenceSession::open(embedding_graph(), EMBEDDING_CONTRACT).unwrap();
        let err = session.run(inputs(&[INPUT_IDS])).unwrap_err();
        assert!(matches!(err, InferenceError::RuntimeExec(_)));
    }

    #[test]
    fn test_graph_failure_is_runtime_error() {
        let graph = Box::new(StubGraph {
            inputs: vec![INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS],
            outputs: vec![LAST_HIDDEN_STATE],
            fail: true,
        });
        let session = InferenceSession::open(graph, EMBEDDING_CONTRACT).unwrap();
        let err = session
            .run_single(inputs(EMBEDDING_CONTRACT.inputs), LAST_HIDDEN_STATE)
            .unwrap_err();
        assert!(matches!(err, InferenceError::RuntimeExec(ref m) if m.contains("stub failure")));
    }
}
