//! Greedy autoregressive generation over a sliding token window.
//!
//! Every step re-runs the full forward pass over the live window; there is
//! no key/value cache. Position ids restart at 0 for the oldest retained
//! token, so once the window slides they no longer match absolute steps.

use std::sync::Arc;

use candle_core::Device;
use llmcore_runtime::{
    ArtifactKey, ArtifactKind, ArtifactProvider, ArtifactSpec, BatchTensors, InferenceError,
    InferenceSession, LookupTokenizer, MirrorArtifactProvider, OnnxGraph, TextTokenizer,
    GENERATION_CONTRACT, LOGITS,
};
use llmcore_types::GenerationSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::decode::select_next;
use crate::error::GenerationError;
use crate::state::{Completion, FinishReason, GenerationState};

pub const GRAPH_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Artifact keys a generator needs.
pub fn artifact_keys(settings: &GenerationSettings) -> Vec<ArtifactKey> {
    vec![
        ArtifactKey::new(&settings.model_name, ArtifactKind::Graph),
        ArtifactKey::new(&settings.model_name, ArtifactKind::Vocabulary),
    ]
}

pub fn register_artifacts(
    provider: &mut MirrorArtifactProvider,
    settings: &GenerationSettings,
) -> Result<(), GenerationError> {
    provider.register(
        ArtifactKey::new(&settings.model_name, ArtifactKind::Graph),
        ArtifactSpec::parse(GRAPH_FILE, &settings.graph_mirrors)?,
    );
    provider.register(
        ArtifactKey::new(&settings.model_name, ArtifactKind::Vocabulary),
        ArtifactSpec::parse(TOKENIZER_FILE, &settings.tokenizer_mirrors)?,
    );
    Ok(())
}

/// Text generator over one shared session.
pub struct Generator {
    session: Arc<InferenceSession>,
    tokenizer: LookupTokenizer,
    max_context: usize,
    model: String,
    device: Device,
}

impl Generator {
    pub fn new(
        session: Arc<InferenceSession>,
        tokenizer: LookupTokenizer,
        model: impl Into<String>,
        max_context: usize,
    ) -> Result<Self, GenerationError> {
        if session.contract() != GENERATION_CONTRACT {
            return Err(InferenceError::SessionInit(format!(
                "generation requires contract {:?}, session has {:?}",
                GENERATION_CONTRACT,
                session.contract()
            ))
            .into());
        }
        if max_context == 0 {
            return Err(GenerationError::InvalidInput(
                "max_context must be > 0".to_string(),
            ));
        }

        let model = model.into();
        if tokenizer.end_of_sequence().is_none() {
            info!(model = %model, "No end-of-sequence token; generation stops on budget only");
        }

        Ok(Self {
            session,
            tokenizer,
            max_context,
            model,
            device: Device::Cpu,
        })
    }

    /// Load the ONNX graph and tokenizer through `provider`.
    pub fn load(
        provider: &dyn ArtifactProvider,
        settings: &GenerationSettings,
    ) -> Result<Self, GenerationError> {
        let model = settings.model_name.as_str();
        let graph_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::Graph))?;
        let tokenizer_path =
            provider.resolve(&ArtifactKey::new(model, ArtifactKind::Vocabulary))?;

        info!(model, path = %graph_path.display(), "Loading generation graph");

        let graph = OnnxGraph::from_file(&graph_path)?;
        let session = InferenceSession::open(Box::new(graph), GENERATION_CONTRACT)?;
        let tokenizer = LookupTokenizer::from_file(&tokenizer_path)?;

        Self::new(Arc::new(session), tokenizer, model, settings.max_context)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_context(&self) -> usize {
        self.max_context
    }

    pub fn tokenizer(&self) -> &LookupTokenizer {
        &self.tokenizer
    }

    /// Generate up to `max_tokens` tokens after `prompt`.
    pub fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<Completion, GenerationError> {
        self.run(prompt, max_tokens, cancel, &mut |_: &str| {})
    }

    /// Like [`Generator::generate`], calling `on_partial` with the full
    /// decoded window after every step except the end-of-sequence step.
    pub fn generate_streaming(
        &self,
        prompt: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
        on_partial: &mut dyn FnMut(&str),
    ) -> Result<Completion, GenerationError> {
        self.run(prompt, max_tokens, cancel, on_partial)
    }

    fn run(
        &self,
        prompt: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
        on_partial: &mut dyn FnMut(&str),
    ) -> Result<Completion, GenerationError> {
        if max_tokens == 0 {
            return Ok(Completion {
                text: String::new(),
                steps: 0,
                finish: FinishReason::Empty,
            });
        }

        let mut state = GenerationState::new(self.tokenizer.encode(prompt), self.max_context);
        state.set_text(self.tokenizer.decode(state.sequence().ids()));

        debug!(
            prompt_tokens = state.sequence().len(),
            max_tokens, "Generation started"
        );

        while !state.is_finished() {
            if cancel.is_cancelled() {
                state.cancel();
                break;
            }

            let batch = BatchTensors::generation(state.sequence())?;
            let inputs = batch.to_named_tensors(&self.device)?;
            let logits = self.session.run_single(inputs, LOGITS)?;
            let next = select_next(&logits)?;

            state.append(next);
            state.set_text(self.tokenizer.decode(state.sequence().ids()));

            debug!(step = state.steps(), token = next, "Generation step");

            if self.tokenizer.is_end_of_sequence(next) {
                state.finish(FinishReason::EndOfSequence);
                break;
            }

            on_partial(state.text());

            if state.steps() >= max_tokens {
                state.finish(FinishReason::Budget);
            }
        }

        let completion = state.into_completion();
        info!(
            model = %self.model,
            steps = completion.steps,
            finish = ?completion.finish,
            "Generation finished"
        );
        Ok(completion)
    }
}
