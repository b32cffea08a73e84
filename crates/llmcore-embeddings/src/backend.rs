//! Backend selection from settings.

use std::sync::Arc;

use llmcore_runtime::{
    ArtifactKey, ArtifactKind, ArtifactProvider, ArtifactSpec, BertGraph, InferenceSession,
    MirrorArtifactProvider, OnnxGraph, WordPieceTokenizer, EMBEDDING_CONTRACT,
};
use llmcore_types::{EmbeddingBackend, EmbeddingSettings};
use tracing::info;

use crate::embedder::SessionEmbedder;
use crate::error::EmbeddingError;
use crate::hash::HashEmbedder;
use crate::model::EmbeddingModel;

pub const ONNX_GRAPH_FILE: &str = "model.onnx";
pub const SAFETENSORS_FILE: &str = "model.safetensors";
pub const BERT_CONFIG_FILE: &str = "config.json";
pub const VOCAB_FILE: &str = "vocab.txt";

/// Artifact keys the configured backend needs, in resolution order.
pub fn artifact_keys(settings: &EmbeddingSettings) -> Vec<ArtifactKey> {
    let model = settings.model_name.as_str();
    match settings.backend {
        EmbeddingBackend::Onnx => vec![
            ArtifactKey::new(model, ArtifactKind::Graph),
            ArtifactKey::new(model, ArtifactKind::Vocabulary),
        ],
        EmbeddingBackend::Safetensors => vec![
            ArtifactKey::new(model, ArtifactKind::Graph),
            ArtifactKey::new(model, ArtifactKind::GraphConfig),
            ArtifactKey::new(model, ArtifactKind::Vocabulary),
        ],
        EmbeddingBackend::Hash => vec![],
    }
}

/// Register mirror specs for the configured backend's artifacts.
pub fn register_artifacts(
    provider: &mut MirrorArtifactProvider,
    settings: &EmbeddingSettings,
) -> Result<(), EmbeddingError> {
    let model = settings.model_name.as_str();
    match settings.backend {
        EmbeddingBackend::Onnx => {
            provider.register(
                ArtifactKey::new(model, ArtifactKind::Graph),
                ArtifactSpec::parse(ONNX_GRAPH_FILE, &settings.onnx_graph_mirrors)?,
            );
        }
        EmbeddingBackend::Safetensors => {
            provider.register(
                ArtifactKey::new(model, ArtifactKind::Graph),
                ArtifactSpec::parse(SAFETENSORS_FILE, &settings.safetensors_mirrors)?,
            );
            provider.register(
                ArtifactKey::new(model, ArtifactKind::GraphConfig),
                ArtifactSpec::parse(BERT_CONFIG_FILE, &settings.config_mirrors)?,
            );
        }
        EmbeddingBackend::Hash => return Ok(()),
    }
    provider.register(
        ArtifactKey::new(model, ArtifactKind::Vocabulary),
        ArtifactSpec::parse(VOCAB_FILE, &settings.vocab_mirrors)?,
    );
    Ok(())
}

impl SessionEmbedder {
    /// Load the ONNX graph and WordPiece vocabulary through `provider`.
    pub fn load_onnx(
        provider: &dyn ArtifactProvider,
        settings: &EmbeddingSettings,
    ) -> Result<Self, EmbeddingError> {
        let model = settings.model_name.as_str();
        let graph_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::Graph))?;
        let vocab_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::Vocabulary))?;

        info!(model, path = %graph_path.display(), "Loading ONNX embedding graph");

        let graph = OnnxGraph::from_file(&graph_path)?;
        let session = InferenceSession::open(Box::new(graph), EMBEDDING_CONTRACT)?;
        let tokenizer = WordPieceTokenizer::from_file(&vocab_path, settings.max_length)?;

        Self::new(Arc::new(session), tokenizer, model, settings.dimension)
    }

    /// Load BERT safetensors weights, config and vocabulary through `provider`.
    pub fn load_safetensors(
        provider: &dyn ArtifactProvider,
        settings: &EmbeddingSettings,
    ) -> Result<Self, EmbeddingError> {
        let model = settings.model_name.as_str();
        let weights_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::Graph))?;
        let config_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::GraphConfig))?;
        let vocab_path = provider.resolve(&ArtifactKey::new(model, ArtifactKind::Vocabulary))?;

        info!(model, path = %weights_path.display(), "Loading BERT safetensors weights");

        let graph = BertGraph::from_files(&config_path, &weights_path)?;
        if graph.hidden_size() != settings.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: settings.dimension,
                actual: graph.hidden_size(),
            });
        }
        let session = InferenceSession::open(Box::new(graph), EMBEDDING_CONTRACT)?;
        let tokenizer = WordPieceTokenizer::from_file(&vocab_path, settings.max_length)?;

        Self::new(Arc::new(session), tokenizer, model, settings.dimension)
    }
}

/// Build the embedder selected by `settings.backend`.
pub fn build_embedder(
    settings: &EmbeddingSettings,
    provider: &dyn ArtifactProvider,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    let embedder: Arc<dyn EmbeddingModel> = match settings.backend {
        EmbeddingBackend::Onnx => Arc::new(SessionEmbedder::load_onnx(provider, settings)?),
        EmbeddingBackend::Safetensors => {
            Arc::new(SessionEmbedder::load_safetensors(provider, settings)?)
        }
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(
            format!("hash-embeddings-{}", settings.dimension),
            settings.dimension,
        )?),
    };

    info!(
        backend = ?settings.backend,
        model = %embedder.info().name,
        dim = embedder.info().dimension,
        "Embedder ready"
    );
    Ok(embedder)
}
