//! Error path E2E tests.
//!
//! Startup failures (vocabulary, session contract, artifacts) surface at
//! construction; per-call failures return an error and no partial output.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{FailingGraph, FlatLogitsGraph, TestHarness, EMBEDDING_MODEL, GENERATION_MODEL};
use llmcore_embeddings::{build_embedder, EmbeddingError, EmbeddingModel, SessionEmbedder};
use llmcore_generation::{GenerationError, Generator};
use llmcore_runtime::{
    ArtifactError, ArtifactKey, ArtifactKind, ArtifactProvider, ArtifactSpec, DownloadOptions,
    InferenceError, InferenceSession, LookupTokenizer, MirrorArtifactProvider, WordPieceTokenizer,
    EMBEDDING_CONTRACT, GENERATION_CONTRACT,
};
use llmcore_types::{EmbeddingSettings, GenerationSettings};
use tokio_util::sync::CancellationToken;

#[test]
fn test_embedding_run_failure_is_runtime_error() {
    let harness = TestHarness::new();
    let session = InferenceSession::open(
        Box::new(FailingGraph {
            contract: EMBEDDING_CONTRACT,
        }),
        EMBEDDING_CONTRACT,
    )
    .unwrap();
    let embedder = SessionEmbedder::new(
        Arc::new(session),
        harness.wordpiece(8),
        EMBEDDING_MODEL,
        4,
    )
    .unwrap();

    let err = embedder.embed_batch(&["hello", "world"]).unwrap_err();
    assert!(
        matches!(err, EmbeddingError::Inference(InferenceError::RuntimeExec(_))),
        "got {err:?}"
    );
}

#[test]
fn test_generation_run_failure_is_runtime_error() {
    let harness = TestHarness::new();
    let session = InferenceSession::open(
        Box::new(FailingGraph {
            contract: GENERATION_CONTRACT,
        }),
        GENERATION_CONTRACT,
    )
    .unwrap();
    let generator =
        Generator::new(Arc::new(session), harness.lookup(), GENERATION_MODEL, 16).unwrap();

    let mut partials = 0;
    let err = generator
        .generate_streaming("the cat", 4, &CancellationToken::new(), &mut |_: &str| {
            partials += 1
        })
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Inference(InferenceError::RuntimeExec(_))
    ));
    assert_eq!(partials, 0);
}

#[test]
fn test_unexpected_logits_rank_is_shape_error() {
    let harness = TestHarness::new();
    let session = InferenceSession::open(Box::new(FlatLogitsGraph), GENERATION_CONTRACT).unwrap();
    let generator =
        Generator::new(Arc::new(session), harness.lookup(), GENERATION_MODEL, 16).unwrap();

    let err = generator.generate("the", 4, &CancellationToken::new()).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Inference(InferenceError::Shape(_))
    ));
}

#[test]
fn test_contract_mismatch_fails_at_open() {
    let err = InferenceSession::open(
        Box::new(FailingGraph {
            contract: EMBEDDING_CONTRACT,
        }),
        GENERATION_CONTRACT,
    )
    .unwrap_err();
    match err {
        InferenceError::SessionInit(message) => assert!(message.contains("position_ids")),
        other => panic!("expected SessionInit, got {other:?}"),
    }
}

#[test]
fn test_missing_vocabulary_files() {
    let harness = TestHarness::new();
    let missing = harness._temp_dir.path().join("missing.txt");

    assert!(matches!(
        WordPieceTokenizer::from_file(&missing, 8),
        Err(InferenceError::VocabularyLoad(_))
    ));
    assert!(matches!(
        LookupTokenizer::from_file(&missing),
        Err(InferenceError::VocabularyLoad(_))
    ));
}

#[test]
fn test_unknown_artifact_keys() {
    let harness = TestHarness::new();
    let artifacts = harness.artifacts();

    let settings = EmbeddingSettings {
        model_name: EMBEDDING_MODEL.to_string(),
        ..Default::default()
    };
    let err = build_embedder(&settings, &artifacts).err().unwrap();
    assert!(matches!(
        err,
        EmbeddingError::Artifact(ArtifactError::UnknownArtifact(_))
    ));

    let settings = GenerationSettings {
        model_name: GENERATION_MODEL.to_string(),
        ..Default::default()
    };
    let err = Generator::load(&artifacts, &settings).err().unwrap();
    assert!(matches!(
        err,
        GenerationError::Artifact(ArtifactError::UnknownArtifact(_))
    ));
}

#[test]
fn test_unreachable_mirror_leaves_nothing_installed() {
    let dir = tempfile::TempDir::new().unwrap();
    let options = DownloadOptions {
        retries: 1,
        ..Default::default()
    };
    let mut provider = MirrorArtifactProvider::new(dir.path(), options).unwrap();
    let key = ArtifactKey::new("offline", ArtifactKind::Vocabulary);
    provider.register(
        key.clone(),
        ArtifactSpec::parse("vocab.txt", &["http://127.0.0.1:9/vocab.txt".to_string()]).unwrap(),
    );

    let err = provider.resolve(&key).unwrap_err();
    assert!(matches!(err, ArtifactError::Download { .. }));
    assert!(!provider.is_installed(&key));

    let model_dir = dir.path().join("offline");
    let leftovers: Vec<_> = std::fs::read_dir(&model_dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert_eq!(leftovers, Vec::<std::ffi::OsString>::new());
}

#[test]
fn test_installed_artifact_resolves_without_network() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut provider = MirrorArtifactProvider::new(dir.path(), DownloadOptions::default()).unwrap();
    let key = ArtifactKey::new("cached", ArtifactKind::Graph);
    provider.register(
        key.clone(),
        ArtifactSpec::parse("model.onnx", &["http://127.0.0.1:9/model.onnx".to_string()]).unwrap(),
    );

    let path = provider.path_for(&key).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"graph").unwrap();

    let provider = Arc::new(provider);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provider = Arc::clone(&provider);
            let key = key.clone();
            std::thread::spawn(move || provider.resolve(&key).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), path);
    }
}
