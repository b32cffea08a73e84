//! End-to-end test infrastructure for llmcore.
//!
//! Provides a shared TestHarness with real vocabulary files on disk and
//! in-memory graphs standing in for model weights, so the full
//! text -> tokenizer -> tensors -> session -> output path runs offline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use llmcore_embeddings::SessionEmbedder;
use llmcore_generation::Generator;
use llmcore_runtime::{
    ArtifactKey, ArtifactKind, Graph, InferenceSession, LocalArtifacts, LookupTokenizer,
    NamedTensors, SessionContract, WordPieceTokenizer, EMBEDDING_CONTRACT, GENERATION_CONTRACT,
    LAST_HIDDEN_STATE, LOGITS,
};

/// `vocab.txt` lines; the id of a token is its line index.
pub const WORDPIECE_TOKENS: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "hello", "world", "the", "cat", "sat", "on", "mat", "un",
    "##able", "##s", "##ing", "rust",
];

/// Generation vocabulary, ids in order. The end-of-text id follows the last word.
pub const GENERATION_WORDS: &[&str] = &["<unk>", "the", "cat", "sat", "on", "mat"];
pub const END_OF_TEXT_ID: u32 = GENERATION_WORDS.len() as u32;

pub const EMBEDDING_MODEL: &str = "test-minilm";
pub const GENERATION_MODEL: &str = "test-lm";

/// Call counters shared between a graph and the test observing it.
#[derive(Debug, Clone, Default)]
pub struct GraphProbe {
    calls: Arc<AtomicUsize>,
    max_width: Arc<AtomicUsize>,
}

impl GraphProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Widest `input_ids` row seen so far.
    pub fn max_width(&self) -> usize {
        self.max_width.load(Ordering::SeqCst)
    }

    fn record(&self, width: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_width.fetch_max(width, Ordering::SeqCst);
    }
}

fn names(contract: SessionContract, outputs: bool) -> Vec<String> {
    let list = if outputs {
        contract.outputs
    } else {
        contract.inputs
    };
    list.iter().map(|s| s.to_string()).collect()
}

/// Per-token hidden states that depend only on the token id.
pub struct HiddenStateGraph {
    pub dim: usize,
    pub probe: GraphProbe,
}

impl HiddenStateGraph {
    fn value(id: i64, channel: usize) -> f32 {
        let mixed = (id as u64)
            .wrapping_mul(2_654_435_761)
            .wrapping_add(channel as u64 * 40_503);
        (mixed % 1000) as f32 / 1000.0 - 0.5
    }
}

impl Graph for HiddenStateGraph {
    fn input_names(&self) -> Vec<String> {
        names(EMBEDDING_CONTRACT, false)
    }

    fn output_names(&self) -> Vec<String> {
        names(EMBEDDING_CONTRACT, true)
    }

    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        let ids = inputs["input_ids"].to_vec2::<i64>()?;
        let (batch, width) = (ids.len(), ids.first().map_or(0, Vec::len));
        self.probe.record(width);

        let mut data = Vec::with_capacity(batch * width * self.dim);
        for row in &ids {
            for &id in row {
                data.extend((0..self.dim).map(|c| Self::value(id, c)));
            }
        }
        let hidden = Tensor::from_vec(data, (batch, width, self.dim), &Device::Cpu)?;
        Ok(HashMap::from([(LAST_HIDDEN_STATE.to_string(), hidden)]))
    }
}

/// Predicts `last id + 1`, wrapping at `vocab_size`.
pub struct NextTokenGraph {
    pub vocab_size: usize,
    pub probe: GraphProbe,
}

impl Graph for NextTokenGraph {
    fn input_names(&self) -> Vec<String> {
        names(GENERATION_CONTRACT, false)
    }

    fn output_names(&self) -> Vec<String> {
        names(GENERATION_CONTRACT, true)
    }

    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        let ids = inputs["input_ids"].to_vec2::<i64>()?;
        let positions = inputs["position_ids"].to_vec2::<i64>()?;
        let row = &ids[0];
        if positions[0] != (0..row.len() as i64).collect::<Vec<_>>() {
            candle_core::bail!("position ids do not restart at the window start");
        }
        self.probe.record(row.len());

        let mut data = vec![0f32; row.len() * self.vocab_size];
        for (pos, &id) in row.iter().enumerate() {
            data[pos * self.vocab_size + (id as usize + 1) % self.vocab_size] = 1.0;
        }
        let logits = Tensor::from_vec(data, (1, row.len(), self.vocab_size), &Device::Cpu)?;
        Ok(HashMap::from([(LOGITS.to_string(), logits)]))
    }
}

/// Graph that exports `contract`'s names and fails every run.
pub struct FailingGraph {
    pub contract: SessionContract,
}

impl Graph for FailingGraph {
    fn input_names(&self) -> Vec<String> {
        names(self.contract, false)
    }

    fn output_names(&self) -> Vec<String> {
        names(self.contract, true)
    }

    fn run(&self, _inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        candle_core::bail!("execution provider unavailable")
    }
}

/// Graph whose logits come back as rank 2, which generation must reject.
pub struct FlatLogitsGraph;

impl Graph for FlatLogitsGraph {
    fn input_names(&self) -> Vec<String> {
        names(GENERATION_CONTRACT, false)
    }

    fn output_names(&self) -> Vec<String> {
        names(GENERATION_CONTRACT, true)
    }

    fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
        let (_, width) = inputs["input_ids"].dims2()?;
        let logits = Tensor::zeros((width, 4), candle_core::DType::F32, &Device::Cpu)?;
        Ok(HashMap::from([(LOGITS.to_string(), logits)]))
    }
}

/// Shared test harness for E2E tests.
///
/// Writes a WordPiece `vocab.txt` and a generation `tokenizer.json` into a
/// temp dir and builds services over in-memory graphs.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub vocab_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");

        let vocab_path = temp_dir.path().join("vocab.txt");
        std::fs::write(&vocab_path, WORDPIECE_TOKENS.join("\n")).expect("Failed to write vocab");

        let tokenizer_path = temp_dir.path().join("tokenizer.json");
        std::fs::write(&tokenizer_path, tokenizer_json()).expect("Failed to write tokenizer");

        Self {
            _temp_dir: temp_dir,
            vocab_path,
            tokenizer_path,
        }
    }

    pub fn wordpiece(&self, max_length: usize) -> WordPieceTokenizer {
        WordPieceTokenizer::from_file(&self.vocab_path, max_length).expect("Failed to load vocab")
    }

    pub fn lookup(&self) -> LookupTokenizer {
        LookupTokenizer::from_file(&self.tokenizer_path).expect("Failed to load tokenizer")
    }

    /// Embedder over a [`HiddenStateGraph`] of hidden size `dim`.
    pub fn embedder(&self, dim: usize, max_length: usize) -> (SessionEmbedder, GraphProbe) {
        let probe = GraphProbe::default();
        let graph = HiddenStateGraph {
            dim,
            probe: probe.clone(),
        };
        let session = InferenceSession::open(Box::new(graph), EMBEDDING_CONTRACT)
            .expect("Failed to open embedding session");
        let embedder = SessionEmbedder::new(
            Arc::new(session),
            self.wordpiece(max_length),
            EMBEDDING_MODEL,
            dim,
        )
        .expect("Failed to build embedder");
        (embedder, probe)
    }

    /// Generator over a [`NextTokenGraph`] spanning the vocabulary plus end-of-text.
    pub fn generator(&self, max_context: usize) -> (Generator, GraphProbe) {
        let probe = GraphProbe::default();
        let graph = NextTokenGraph {
            vocab_size: GENERATION_WORDS.len() + 1,
            probe: probe.clone(),
        };
        let session = InferenceSession::open(Box::new(graph), GENERATION_CONTRACT)
            .expect("Failed to open generation session");
        let generator = Generator::new(
            Arc::new(session),
            self.lookup(),
            GENERATION_MODEL,
            max_context,
        )
        .expect("Failed to build generator");
        (generator, probe)
    }

    /// Provider resolving the on-disk vocabulary files by key.
    pub fn artifacts(&self) -> LocalArtifacts {
        LocalArtifacts::new()
            .with(
                ArtifactKey::new(EMBEDDING_MODEL, ArtifactKind::Vocabulary),
                &self.vocab_path,
            )
            .with(
                ArtifactKey::new(GENERATION_MODEL, ArtifactKind::Vocabulary),
                &self.tokenizer_path,
            )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// `tokenizer.json` with a word-level model over [`GENERATION_WORDS`] and
/// an added end-of-text token.
pub fn tokenizer_json() -> String {
    let vocab: serde_json::Map<String, serde_json::Value> = GENERATION_WORDS
        .iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), serde_json::Value::from(id)))
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [{
            "id": END_OF_TEXT_ID,
            "content": "<|endoftext|>",
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        }],
        "normalizer": null,
        "pre_tokenizer": null,
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "<unk>"
        }
    })
    .to_string()
}

/// Random printable ASCII of `len` characters.
pub fn random_ascii(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.random_range(0x20u8..0x7f)))
        .collect()
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
