//! Configuration loading for llmcore.
//!
//! Layered config: defaults -> config file -> CLI config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/llmcore/config.{toml,json,yaml}`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Which embedding backend serves `embed` calls.
///
/// The model-backed backends return the all-zero vector for input that
/// tokenizes to nothing; the hash backend forces a fixed unit bucket instead.
/// The two policies are never mixed within one backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// ONNX graph evaluated in-process
    #[default]
    Onnx,
    /// BERT safetensors weights plus config.json
    Safetensors,
    /// Deterministic feature hashing, no model files
    Hash,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "safetensors" | "candle" => Ok(Self::Safetensors),
            "hash" => Ok(Self::Hash),
            other => Err(ConfigError::Invalid {
                field: "embeddings.backend",
                reason: format!("unknown embedding backend: {other}"),
            }),
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Model name reported alongside every embedding batch
    #[serde(default = "default_embedding_model")]
    pub model_name: String,

    /// Fixed batch width in tokens, special tokens included
    #[serde(default = "default_embedding_max_length")]
    pub max_length: usize,

    /// Output vector dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_onnx_graph_mirrors")]
    pub onnx_graph_mirrors: Vec<String>,

    #[serde(default = "default_safetensors_mirrors")]
    pub safetensors_mirrors: Vec<String>,

    #[serde(default = "default_bert_config_mirrors")]
    pub config_mirrors: Vec<String>,

    #[serde(default = "default_vocab_mirrors")]
    pub vocab_mirrors: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_embedding_max_length() -> usize {
    128
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_onnx_graph_mirrors() -> Vec<String> {
    vec![
        "https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx".to_string(),
        "https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/model.onnx".to_string(),
        "https://huggingface.co/onnx-community/all-MiniLM-L6-v2/resolve/main/model.onnx"
            .to_string(),
    ]
}

fn default_safetensors_mirrors() -> Vec<String> {
    vec!["hf://sentence-transformers/all-MiniLM-L6-v2/model.safetensors".to_string()]
}

fn default_bert_config_mirrors() -> Vec<String> {
    vec!["hf://sentence-transformers/all-MiniLM-L6-v2/config.json".to_string()]
}

fn default_vocab_mirrors() -> Vec<String> {
    vec![
        "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/vocab.txt"
            .to_string(),
    ]
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: EmbeddingBackend::default(),
            model_name: default_embedding_model(),
            max_length: default_embedding_max_length(),
            dimension: default_embedding_dimension(),
            onnx_graph_mirrors: default_onnx_graph_mirrors(),
            safetensors_mirrors: default_safetensors_mirrors(),
            config_mirrors: default_bert_config_mirrors(),
            vocab_mirrors: default_vocab_mirrors(),
        }
    }
}

/// Text generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_generation_model")]
    pub model_name: String,

    /// Context window in tokens; older tokens slide out beyond this
    #[serde(default = "default_max_context")]
    pub max_context: usize,

    /// Token budget used when a request does not name one
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    /// Deadline for a single generation request
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_generation_graph_mirrors")]
    pub graph_mirrors: Vec<String>,

    #[serde(default = "default_tokenizer_mirrors")]
    pub tokenizer_mirrors: Vec<String>,
}

fn default_generation_model() -> String {
    "qwen2.5-0.5b-instruct".to_string()
}

fn default_max_context() -> usize {
    512
}

fn default_max_tokens() -> usize {
    64
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_generation_graph_mirrors() -> Vec<String> {
    vec![
        "https://huggingface.co/onnx-community/Qwen2.5-0.5B-Instruct/resolve/main/onnx/model.onnx"
            .to_string(),
    ]
}

fn default_tokenizer_mirrors() -> Vec<String> {
    vec![
        "https://huggingface.co/onnx-community/Qwen2.5-0.5B-Instruct/resolve/main/tokenizer.json"
            .to_string(),
        "hf://Qwen/Qwen2.5-0.5B-Instruct/tokenizer.json".to_string(),
    ]
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model_name: default_generation_model(),
            max_context: default_max_context(),
            default_max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            graph_mirrors: default_generation_graph_mirrors(),
            tokenizer_mirrors: default_tokenizer_mirrors(),
        }
    }
}

/// Artifact download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSettings {
    /// Attempts per mirror before moving to the next one
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-request timeout for URL mirrors
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_retries() -> u32 {
    3
}

fn default_download_timeout() -> u64 {
    180
}

fn default_user_agent() -> String {
    format!("llmcore/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_download_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for downloaded models and vocabularies
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub embeddings: EmbeddingSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub artifacts: ArtifactSettings,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "llmcore")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".llmcore"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            embeddings: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            artifacts: ArtifactSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (<config dir>/llmcore/config.*)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (LLMCORE_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "llmcore")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("embeddings.max_length", default_embedding_max_length() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("generation.max_context", default_max_context() as i64)
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // LLMCORE_LOG_LEVEL, LLMCORE_GENERATION__MAX_CONTEXT, ...
        builder = builder.add_source(
            Environment::with_prefix("LLMCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the inference pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embeddings.max_length < 2 {
            return Err(ConfigError::Invalid {
                field: "embeddings.max_length",
                reason: format!(
                    "must hold at least the two special tokens, got {}",
                    self.embeddings.max_length
                ),
            });
        }
        if self.embeddings.dimension == 0 {
            return Err(ConfigError::Invalid {
                field: "embeddings.dimension",
                reason: "must be > 0".to_string(),
            });
        }
        if self.generation.max_context == 0 {
            return Err(ConfigError::Invalid {
                field: "generation.max_context",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Directory holding downloaded artifacts, with `~/` expanded.
    pub fn models_dir(&self) -> PathBuf {
        self.expanded_data_dir().join("models")
    }

    /// Expand ~ in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}
