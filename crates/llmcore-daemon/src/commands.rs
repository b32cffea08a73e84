//! Command implementations.
//!
//! Model loading and inference block, so each command builds its artifact
//! provider and services inside `spawn_blocking` and only awaits the result.
//! Generation loads first and then runs in a second blocking task, so the
//! request deadline covers only the decode loop.

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use llmcore_embeddings::build_embedder;
use llmcore_generation::{Completion, Generator};
use llmcore_runtime::{ArtifactKey, ArtifactProvider, DownloadOptions, MirrorArtifactProvider};
use llmcore_types::{ArtifactSettings, EmbedInput, EmbeddingBackend, Settings};

/// Load layered settings and apply CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

pub fn download_options(settings: &ArtifactSettings) -> DownloadOptions {
    DownloadOptions {
        retries: settings.retries,
        timeout: Duration::from_secs(settings.timeout_secs),
        user_agent: settings.user_agent.clone(),
    }
}

/// Provider under `<data_dir>/models` with every enabled service registered.
pub fn build_provider(settings: &Settings) -> Result<MirrorArtifactProvider> {
    let mut provider =
        MirrorArtifactProvider::new(settings.models_dir(), download_options(&settings.artifacts))
            .context("Failed to create artifact provider")?;

    if settings.embeddings.enabled {
        llmcore_embeddings::register_artifacts(&mut provider, &settings.embeddings)
            .context("Invalid embedding mirrors")?;
    }
    if settings.generation.enabled {
        llmcore_generation::register_artifacts(&mut provider, &settings.generation)
            .context("Invalid generation mirrors")?;
    }
    Ok(provider)
}

/// Keys `fetch` resolves, in order.
pub fn fetch_keys(settings: &Settings) -> Vec<ArtifactKey> {
    let mut keys = Vec::new();
    if settings.embeddings.enabled {
        keys.extend(llmcore_embeddings::artifact_keys(&settings.embeddings));
    }
    if settings.generation.enabled {
        keys.extend(llmcore_generation::artifact_keys(&settings.generation));
    }
    keys
}

/// Resolve the request from positional texts or a raw JSON body.
pub fn embed_request(texts: Vec<String>, json: Option<&str>) -> Result<EmbedInput> {
    let input = match json {
        Some(body) => EmbedInput::from_request_json(body).context("Invalid embed request")?,
        None => EmbedInput::from_texts(texts),
    };
    if input.is_empty() {
        bail!("embed request has no input texts");
    }
    Ok(input)
}

pub async fn handle_embed(
    mut settings: Settings,
    texts: Vec<String>,
    backend: Option<&str>,
    json: Option<&str>,
) -> Result<()> {
    if let Some(backend) = backend {
        settings.embeddings.backend = backend
            .parse::<EmbeddingBackend>()
            .context("Invalid --backend")?;
    }
    if !settings.embeddings.enabled {
        bail!("embeddings are disabled in configuration");
    }
    let input = embed_request(texts, json)?;

    let batch = tokio::task::spawn_blocking(move || -> Result<_> {
        let provider = build_provider(&settings)?;
        let embedder = build_embedder(&settings.embeddings, &provider)
            .context("Failed to load embedding model")?;
        embedder.embed_input(input).context("Embedding failed")
    })
    .await
    .context("Embedding task panicked")??;

    let vectors: Vec<&[f32]> = batch.vectors.iter().map(|v| v.values.as_slice()).collect();
    let body = serde_json::json!({
        "model": batch.model,
        "embeddings": vectors,
    });
    println!("{}", serde_json::to_string(&body)?);
    Ok(())
}

/// Text to print for a streamed update, given what is already on screen.
///
/// Partials are full decodes of the live window, so once the window slides
/// the new text no longer extends the old; then the whole partial is returned.
pub fn stream_delta<'a>(printed: &str, partial: &'a str) -> (&'a str, bool) {
    match partial.strip_prefix(printed) {
        Some(rest) => (rest, false),
        None => (partial, true),
    }
}

/// Spawn a task that cancels `cancel` once `timeout` has elapsed.
pub fn arm_deadline(cancel: CancellationToken, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "Generation deadline reached");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

fn write_completion(
    generator: &Generator,
    prompt: &str,
    max_tokens: usize,
    stream: bool,
    cancel: &CancellationToken,
) -> Result<Completion> {
    if !stream {
        return generator
            .generate(prompt, max_tokens, cancel)
            .context("Generation failed");
    }

    let mut printed = String::new();
    let mut stdout = std::io::stdout();
    let completion = generator
        .generate_streaming(prompt, max_tokens, cancel, &mut |partial: &str| {
            let (delta, restart) = stream_delta(&printed, partial);
            if restart {
                let _ = writeln!(stdout);
            }
            let _ = write!(stdout, "{delta}");
            let _ = stdout.flush();
            printed = partial.to_string();
        })
        .context("Generation failed")?;
    println!();
    Ok(completion)
}

/// Run an already loaded generator on the blocking pool.
///
/// The deadline is armed here, once the model is in memory, and disarmed
/// when the run returns.
pub async fn run_generation(
    generator: Generator,
    prompt: String,
    max_tokens: usize,
    stream: bool,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<Completion> {
    let deadline = arm_deadline(cancel.clone(), timeout);
    let result = tokio::task::spawn_blocking(move || {
        write_completion(&generator, &prompt, max_tokens, stream, &cancel)
    })
    .await
    .context("Generation task panicked");
    deadline.abort();
    result?
}

pub async fn handle_generate(
    settings: Settings,
    prompt: String,
    max_tokens: Option<usize>,
    stream: bool,
) -> Result<()> {
    if !settings.generation.enabled {
        bail!("generation is disabled in configuration");
    }
    let max_tokens = max_tokens.unwrap_or(settings.generation.default_max_tokens);
    let timeout = Duration::from_secs(settings.generation.timeout_secs);
    let cancel = CancellationToken::new();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, cancelling generation");
                cancel.cancel();
            }
        })
    };

    let result = async {
        let generator = tokio::task::spawn_blocking(move || -> Result<Generator> {
            let provider = build_provider(&settings)?;
            Generator::load(&provider, &settings.generation)
                .context("Failed to load generation model")
        })
        .await
        .context("Model load task panicked")??;
        run_generation(generator, prompt, max_tokens, stream, cancel, timeout).await
    }
    .await;
    interrupt.abort();
    let completion = result?;

    info!(steps = completion.steps, finish = ?completion.finish, "Done");
    if !stream {
        println!("{}", serde_json::to_string(&completion)?);
    }
    Ok(())
}

pub async fn handle_fetch(settings: Settings) -> Result<()> {
    let keys = fetch_keys(&settings);
    if keys.is_empty() {
        info!("Nothing to fetch");
        return Ok(());
    }

    tokio::task::spawn_blocking(move || -> Result<()> {
        let provider = build_provider(&settings)?;
        for key in &keys {
            let path = provider
                .resolve(key)
                .with_context(|| format!("Failed to fetch {key}"))?;
            println!("{key}\t{}", path.display());
        }
        Ok(())
    })
    .await
    .context("Fetch task panicked")?
}

pub fn render_config(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize settings")
}

pub fn show_config(settings: &Settings) -> Result<()> {
    print!("{}", render_config(settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use candle_core::{Device, Tensor};
    use llmcore_generation::FinishReason;
    use llmcore_runtime::{
        ArtifactKind, Graph, InferenceSession, LookupTokenizer, NamedTensors, SpecialTokens,
        Vocabulary, GENERATION_CONTRACT, LOGITS,
    };
    use tempfile::TempDir;

    const WORDS: [&str; 4] = ["<unk>", "red", "green", "blue"];

    /// Predicts `last input id + 1`, wrapping at the vocabulary size.
    struct NextIdGraph;

    impl Graph for NextIdGraph {
        fn input_names(&self) -> Vec<String> {
            ["input_ids", "attention_mask", "position_ids"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        }

        fn output_names(&self) -> Vec<String> {
            vec![LOGITS.to_string()]
        }

        fn run(&self, inputs: NamedTensors) -> candle_core::Result<NamedTensors> {
            let ids = inputs["input_ids"].to_vec2::<i64>()?;
            let row = &ids[0];
            let vocab = WORDS.len();
            let mut data = vec![0f32; row.len() * vocab];
            for (pos, &id) in row.iter().enumerate() {
                data[pos * vocab + (id as usize + 1) % vocab] = 1.0;
            }
            let logits = Tensor::from_vec(data, (1, row.len(), vocab), &Device::Cpu)?;
            Ok(HashMap::from([(LOGITS.to_string(), logits)]))
        }
    }

    fn loaded_generator() -> Generator {
        let map: HashMap<String, u32> = WORDS
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_string(), i as u32))
            .collect();
        let specials = SpecialTokens {
            unknown: 0,
            start: None,
            separator: None,
            pad: 0,
            end_of_sequence: None,
        };
        let tokenizer = LookupTokenizer::new(Vocabulary::new(map, specials).unwrap());
        let session = InferenceSession::open(Box::new(NextIdGraph), GENERATION_CONTRACT).unwrap();
        Generator::new(Arc::new(session), tokenizer, "colors", 8).unwrap()
    }

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            data_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_download_options_from_settings() {
        let artifacts = ArtifactSettings {
            retries: 5,
            timeout_secs: 7,
            user_agent: "ua".to_string(),
        };
        let options = download_options(&artifacts);
        assert_eq!(options.retries, 5);
        assert_eq!(options.timeout, Duration::from_secs(7));
        assert_eq!(options.user_agent, "ua");
    }

    #[test]
    fn test_provider_registers_enabled_services() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let provider = build_provider(&settings).unwrap();

        assert_eq!(provider.root(), dir.path().join("models"));
        assert_eq!(provider.keys().count(), 4);
        for key in fetch_keys(&settings) {
            assert!(provider.path_for(&key).is_ok(), "{key} not registered");
        }
    }

    #[test]
    fn test_hash_backend_fetches_nothing_for_embeddings() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.embeddings.backend = EmbeddingBackend::Hash;
        settings.generation.enabled = false;
        assert!(fetch_keys(&settings).is_empty());

        settings.generation.enabled = true;
        let kinds: Vec<_> = fetch_keys(&settings).into_iter().map(|k| k.kind).collect();
        assert_eq!(kinds, vec![ArtifactKind::Graph, ArtifactKind::Vocabulary]);
    }

    #[test]
    fn test_embed_request_variants() {
        let single = embed_request(vec!["x".to_string()], None).unwrap();
        assert!(matches!(single, EmbedInput::SingleText(_)));

        let list = embed_request(vec![], Some(r#"{"input":["a","b"]}"#)).unwrap();
        assert_eq!(list.len(), 2);

        assert!(embed_request(vec![], Some(r#"{"input":[]}"#)).is_err());
        assert!(embed_request(vec![], Some("not json")).is_err());
    }

    #[test]
    fn test_stream_delta() {
        assert_eq!(stream_delta("", "the"), ("the", false));
        assert_eq!(stream_delta("the", "the cat"), (" cat", false));
        assert_eq!(stream_delta("the cat", "cat sat"), ("cat sat", true));
    }

    #[tokio::test]
    async fn test_embed_with_hash_backend() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        handle_embed(settings, vec!["hello world".to_string()], Some("hash"), None)
            .await
            .unwrap();
    }

    #[test]
    fn test_render_config_round_trips() {
        let settings = Settings::default();
        let rendered = render_config(&settings).unwrap();
        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.embeddings.max_length, settings.embeddings.max_length);
        assert_eq!(parsed.generation.model_name, settings.generation.model_name);
    }

    #[tokio::test]
    async fn test_deadline_cancels_after_timeout() {
        let cancel = CancellationToken::new();
        let deadline = arm_deadline(cancel.clone(), Duration::from_millis(20));
        assert!(!cancel.is_cancelled());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cancel.is_cancelled());
        assert!(deadline.is_finished());
    }

    #[tokio::test]
    async fn test_aborted_deadline_never_fires() {
        let cancel = CancellationToken::new();
        let deadline = arm_deadline(cancel.clone(), Duration::from_millis(20));
        deadline.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_slow_load_does_not_count_against_deadline() {
        let generator = loaded_generator();
        let timeout = Duration::from_millis(300);
        // Loading took longer than the whole request timeout.
        tokio::time::sleep(timeout * 2).await;

        let cancel = CancellationToken::new();
        let completion = run_generation(
            generator,
            "red".to_string(),
            2,
            false,
            cancel.clone(),
            timeout,
        )
        .await
        .unwrap();

        assert_eq!(completion.finish, FinishReason::Budget);
        assert_eq!(completion.steps, 2);
        assert_eq!(completion.text, "red green blue");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_prompt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let completion = run_generation(
            loaded_generator(),
            "green".to_string(),
            4,
            false,
            cancel,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(completion.finish, FinishReason::Cancelled);
        assert_eq!(completion.steps, 0);
        assert_eq!(completion.text, "green");
    }
}
