//! llmcore
//!
//! Local text embeddings and greedy text generation.
//!
//! # Usage
//!
//! ```bash
//! llmcore embed "first text" "second text"
//! llmcore generate "the cat sat" --max-tokens 16 --stream
//! llmcore fetch
//! llmcore config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (<config dir>/llmcore/config.toml)
//! 3. Environment variables (LLMCORE_*, nested keys joined by `__`)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use llmcore_daemon::{
    handle_embed, handle_fetch, handle_generate, init_tracing, load_settings, show_config, Cli,
    Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_tracing(&settings)?;

    match cli.command {
        Commands::Embed {
            texts,
            backend,
            json,
        } => {
            handle_embed(settings, texts, backend.as_deref(), json.as_deref()).await?;
        }
        Commands::Generate {
            prompt,
            max_tokens,
            stream,
        } => {
            handle_generate(settings, prompt, max_tokens, stream).await?;
        }
        Commands::Fetch => {
            handle_fetch(settings).await?;
        }
        Commands::Config => {
            show_config(&settings)?;
        }
    }

    Ok(())
}
