//! CLI argument parsing for `llmcore`.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Local embeddings and text generation
#[derive(Parser, Debug)]
#[command(name = "llmcore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default <config dir>/llmcore/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed one or more texts and print the vectors as JSON
    Embed {
        /// Texts to embed; one text is a single request, several a list
        #[arg(required_unless_present = "json")]
        texts: Vec<String>,

        /// Override the embedding backend (onnx, safetensors, hash)
        #[arg(short, long)]
        backend: Option<String>,

        /// Raw request body, e.g. '{"input": ["a", "b"]}'
        #[arg(long, conflicts_with = "texts")]
        json: Option<String>,
    },

    /// Generate a continuation of a prompt
    Generate {
        prompt: String,

        /// Token budget (default from config)
        #[arg(short = 'n', long)]
        max_tokens: Option<usize>,

        /// Print text as it is produced
        #[arg(short, long)]
        stream: bool,
    },

    /// Download every artifact the enabled services need
    Fetch,

    /// Print the effective configuration as TOML
    Config,
}
