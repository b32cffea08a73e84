//! `llmcore` library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (embed, generate, fetch, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    handle_embed, handle_fetch, handle_generate, init_tracing, load_settings, show_config,
};
