//! # llmcore-types
//!
//! Shared types for the llmcore local inference services.
//!
//! - Settings: layered configuration (defaults, config file, env vars)
//! - Errors: configuration and request validation failures
//! - Requests: transport-boundary request payloads resolved into typed variants

pub mod config;
pub mod error;
pub mod request;

pub use config::{
    ArtifactSettings, EmbeddingBackend, EmbeddingSettings, GenerationSettings, Settings,
};
pub use error::ConfigError;
pub use request::EmbedInput;
