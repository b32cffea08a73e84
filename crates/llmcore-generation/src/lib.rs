//! # llmcore-generation
//!
//! Greedy local text generation.
//!
//! The prompt is encoded with whole-word lookup, front-truncated to the
//! context window, then extended one arg-max token at a time until the
//! end-of-sequence id, the token budget or a cancel request.
//!
//! ## Usage
//! ```rust,ignore
//! use llmcore_generation::Generator;
//! use tokio_util::sync::CancellationToken;
//!
//! let generator = Generator::load(&provider, &settings.generation)?;
//! let completion = generator.generate("the cat sat", 16, &CancellationToken::new())?;
//! println!("{}", completion.text);
//! ```

pub mod decode;
pub mod error;
pub mod generator;
pub mod state;

pub use decode::{argmax, last_position_logits, select_next};
pub use error::GenerationError;
pub use generator::{artifact_keys, register_artifacts, Generator};
pub use state::{Completion, FinishReason, GenerationState, Phase};
