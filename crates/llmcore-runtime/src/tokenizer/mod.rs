//! Text tokenizers.
//!
//! Both variants share the [`Vocabulary`](crate::vocab::Vocabulary)
//! abstraction:
//! - [`WordPieceTokenizer`] for the embedding path
//! - [`LookupTokenizer`] for the generation path (whole-word vocabulary lookup)

mod lookup;
mod wordpiece;

pub use lookup::LookupTokenizer;
pub use wordpiece::{basic_tokens, WordPieceTokenizer, CONTINUATION_PREFIX};

use crate::sequence::TokenSequence;
use crate::vocab::Vocabulary;

/// Shared tokenizer contract.
///
/// `encode` never returns an empty sequence for the built-in tokenizers.
/// `decode` skips ids with no token string and need not invert `encode`.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> TokenSequence;

    fn decode(&self, ids: &[u32]) -> String;

    fn vocabulary(&self) -> &Vocabulary;
}
