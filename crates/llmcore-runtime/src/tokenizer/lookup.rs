//! Whole-word vocabulary lookup encoder for the generation path.
//!
//! No sub-word merges are applied: each whitespace-delimited word either
//! names a vocabulary entry or becomes id 0.

use std::path::Path;

use crate::error::InferenceError;
use crate::sequence::TokenSequence;
use crate::tokenizer::TextTokenizer;
use crate::vocab::Vocabulary;

/// Id substituted for words missing from the vocabulary.
const PLACEHOLDER_ID: u32 = 0;

#[derive(Debug, Clone)]
pub struct LookupTokenizer {
    vocab: Vocabulary,
}

impl LookupTokenizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        Ok(Self::new(Vocabulary::from_tokenizer_file(path)?))
    }

    /// Resolved end-of-sequence id, if the vocabulary defines one.
    pub fn end_of_sequence(&self) -> Option<u32> {
        self.vocab.specials().end_of_sequence
    }

    pub fn is_end_of_sequence(&self, id: u32) -> bool {
        self.end_of_sequence() == Some(id)
    }
}

impl TextTokenizer for LookupTokenizer {
    fn encode(&self, text: &str) -> TokenSequence {
        let mut ids: Vec<u32> = text
            .split_whitespace()
            .map(|word| self.vocab.token_id(word).unwrap_or(PLACEHOLDER_ID))
            .collect();
        if ids.is_empty() {
            ids.push(PLACEHOLDER_ID);
        }
        TokenSequence::new(ids)
    }

    fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter_map(|&id| self.vocab.token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}
