//! Token vocabularies.
//!
//! A [`Vocabulary`] is loaded once, never mutated, and owned by the
//! tokenizer that loaded it. Two on-disk formats are supported: the
//! line-per-token `vocab.txt` used by WordPiece models, and the
//! `tokenizer.json` format whose `added_tokens` table names the
//! end-of-sequence marker.

use std::collections::HashMap;
use std::path::Path;

use tokenizers::models::wordpiece::WordPiece;
use tokenizers::Tokenizer;
use tracing::{debug, warn};

use crate::error::InferenceError;

/// Fallback ids used by BERT-style vocabularies when a special is absent.
const DEFAULT_UNKNOWN_ID: u32 = 100;
const DEFAULT_START_ID: u32 = 101;
const DEFAULT_SEPARATOR_ID: u32 = 102;
const DEFAULT_PAD_ID: u32 = 0;

/// Designated special token ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// Substituted for text with no vocabulary entry
    pub unknown: u32,
    /// Sequence-start marker (`[CLS]`)
    pub start: Option<u32>,
    /// Sequence-separator marker (`[SEP]`)
    pub separator: Option<u32>,
    pub pad: u32,
    /// `None` disables end-of-sequence detection for this vocabulary
    pub end_of_sequence: Option<u32>,
}

/// Immutable bidirectional mapping between token strings and ids.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
    specials: SpecialTokens,
}

impl Vocabulary {
    /// Build a vocabulary, rejecting two tokens that share one id.
    pub fn new(
        token_to_id: HashMap<String, u32>,
        specials: SpecialTokens,
    ) -> Result<Self, InferenceError> {
        let mut id_to_token = HashMap::with_capacity(token_to_id.len());
        for (token, &id) in &token_to_id {
            if let Some(previous) = id_to_token.insert(id, token.clone()) {
                return Err(InferenceError::VocabularyLoad(format!(
                    "id {id} assigned to both {previous:?} and {token:?}"
                )));
            }
        }

        Ok(Self {
            token_to_id,
            id_to_token,
            specials,
        })
    }

    /// Build a WordPiece vocabulary, resolving `[UNK]`, `[CLS]`, `[SEP]` and
    /// `[PAD]` by name with the conventional BERT ids as fallback.
    pub fn wordpiece(token_to_id: HashMap<String, u32>) -> Result<Self, InferenceError> {
        let get = |token: &str, default: u32| token_to_id.get(token).copied().unwrap_or(default);
        let specials = SpecialTokens {
            unknown: get("[UNK]", DEFAULT_UNKNOWN_ID),
            start: Some(get("[CLS]", DEFAULT_START_ID)),
            separator: Some(get("[SEP]", DEFAULT_SEPARATOR_ID)),
            pad: get("[PAD]", DEFAULT_PAD_ID),
            end_of_sequence: None,
        };
        Self::new(token_to_id, specials)
    }

    /// Load a `vocab.txt` file: one token per line, id = line index.
    pub fn from_wordpiece_file(path: &Path) -> Result<Self, InferenceError> {
        let path_str = path.to_str().ok_or_else(|| {
            InferenceError::VocabularyLoad(format!("non UTF-8 vocabulary path: {path:?}"))
        })?;
        let mut tokens = WordPiece::read_file(path_str).map_err(|e| {
            InferenceError::VocabularyLoad(format!("{}: {}", path.display(), e))
        })?;
        // Blank lines still consume an id but never name a token.
        tokens.remove("");
        if tokens.is_empty() {
            return Err(InferenceError::VocabularyLoad(format!(
                "{}: vocabulary is empty",
                path.display()
            )));
        }

        debug!(path = %path.display(), size = tokens.len(), "Loaded WordPiece vocabulary");
        Self::wordpiece(tokens)
    }

    /// Load the model vocabulary from a `tokenizer.json` file.
    ///
    /// Only the base model vocabulary is decodable. The end-of-sequence id is
    /// resolved once from the added-tokens table; if no entry denotes end of
    /// text, end-of-sequence detection stays disabled.
    pub fn from_tokenizer_file(path: &Path) -> Result<Self, InferenceError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            InferenceError::VocabularyLoad(format!("{}: {}", path.display(), e))
        })?;

        let tokens = tokenizer.get_vocab(false);
        if tokens.is_empty() {
            return Err(InferenceError::VocabularyLoad(format!(
                "{}: model vocabulary is empty",
                path.display()
            )));
        }

        let added = tokenizer
            .get_added_tokens_decoder()
            .into_iter()
            .map(|(id, token)| (id, token.content));
        let end_of_sequence = resolve_end_of_sequence(added);
        if end_of_sequence.is_none() {
            warn!(
                path = %path.display(),
                "No end-of-sequence token found; generation stops only on budget"
            );
        }

        let specials = SpecialTokens {
            unknown: 0,
            start: None,
            separator: None,
            pad: 0,
            end_of_sequence,
        };

        debug!(
            path = %path.display(),
            size = tokens.len(),
            eos = ?end_of_sequence,
            "Loaded tokenizer vocabulary"
        );
        Self::new(tokens, specials)
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn specials(&self) -> &SpecialTokens {
        &self.specials
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

/// Pick the end-of-sequence id from an added-tokens table.
///
/// Entries are scanned in id order; the first whose text contains `eos`
/// (case-insensitive) or equals `<|endoftext|>` wins.
pub fn resolve_end_of_sequence(added: impl IntoIterator<Item = (u32, String)>) -> Option<u32> {
    let mut added: Vec<(u32, String)> = added.into_iter().collect();
    added.sort_by_key(|(id, _)| *id);
    added
        .into_iter()
        .find(|(_, content)| {
            content.to_lowercase().contains("eos") || content == "<|endoftext|>"
        })
        .map(|(id, _)| id)
}
