//! Uncased WordPiece encoder.

use std::path::Path;

use crate::error::InferenceError;
use crate::sequence::TokenSequence;
use crate::tokenizer::TextTokenizer;
use crate::vocab::Vocabulary;

/// Marker prepended to every non-initial piece of a word.
pub const CONTINUATION_PREFIX: &str = "##";

/// Split lower-cased text into maximal runs of letters and digits.
///
/// Every other character acts as a separator and is dropped.
pub fn basic_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Greedy longest-prefix WordPiece tokenizer with `[CLS]`/`[SEP]` wrapping.
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: Vocabulary,
    max_length: usize,
    start_id: u32,
    separator_id: u32,
}

impl WordPieceTokenizer {
    /// Wrap a vocabulary; it must define sequence-start and separator ids.
    pub fn new(vocab: Vocabulary, max_length: usize) -> Result<Self, InferenceError> {
        let specials = *vocab.specials();
        let (Some(start_id), Some(separator_id)) = (specials.start, specials.separator) else {
            return Err(InferenceError::VocabularyLoad(
                "WordPiece vocabulary lacks sequence-start or separator tokens".to_string(),
            ));
        };
        if max_length == 0 {
            return Err(InferenceError::EncodingDegenerate(
                "maximum length must be > 0".to_string(),
            ));
        }

        Ok(Self {
            vocab,
            max_length,
            start_id,
            separator_id,
        })
    }

    /// Load from a `vocab.txt` file.
    pub fn from_file(path: &Path, max_length: usize) -> Result<Self, InferenceError> {
        Self::new(Vocabulary::from_wordpiece_file(path)?, max_length)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Piece ids for `text` without the special-token wrapping.
    ///
    /// Empty exactly when `text` contains no letters or digits.
    pub fn pieces(&self, text: &str) -> Vec<u32> {
        let mut ids = Vec::new();
        for word in basic_tokens(text) {
            self.push_word_pieces(&word, &mut ids);
        }
        ids
    }

    /// Wrap piece ids as `[CLS] pieces [SEP]`, truncated on the right.
    pub fn wrap(&self, pieces: &[u32]) -> TokenSequence {
        let mut ids = Vec::with_capacity(pieces.len() + 2);
        ids.push(self.start_id);
        ids.extend_from_slice(pieces);
        ids.push(self.separator_id);

        let mut sequence = TokenSequence::new(ids);
        sequence.truncate_tail(self.max_length);
        sequence
    }

    // Longest prefix first. The first position that matches nothing emits a
    // single unknown id and abandons the rest of the word.
    fn push_word_pieces(&self, word: &str, out: &mut Vec<u32>) {
        let mut rest = word;
        let mut first = true;

        while !rest.is_empty() {
            let mut ends: Vec<usize> = rest.char_indices().map(|(i, _)| i).skip(1).collect();
            ends.push(rest.len());

            let matched = ends.into_iter().rev().find_map(|end| {
                let piece = &rest[..end];
                let id = if first {
                    self.vocab.token_id(piece)
                } else {
                    self.vocab
                        .token_id(&format!("{CONTINUATION_PREFIX}{piece}"))
                };
                id.map(|id| (id, end))
            });

            match matched {
                Some((id, end)) => {
                    out.push(id);
                    rest = &rest[end..];
                    first = false;
                }
                None => {
                    out.push(self.vocab.specials().unknown);
                    return;
                }
            }
        }
    }
}

impl TextTokenizer for WordPieceTokenizer {
    fn encode(&self, text: &str) -> TokenSequence {
        self.wrap(&self.pieces(text))
    }

    fn decode(&self, ids: &[u32]) -> String {
        let mut text = String::new();
        for token in ids.iter().filter_map(|&id| self.vocab.token(id)) {
            match token.strip_prefix(CONTINUATION_PREFIX) {
                Some(piece) => text.push_str(piece),
                None => {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(token);
                }
            }
        }
        text
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tokenizer(max_length: usize) -> WordPieceTokenizer {
        let tokens = [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "hello", "world", "play", "##ing", "##s", "un",
            "##aff", "##able", "x",
        ];
        let map: HashMap<String, u32> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        WordPieceTokenizer::new(Vocabulary::wordpiece(map).unwrap(), max_length).unwrap()
    }

    #[test]
    fn test_basic_tokens_lowercases_and_splits() {
        assert_eq!(
            basic_tokens("Hello, World! it's 42x"),
            vec!["hello", "world", "it", "s", "42x"]
        );
        assert!(basic_tokens("  ...  ").is_empty());
    }

    #[test]
    fn test_encode_wraps_with_specials() {
        let tok = tokenizer(16);
        assert_eq!(tok.encode("Hello world").ids(), &[2, 4, 5, 3]);
    }

    #[test]
    fn test_continuation_pieces() {
        let tok = tokenizer(16);
        assert_eq!(tok.pieces("playing plays"), vec![6, 7, 6, 8]);
        assert_eq!(tok.pieces("unaffable"), vec![9, 10, 11]);
    }

    #[test]
    fn test_unknown_word_emits_single_unknown() {
        let tok = tokenizer(16);
        assert_eq!(tok.pieces("zzz"), vec![1]);
    }

    #[test]
    fn test_first_failure_abandons_rest_of_word() {
        let tok = tokenizer(16);
        // "play" matches, "q" has no continuation entry: unknown, then stop.
        assert_eq!(tok.pieces("playqing"), vec![6, 1]);
    }

    #[test]
    fn test_truncates_to_max_length() {
        let tok = tokenizer(4);
        let seq = tok.encode("hello world hello world hello");
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.ids(), &[2, 4, 5, 4]);
    }

    #[test]
    fn test_empty_text_still_encodes_specials() {
        let tok = tokenizer(8);
        assert_eq!(tok.encode("").ids(), &[2, 3]);
        assert!(tok.pieces("").is_empty());
    }

    #[test]
    fn test_multibyte_words() {
        let tok = tokenizer(8);
        // No entry for the accented word; must not split inside a char.
        assert_eq!(tok.pieces("héllo"), vec![1]);
    }

    #[test]
    fn test_decode_joins_pieces() {
        let tok = tokenizer(16);
        let seq = tok.encode("playing hello");
        assert_eq!(tok.decode(seq.ids()), "[CLS] playing hello [SEP]");
        assert_eq!(tok.decode(&[999, 4]), "hello");
    }

    #[test]
    fn test_requires_special_tokens() {
        let map = HashMap::from([("a".to_string(), 0)]);
        let specials = crate::vocab::SpecialTokens {
            unknown: 0,
            start: None,
            separator: None,
            pad: 0,
            end_of_sequence: None,
        };
        let vocab = Vocabulary::new(map, specials).unwrap();
        assert!(WordPieceTokenizer::new(vocab, 8).is_err());
    }
}
