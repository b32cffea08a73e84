//! Request payloads accepted at the transport boundary.
//!
//! Transports accept an `input` field holding either a single string or a
//! list of strings. That shape is resolved here, once, into [`EmbedInput`];
//! the inference crates only ever see the typed variant.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Texts to embed, as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedInput {
    /// A single text; yields exactly one vector
    SingleText(String),
    /// An ordered list of texts; yields one vector per text, in order
    TextList(Vec<String>),
}

impl EmbedInput {
    /// Build an input from positional texts: one text is a `SingleText`.
    pub fn from_texts(mut texts: Vec<String>) -> Self {
        if texts.len() == 1 {
            Self::SingleText(texts.remove(0))
        } else {
            Self::TextList(texts)
        }
    }

    /// Parse a `{"input": ...}` request body.
    pub fn from_request_json(body: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct EmbedRequest {
            input: EmbedInput,
        }

        let request: EmbedRequest = serde_json::from_str(body)?;
        Ok(request.input)
    }

    /// Number of texts carried by this input.
    pub fn len(&self) -> usize {
        match self {
            Self::SingleText(_) => 1,
            Self::TextList(texts) => texts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into the ordered list of texts.
    pub fn into_texts(self) -> Vec<String> {
        match self {
            Self::SingleText(text) => vec![text],
            Self::TextList(texts) => texts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_string_request() {
        let input = EmbedInput::from_request_json(r#"{"input": "ping"}"#).unwrap();
        assert_eq!(input, EmbedInput::SingleText("ping".to_string()));
        assert_eq!(input.into_texts(), vec!["ping".to_string()]);
    }

    #[test]
    fn test_list_request() {
        let input = EmbedInput::from_request_json(r#"{"input": ["a", "b"]}"#).unwrap();
        assert_eq!(
            input,
            EmbedInput::TextList(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn test_empty_list_request() {
        let input = EmbedInput::from_request_json(r#"{"input": []}"#).unwrap();
        assert!(input.is_empty());
    }

    #[test]
    fn test_rejects_non_string_input() {
        assert!(EmbedInput::from_request_json(r#"{"input": 42}"#).is_err());
        assert!(EmbedInput::from_request_json(r#"{"text": "x"}"#).is_err());
    }

    #[test]
    fn test_from_texts() {
        let single = EmbedInput::from_texts(vec!["x".to_string()]);
        assert!(matches!(single, EmbedInput::SingleText(_)));

        let many = EmbedInput::from_texts(vec!["x".to_string(), "y".to_string()]);
        assert!(matches!(many, EmbedInput::TextList(ref t) if t.len() == 2));
    }
}
