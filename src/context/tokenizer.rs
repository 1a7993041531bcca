//! Tokenizer capability used for context budgeting.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::ContextError;

/// Text ↔ token conversion.
pub trait Tokenizer: Send + Sync {
    /// Encodes text into tokens.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decodes tokens back into text. `None` if the tokens do not form
    /// valid text on their own (e.g. a split multi-byte character).
    fn decode(&self, tokens: &[u32]) -> Option<String>;

    /// Decodes tokens, replacing bytes of split characters with U+FFFD.
    fn decode_lossy(&self, tokens: &[u32]) -> String {
        self.decode(tokens).unwrap_or_default()
    }

    /// Counts tokens in text.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` tokenizer from `tiktoken-rs`.
#[derive(Clone)]
pub struct TiktokenTokenizer {
    bpe: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Loads the `cl100k_base` encoding.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Tokenizer`] if the encoding cannot be built.
    pub fn cl100k() -> Result<Self, ContextError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ContextError::Tokenizer {
            message: e.to_string(),
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TiktokenTokenizer(cl100k_base)")
    }
}

impl Tokenizer for TiktokenTokenizer {
    #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    #[allow(clippy::unnecessary_cast)]
    fn decode(&self, tokens: &[u32]) -> Option<String> {
        self.bpe.decode(tokens.iter().map(|&t| t as _).collect()).ok()
    }

    #[allow(clippy::unnecessary_cast, clippy::used_underscore_items)]
    fn decode_lossy(&self, tokens: &[u32]) -> String {
        if let Some(text) = self.decode(tokens) {
            return text;
        }
        // Only reached for tokens produced by `encode`, which are all in the vocabulary.
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.iter().map(|&t| t as _).collect())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
