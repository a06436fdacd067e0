//! Token counting with the tokenizer associated with a model.
//!
//! Encoders are expensive to build, so each one is constructed once per model
//! identifier and shared afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};

/// Counts tokens using tiktoken encodings.
///
/// Unknown model identifiers fail with [`Error::UnsupportedModel`]; there is
/// no fallback encoding, so a count is either exact or absent.
#[derive(Default)]
pub struct TokenCounter {
    encoders: Mutex<HashMap<String, Arc<CoreBPE>>>,
}

impl TokenCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tokens `text` occupies for `model`.
    pub fn count_tokens(&self, model: &str, text: &str) -> Result<usize> {
        let bpe = self.encoder(model)?;
        Ok(bpe.encode_with_special_tokens(text).len())
    }

    fn encoder(&self, model: &str) -> Result<Arc<CoreBPE>> {
        let mut encoders = self
            .encoders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(bpe) = encoders.get(model) {
            return Ok(Arc::clone(bpe));
        }
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|err| {
            tracing::debug!(model, error = %err, "no tokenizer for model");
            Error::unsupported_model(model)
        })?;
        let bpe = Arc::new(bpe);
        encoders.insert(model.to_string(), Arc::clone(&bpe));
        Ok(bpe)
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self
            .encoders
            .lock()
            .map(|encoders| encoders.len())
            .unwrap_or(0);
        f.debug_struct("TokenCounter")
            .field("cached_encoders", &cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_known_model() {
        let counter = TokenCounter::new();
        let count = counter.count_tokens("gpt-4-1106-preview", "hello").unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_text_is_zero() {
        let counter = TokenCounter::new();
        assert_eq!(counter.count_tokens("gpt-4", "").unwrap(), 0);
    }

    #[test]
    fn longer_text_counts_more() {
        let counter = TokenCounter::new();
        let short = counter.count_tokens("gpt-3.5-turbo", "Hi").unwrap();
        let long = counter
            .count_tokens("gpt-3.5-turbo", "Hi there, how are you doing today?")
            .unwrap();
        assert!(long > short);
    }

    #[test]
    fn unknown_model_is_unsupported() {
        let counter = TokenCounter::new();
        let err = counter.count_tokens("definitely-not-a-model", "hello").unwrap_err();
        assert!(err.is_unsupported_model());
    }

    #[test]
    fn encoders_are_cached() {
        let counter = TokenCounter::new();
        counter.count_tokens("gpt-4", "a").unwrap();
        counter.count_tokens("gpt-4", "b").unwrap();
        assert_eq!(counter.encoders.lock().unwrap().len(), 1);
    }
}
