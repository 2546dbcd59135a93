//! Token estimation for budget accounting

use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

use crate::error::{ContextError, Result};

/// Counts tokens the way the downstream model will
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// cl100k_base tokenizer (GPT-4 / GPT-3.5-turbo family)
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| ContextError::Configuration(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Deterministic word-count approximation (~1.3 tokens per word)
#[derive(Debug, Clone, Copy)]
pub struct WordBasedEstimator {
    tokens_per_word: f64,
}

impl WordBasedEstimator {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator for WordBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }
}

/// Tiktoken when its vocabulary loads, word-based otherwise
pub fn default_estimator() -> Arc<dyn TokenEstimator> {
    match TiktokenEstimator::new() {
        Ok(estimator) => Arc::new(estimator),
        Err(e) => {
            warn!(error = %e, "tiktoken unavailable, falling back to word-based estimation");
            Arc::new(WordBasedEstimator::default())
        }
    }
}
