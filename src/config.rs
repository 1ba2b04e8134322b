//! Configuration builders controlling training, corpus ingestion, and encoding.

use std::collections::HashSet;
use std::convert::TryFrom;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{BpeError, Result};

/// Number of single-byte tokens occupying ids `0..=255`.
pub const BASE_VOCAB_SIZE: usize = 256;

/// Special token appended by default, matching the GPT-2 document separator.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Default number of pretokens memoised by a [`crate::Tokenizer`].
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;

/// Configuration for byte-level BPE training.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainerConfig {
    /// Target vocabulary size including the 256 base byte tokens and special tokens.
    pub target_vocab_size: usize,
    /// Minimum aggregate pair count required before a merge is considered.
    pub min_frequency: usize,
    /// Optional hard cap on the number of merges learned.
    pub max_merges: Option<usize>,
    /// Enables per-iteration logging through the `log` facade.
    pub show_progress: bool,
    /// Tokens kept atomic; they receive ids directly after the byte alphabet.
    pub special_tokens: Vec<String>,
}

impl TrainerConfig {
    /// Returns a builder initialised with [`TrainerConfig::default`].
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Number of merges needed to reach the target vocabulary size.
    #[must_use]
    pub fn merge_budget(&self) -> usize {
        let budget = self
            .target_vocab_size
            .saturating_sub(BASE_VOCAB_SIZE + self.special_tokens.len());
        match self.max_merges {
            Some(limit) => budget.min(limit),
            None => budget,
        }
    }

    /// Validates the invariants required for training.
    pub fn validate(&self) -> Result<()> {
        if self.target_vocab_size < BASE_VOCAB_SIZE + self.special_tokens.len() {
            return Err(BpeError::InvalidConfig(format!(
                "target_vocab_size ({}) must be at least 256 + special tokens ({}).",
                self.target_vocab_size,
                self.special_tokens.len()
            )));
        }
        let max_vocab = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
        if self.target_vocab_size > max_vocab {
            return Err(BpeError::InvalidConfig(format!(
                "target_vocab_size ({}) exceeds {max_vocab}, the maximum representable TokenId",
                self.target_vocab_size
            )));
        }
        if self.min_frequency == 0 {
            return Err(BpeError::InvalidConfig(
                "min_frequency must be greater than zero".into(),
            ));
        }
        validate_special_tokens(&self.special_tokens)
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            target_vocab_size: 10_000,
            min_frequency: 1,
            max_merges: None,
            show_progress: true,
            special_tokens: vec![END_OF_TEXT.into()],
        }
    }
}

/// Builder for [`TrainerConfig`].
#[derive(Debug, Default, Clone)]
pub struct TrainerBuilder {
    cfg: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder with [`TrainerConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the desired vocabulary size (including base byte tokens and special tokens).
    #[must_use]
    pub fn target_vocab_size(mut self, value: usize) -> Self {
        self.cfg.target_vocab_size = value;
        self
    }

    /// Sets the minimum merge frequency.
    #[must_use]
    pub fn min_frequency(mut self, value: usize) -> Self {
        self.cfg.min_frequency = value;
        self
    }

    /// Sets a hard limit on learned merges.
    #[must_use]
    pub fn max_merges(mut self, value: Option<usize>) -> Self {
        self.cfg.max_merges = value;
        self
    }

    /// Enables or disables per-iteration logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Overrides the set of special tokens kept out of merge statistics.
    #[must_use]
    pub fn special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.special_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Finalises the builder, returning a validated [`TrainerConfig`].
    pub fn build(mut self) -> Result<TrainerConfig> {
        dedup_in_place(&mut self.cfg.special_tokens);
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration controlling how text corpora are read from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    /// Enables recursive directory traversal.
    pub recursive: bool,
    /// Follows symlinks encountered during traversal.
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_symlinks: false,
        }
    }
}

impl IngestConfig {
    /// Returns a builder initialised with [`IngestConfig::default`].
    #[must_use]
    pub fn builder() -> IngestBuilder {
        IngestBuilder::default()
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug, Default, Clone)]
pub struct IngestBuilder {
    cfg: IngestConfig,
}

impl IngestBuilder {
    /// Enables or disables recursive directory traversal.
    #[must_use]
    pub fn recursive(mut self, enabled: bool) -> Self {
        self.cfg.recursive = enabled;
        self
    }

    /// Enables or disables following of symlinks when traversing directories.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.cfg.follow_symlinks = enabled;
        self
    }

    /// Finalises the builder, returning the [`IngestConfig`].
    pub fn build(self) -> IngestConfig {
        self.cfg
    }
}

/// Options applied when constructing a [`crate::Tokenizer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Special tokens matched verbatim before pattern-based splitting.
    pub special_tokens: Vec<String>,
    /// Maximum number of memoised pretokens; `0` disables the cache.
    pub cache_capacity: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            special_tokens: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl TokenizerConfig {
    /// Creates a configuration for the given special tokens with the default cache size.
    pub fn with_special_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            special_tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Overrides the cache capacity.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

fn validate_special_tokens(tokens: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tokens.len());
    for token in tokens {
        if !seen.insert(token.as_str()) {
            return Err(BpeError::InvalidConfig(format!(
                "special token {token:?} is listed more than once"
            )));
        }
        if token.is_empty() {
            return Err(BpeError::InvalidConfig(
                "special tokens must not be empty".into(),
            ));
        }
        if token.len() == 1 {
            return Err(BpeError::InvalidConfig(format!(
                "special token {token:?} collides with the single-byte base alphabet"
            )));
        }
    }
    Ok(())
}

/// Deduplicates tokens in-place while preserving the first occurrence ordering.
pub fn dedup_in_place(tokens: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(tokens.len());
    tokens.retain(|token| {
        let fresh = seen.insert(token.clone());
        if !fresh {
            warn!("dropping duplicate special token {token:?}");
        }
        fresh
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_special_tokens() {
        let cfg = TrainerConfig::builder()
            .special_tokens(["<|a|>", "<|b|>", "<|a|>"])
            .target_vocab_size(300)
            .show_progress(false)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.special_tokens, vec!["<|a|>", "<|b|>"]);
    }

    #[test]
    fn validate_rejects_vocab_smaller_than_alphabet() {
        let cfg = TrainerConfig {
            target_vocab_size: 256,
            special_tokens: vec![END_OF_TEXT.into()],
            ..TrainerConfig::default()
        };
        let err = cfg.validate().expect_err("validation should fail");
        assert!(matches!(
            err,
            BpeError::InvalidConfig(message) if message.contains("at least 256")
        ));
    }

    #[test]
    fn validate_accepts_exact_minimum() {
        let cfg = TrainerConfig {
            target_vocab_size: 257,
            ..TrainerConfig::default()
        };
        cfg.validate().expect("256 + 1 special token is enough");
        assert_eq!(cfg.merge_budget(), 0);
    }

    #[test]
    fn validate_rejects_single_byte_special_token() {
        let err = TrainerConfig::builder()
            .special_tokens(["x"])
            .build()
            .expect_err("single byte special token");
        assert!(matches!(err, BpeError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_duplicate_special_tokens() {
        let cfg = TrainerConfig {
            target_vocab_size: 300,
            special_tokens: vec!["<|a|>".into(), "<|a|>".into()],
            ..TrainerConfig::default()
        };
        let err = cfg.validate().expect_err("duplicate special token");
        assert!(matches!(
            err,
            BpeError::InvalidConfig(message) if message.contains("more than once")
        ));
    }

    #[test]
    fn merge_budget_honours_cap() {
        let cfg = TrainerConfig::builder()
            .target_vocab_size(1_000)
            .max_merges(Some(10))
            .build()
            .expect("valid");
        assert_eq!(cfg.merge_budget(), 10);
    }

    #[test]
    fn ingest_builder_overrides_defaults() {
        let cfg = IngestConfig::builder()
            .recursive(false)
            .follow_symlinks(true)
            .build();
        assert!(!cfg.recursive);
        assert!(cfg.follow_symlinks);
    }
}
