//! Counters and timings recorded while learning merges.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the merge loop stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// The vocabulary grew to `target_vocab_size`.
    TargetVocabReached,
    /// The configured merge cap was reached before the target vocabulary size.
    MaxMergesReached,
    /// No pair met the minimum frequency; the corpus is exhausted.
    NoEligiblePairs,
}

/// Metrics captured for each accepted merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationMetrics {
    /// Rank assigned to the merge (0-indexed).
    pub rank: usize,
    /// Aggregate count of the selected pair.
    pub frequency: usize,
    /// Number of distinct word entries rewritten by the merge.
    pub words_touched: usize,
    /// Count of distinct pairs with a positive count after the merge.
    pub distinct_pairs: usize,
    /// Wall time spent on this merge.
    pub elapsed: Duration,
}

/// Summary of one call to the trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Number of pretokens seen in the corpus, special tokens excluded.
    pub pretokens: usize,
    /// Number of distinct pretokens (word entries).
    pub distinct_words: usize,
    /// Per-merge snapshots accrued during training.
    pub iterations: Vec<IterationMetrics>,
    /// Wall time from counting to the last merge.
    pub total_duration: Duration,
    /// See [`StopReason`].
    pub stop_reason: StopReason,
}

impl TrainingMetrics {
    /// Empty metrics with room for `capacity` iterations.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pretokens: 0,
            distinct_words: 0,
            iterations: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
            stop_reason: StopReason::TargetVocabReached,
        }
    }
}
