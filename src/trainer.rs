//! Core training loop producing a vocabulary and ranked merge list from text.

mod index;
mod word;

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Instant;
use std::{fmt, path::Path};

use ahash::AHashMap;
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::{IngestConfig, TrainerBuilder, TrainerConfig};
use crate::corpus::load_text_corpus;
use crate::error::{BpeError, Result};
use crate::merges::MergeRule;
use crate::metrics::{IterationMetrics, StopReason, TrainingMetrics};
use crate::model::{BpeModel, Pair, TokenId};
use crate::pretokenize::{PreTokenizer, Segment};
use crate::vocab::Vocabulary;

use self::index::{PairIndex, WordIdx};
use self::word::Word;

/// High-level façade configuring and executing BPE training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts {
    /// Trained BPE model.
    pub model: BpeModel,
    /// Detailed metrics captured during training.
    pub metrics: TrainingMetrics,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Trains a model on UTF-8 files loaded according to [`IngestConfig`].
    pub fn train_from_paths<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        ingest: &IngestConfig,
    ) -> Result<TrainerArtifacts> {
        let documents = load_text_corpus(inputs, ingest)?;
        self.train_from_texts(&documents)
    }

    /// Trains a model on a single in-memory text.
    pub fn train_from_text(&self, text: &str) -> Result<TrainerArtifacts> {
        self.train_from_texts(&[text])
    }

    /// Trains a model on in-memory documents.
    ///
    /// Documents are independent: no pretoken spans two of them. Special
    /// tokens found in the text are cut out before counting and never take
    /// part in a merge.
    pub fn train_from_texts<S>(&self, texts: &[S]) -> Result<TrainerArtifacts>
    where
        S: AsRef<str> + Sync,
    {
        self.cfg.validate()?;
        let training_start = Instant::now();
        let special_tokens = &self.cfg.special_tokens;
        let pre_tokenizer = PreTokenizer::new(special_tokens)?;

        let counts = count_pretokens(&pre_tokenizer, texts);
        let mut distinct: Vec<(&str, usize)> = counts.into_iter().collect();
        distinct.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let budget = self.cfg.merge_budget();
        let mut metrics = TrainingMetrics::new(budget.min(16_384));
        metrics.pretokens = distinct.iter().map(|(_, count)| count).sum();
        metrics.distinct_words = distinct.len();

        let mut words: Vec<Word> = distinct
            .iter()
            .map(|(piece, count)| Word::from_bytes(piece.as_bytes(), *count))
            .collect();
        drop(distinct);

        let mut token_bytes: Vec<Arc<[u8]>> =
            Vec::with_capacity(self.cfg.target_vocab_size.min(1 << 20));
        token_bytes.extend((0u8..=u8::MAX).map(|b| Arc::<[u8]>::from(vec![b])));
        token_bytes.extend(
            special_tokens
                .iter()
                .map(|token| Arc::<[u8]>::from(token.as_bytes())),
        );
        let mut known: AHashMap<Arc<[u8]>, TokenId> = token_bytes
            .iter()
            .enumerate()
            .map(|(id, bytes)| (Arc::clone(bytes), id as TokenId))
            .collect();

        if self.cfg.show_progress {
            info!(
                "counted {} pretokens ({} distinct) in {:.2?}",
                metrics.pretokens,
                metrics.distinct_words,
                training_start.elapsed()
            );
        }

        let mut index = PairIndex::build(&words, &token_bytes);
        let mut merges: Vec<MergeRule> = Vec::with_capacity(budget);

        while token_bytes.len() < self.cfg.target_vocab_size {
            if self
                .cfg
                .max_merges
                .is_some_and(|limit| merges.len() >= limit)
            {
                metrics.stop_reason = StopReason::MaxMergesReached;
                break;
            }

            let iteration_start = Instant::now();
            let Some((pair, frequency)) = index.pop_best(self.cfg.min_frequency) else {
                debug!(
                    "no pair reaches min_frequency {}; stopping after {} merges",
                    self.cfg.min_frequency,
                    merges.len()
                );
                metrics.stop_reason = StopReason::NoEligiblePairs;
                break;
            };

            let left = Arc::clone(&token_bytes[pair.0 as usize]);
            let right = Arc::clone(&token_bytes[pair.1 as usize]);
            let mut merged = Vec::with_capacity(left.len() + right.len());
            merged.extend_from_slice(&left);
            merged.extend_from_slice(&right);
            let existing = known.get(merged.as_slice()).copied();
            let new_id = match existing {
                Some(id) => id,
                None => TokenId::try_from(token_bytes.len()).map_err(|_| {
                    BpeError::Internal("vocabulary size exceeded u32::MAX".into())
                })?,
            };

            let touched = index.take_words(pair);
            let step = merge_words(&mut words, &touched, pair, new_id, &mut index);
            if step.changed == 0 {
                debug!("pair {pair:?} had no live occurrences; skipping");
                continue;
            }

            if existing.is_none() {
                let bytes: Arc<[u8]> = Arc::from(merged);
                known.insert(Arc::clone(&bytes), new_id);
                token_bytes.push(bytes);
            } else {
                debug!(
                    "merge {:?} + {:?} reuses existing token {new_id}",
                    String::from_utf8_lossy(&left),
                    String::from_utf8_lossy(&right)
                );
            }
            // Heap entries for pairs containing `new_id` need its bytes.
            for (changed, delta) in step.deltas {
                index.apply_delta(changed, delta, &token_bytes);
            }
            merges.push((left.to_vec(), right.to_vec()));

            let rank = merges.len() - 1;
            if self.cfg.show_progress {
                info!(
                    "merge {:>6} freq {:>8} words {:>8} distinct_pairs {:>8} vocab {:>8}",
                    rank,
                    frequency,
                    step.changed,
                    index.distinct_pairs(),
                    token_bytes.len()
                );
            }
            metrics.iterations.push(IterationMetrics {
                rank,
                frequency,
                words_touched: step.changed,
                distinct_pairs: index.distinct_pairs(),
                elapsed: iteration_start.elapsed(),
            });
        }

        metrics.total_duration = training_start.elapsed();
        if self.cfg.show_progress {
            info!(
                "completed {} merges in {:.2?}; vocab size {} ({:?})",
                merges.len(),
                metrics.total_duration,
                token_bytes.len(),
                metrics.stop_reason
            );
        }

        let vocab = Vocabulary::from_entries(
            token_bytes
                .iter()
                .enumerate()
                .map(|(id, bytes)| (id as TokenId, bytes.to_vec())),
        )?;
        let model = BpeModel::new(vocab, merges, special_tokens.clone());
        Ok(TrainerArtifacts { model, metrics })
    }
}

/// Counts every pretoken of every non-special segment, in parallel.
fn count_pretokens<'a, S>(
    pre_tokenizer: &PreTokenizer,
    texts: &'a [S],
) -> FxHashMap<&'a str, usize>
where
    S: AsRef<str> + Sync,
{
    let segments: Vec<&'a str> = texts
        .iter()
        .flat_map(|text| pre_tokenizer.segments(text.as_ref()))
        .filter_map(|segment| match segment {
            Segment::Text(text) => Some(text),
            Segment::Special(_) => None,
        })
        .collect();

    segments
        .into_par_iter()
        .map(|segment| {
            let mut local: FxHashMap<&'a str, usize> = FxHashMap::default();
            for piece in pre_tokenizer.split_text(segment) {
                *local.entry(piece).or_insert(0) += 1;
            }
            local
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (piece, count) in local {
                *acc.entry(piece).or_insert(0) += count;
            }
            acc
        })
}

/// Corpus-weighted count changes from one merge step.
struct MergeStep {
    changed: usize,
    deltas: FxHashMap<Pair, i64>,
}

/// Rewrites the words holding `pair` and records where new pairs now occur.
fn merge_words(
    words: &mut [Word],
    touched: &[WordIdx],
    pair: Pair,
    new_id: TokenId,
    index: &mut PairIndex,
) -> MergeStep {
    let mut step = MergeStep {
        changed: 0,
        deltas: FxHashMap::default(),
    };
    for &word_idx in touched {
        let word = &mut words[word_idx as usize];
        let outcome = word.merge(pair.0, pair.1, new_id);
        if outcome.merges == 0 {
            continue;
        }
        step.changed += 1;
        let weight = word.count() as i64;
        for (changed, delta) in outcome.deltas {
            *step.deltas.entry(changed).or_insert(0) += delta * weight;
            if delta > 0 {
                index.add_occurrence(changed, word_idx);
            }
        }
    }
    step
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE model with vocab size {}", self.model.vocab_size())?;
        writeln!(f, "Merges: {}", self.model.merges().len())?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}
