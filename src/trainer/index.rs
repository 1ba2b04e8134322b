use std::cmp::Ordering;
use std::collections::{hash_map::Entry, BinaryHeap};
use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use super::word::Word;
use crate::model::{Pair, TokenId};

/// Index of a [`Word`] inside the trainer's word table.
pub(crate) type WordIdx = u32;

/// Heap entry ordering candidates by frequency, then by byte-wise greatest pair.
#[derive(Clone, Debug, Eq, PartialEq)]
struct PairScore {
    frequency: usize,
    left: Arc<[u8]>,
    right: Arc<[u8]>,
    pair: Pair,
}

impl Ord for PairScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frequency
            .cmp(&other.frequency)
            .then_with(|| self.left.cmp(&other.left))
            .then_with(|| self.right.cmp(&other.right))
    }
}

impl PartialOrd for PairScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Corpus-wide pair statistics: aggregate counts, the words containing each
/// pair, and a max-heap of candidates validated lazily against `counts`.
#[derive(Debug, Default)]
pub(crate) struct PairIndex {
    counts: FxHashMap<Pair, usize>,
    occurrences: FxHashMap<Pair, FxHashSet<WordIdx>>,
    heap: BinaryHeap<PairScore>,
}

#[derive(Default)]
struct LocalCounts {
    counts: FxHashMap<Pair, usize>,
    occurrences: FxHashMap<Pair, FxHashSet<WordIdx>>,
}

impl PairIndex {
    /// Counts every adjacent pair of every word in one parallel pass.
    pub(crate) fn build(words: &[Word], token_bytes: &[Arc<[u8]>]) -> Self {
        let merged = words
            .par_iter()
            .enumerate()
            .fold(LocalCounts::default, |mut local, (idx, word)| {
                word.for_each_pair(|pair| {
                    *local.counts.entry(pair).or_insert(0) += word.count();
                    local
                        .occurrences
                        .entry(pair)
                        .or_default()
                        .insert(idx as WordIdx);
                });
                local
            })
            .reduce(LocalCounts::default, |mut acc, local| {
                for (pair, count) in local.counts {
                    *acc.counts.entry(pair).or_insert(0) += count;
                }
                for (pair, words) in local.occurrences {
                    acc.occurrences.entry(pair).or_default().extend(words);
                }
                acc
            });

        let mut index = Self {
            counts: merged.counts,
            occurrences: merged.occurrences,
            heap: BinaryHeap::new(),
        };
        let seeds: Vec<(Pair, usize)> = index.counts.iter().map(|(&p, &c)| (p, c)).collect();
        index.heap.reserve(seeds.len());
        for (pair, count) in seeds {
            index.push(pair, count, token_bytes);
        }
        index
    }

    /// Number of pairs that currently have a positive count.
    pub(crate) fn distinct_pairs(&self) -> usize {
        self.counts.len()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, pair: Pair) -> usize {
        self.counts.get(&pair).copied().unwrap_or(0)
    }

    /// Pops the best pair whose count is at least `min_frequency`, discarding stale entries.
    pub(crate) fn pop_best(&mut self, min_frequency: usize) -> Option<(Pair, usize)> {
        while let Some(score) = self.heap.pop() {
            let current = self.counts.get(&score.pair).copied().unwrap_or(0);
            if current == 0 || current != score.frequency {
                continue;
            }
            if current < min_frequency {
                continue;
            }
            return Some((score.pair, current));
        }
        None
    }

    /// Takes the set of words recorded as containing `pair`, sorted for deterministic replay.
    pub(crate) fn take_words(&mut self, pair: Pair) -> Vec<WordIdx> {
        let mut words: Vec<WordIdx> = self
            .occurrences
            .remove(&pair)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        words.sort_unstable();
        words
    }

    /// Records that `word` now contains `pair`.
    pub(crate) fn add_occurrence(&mut self, pair: Pair, word: WordIdx) {
        self.occurrences.entry(pair).or_default().insert(word);
    }

    /// Applies an aggregated count change and re-queues the pair at its new count.
    pub(crate) fn apply_delta(&mut self, pair: Pair, delta: i64, token_bytes: &[Arc<[u8]>]) {
        match delta.cmp(&0) {
            Ordering::Greater => {
                let amount = delta.unsigned_abs() as usize;
                let count = self.counts.entry(pair).or_insert(0);
                *count += amount;
                let count = *count;
                self.push(pair, count, token_bytes);
            }
            Ordering::Less => {
                let amount = delta.unsigned_abs() as usize;
                if let Entry::Occupied(mut occupied) = self.counts.entry(pair) {
                    let remaining = occupied.get().saturating_sub(amount);
                    if remaining == 0 {
                        occupied.remove();
                        self.occurrences.remove(&pair);
                    } else {
                        *occupied.get_mut() = remaining;
                        self.push(pair, remaining, token_bytes);
                    }
                }
            }
            Ordering::Equal => {}
        }
    }

    fn push(&mut self, pair: Pair, frequency: usize, token_bytes: &[Arc<[u8]>]) {
        let (left, right): (TokenId, TokenId) = pair;
        self.heap.push(PairScore {
            frequency,
            left: Arc::clone(&token_bytes[left as usize]),
            right: Arc::clone(&token_bytes[right as usize]),
            pair,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_bytes() -> Vec<Arc<[u8]>> {
        (0u8..=u8::MAX).map(|b| Arc::from(vec![b])).collect()
    }

    #[test]
    fn build_weights_pairs_by_word_count() {
        let words = vec![Word::from_bytes(b"ab", 3), Word::from_bytes(b"abc", 2)];
        let index = PairIndex::build(&words, &base_bytes());
        assert_eq!(index.count((97, 98)), 5);
        assert_eq!(index.count((98, 99)), 2);
        assert_eq!(index.distinct_pairs(), 2);
    }

    #[test]
    fn ties_break_towards_greatest_pair_bytes() {
        let words = vec![Word::from_bytes(b"ab", 1), Word::from_bytes(b"cd", 1)];
        let mut index = PairIndex::build(&words, &base_bytes());
        assert_eq!(index.pop_best(1), Some(((99, 100), 1)));
        assert_eq!(index.pop_best(1), Some(((97, 98), 1)));
        assert_eq!(index.pop_best(1), None);
    }

    #[test]
    fn stale_entries_are_skipped() {
        let bytes = base_bytes();
        let words = vec![Word::from_bytes(b"ab", 4), Word::from_bytes(b"cd", 3)];
        let mut index = PairIndex::build(&words, &bytes);
        index.apply_delta((97, 98), -2, &bytes);
        assert_eq!(index.pop_best(1), Some(((99, 100), 3)));
        assert_eq!(index.pop_best(1), Some(((97, 98), 2)));
    }

    #[test]
    fn min_frequency_filters_candidates() {
        let words = vec![Word::from_bytes(b"ab", 1)];
        let mut index = PairIndex::build(&words, &base_bytes());
        assert_eq!(index.pop_best(2), None);
    }

    #[test]
    fn take_words_returns_sorted_indices() {
        let words = vec![
            Word::from_bytes(b"xab", 1),
            Word::from_bytes(b"zz", 1),
            Word::from_bytes(b"ab", 1),
        ];
        let mut index = PairIndex::build(&words, &base_bytes());
        assert_eq!(index.take_words((97, 98)), vec![0, 2]);
        assert!(index.take_words((97, 98)).is_empty());
    }
}
