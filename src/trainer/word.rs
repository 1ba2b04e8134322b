use crate::model::{Pair, TokenId};

/// Outcome of merging a specific pair within a [`Word`].
#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    /// Number of pair occurrences replaced inside the word.
    pub(crate) merges: usize,
    /// Pair count deltas emitted by the merge, per single occurrence of the word.
    /// Negative values are destroyed adjacencies, positive values newly formed ones.
    pub(crate) deltas: Vec<(Pair, i64)>,
}

/// Distinct pretoken seen during training, stored as its current symbol ids.
#[derive(Debug, Clone)]
pub(crate) struct Word {
    symbols: Vec<TokenId>,
    count: usize,
}

impl Word {
    /// Builds a word from a pretoken's bytes; every byte starts as its own symbol.
    pub(crate) fn from_bytes(bytes: &[u8], count: usize) -> Self {
        Self {
            symbols: bytes.iter().map(|&b| TokenId::from(b)).collect(),
            count,
        }
    }

    /// Number of occurrences of this pretoken in the corpus.
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub(crate) fn symbols(&self) -> &[TokenId] {
        &self.symbols
    }

    /// Invokes the provided closure for each adjacent symbol pair, left to right.
    pub(crate) fn for_each_pair<F>(&self, mut f: F)
    where
        F: FnMut(Pair),
    {
        for window in self.symbols.windows(2) {
            f((window[0], window[1]));
        }
    }

    /// Replaces every non-overlapping left-to-right occurrence of `(left, right)`
    /// with `replacement` and reports the adjacency changes.
    pub(crate) fn merge(
        &mut self,
        left: TokenId,
        right: TokenId,
        replacement: TokenId,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if self.symbols.len() < 2 {
            return outcome;
        }

        let len = self.symbols.len();
        let mut read = 0usize;
        let mut write = 0usize;
        while read < len {
            let matches =
                read + 1 < len && self.symbols[read] == left && self.symbols[read + 1] == right;
            if !matches {
                self.symbols[write] = self.symbols[read];
                write += 1;
                read += 1;
                continue;
            }

            // `write - 1` already holds the rewritten predecessor, which keeps the
            // deltas correct for runs such as `a a a a` merged on `(a, a)`.
            let prev = write.checked_sub(1).map(|idx| self.symbols[idx]);
            let next = self.symbols.get(read + 2).copied();

            if let Some(prev) = prev {
                outcome.deltas.push(((prev, left), -1));
                outcome.deltas.push(((prev, replacement), 1));
            }
            outcome.deltas.push(((left, right), -1));
            if let Some(next) = next {
                outcome.deltas.push(((right, next), -1));
                outcome.deltas.push(((replacement, next), 1));
            }

            self.symbols[write] = replacement;
            write += 1;
            read += 2;
            outcome.merges += 1;
        }
        self.symbols.truncate(write);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(deltas: &[(Pair, i64)], pair: Pair) -> i64 {
        deltas
            .iter()
            .filter(|(p, _)| *p == pair)
            .map(|(_, d)| d)
            .sum()
    }

    #[test]
    fn merge_replaces_all_pairs() {
        let mut word = Word::from_bytes(&[1, 2, 1, 2, 3], 1);
        let result = word.merge(1, 2, 300);
        assert_eq!(result.merges, 2);
        assert_eq!(word.symbols(), &[300, 300, 3]);
        assert_eq!(net(&result.deltas, (1, 2)), -2);
        assert_eq!(net(&result.deltas, (2, 1)), -1);
        assert_eq!(net(&result.deltas, (300, 300)), 1);
        assert_eq!(net(&result.deltas, (300, 3)), 1);
        assert_eq!(net(&result.deltas, (2, 3)), -1);
    }

    #[test]
    fn merge_is_non_overlapping_left_to_right() {
        let mut word = Word::from_bytes(b"aaa", 1);
        let result = word.merge(97, 97, 256);
        assert_eq!(result.merges, 1);
        assert_eq!(word.symbols(), &[256, 97]);
        assert_eq!(net(&result.deltas, (97, 97)), -2);
        assert_eq!(net(&result.deltas, (256, 97)), 1);
    }

    #[test]
    fn merge_of_even_run_counts_adjacent_new_symbols() {
        let mut word = Word::from_bytes(b"aaaa", 1);
        let result = word.merge(97, 97, 256);
        assert_eq!(word.symbols(), &[256, 256]);
        assert_eq!(net(&result.deltas, (97, 97)), -3);
        assert_eq!(net(&result.deltas, (256, 97)), 0);
        assert_eq!(net(&result.deltas, (256, 256)), 1);
    }

    #[test]
    fn merge_without_match_is_a_no_op() {
        let mut word = Word::from_bytes(b"abc", 4);
        let outcome = word.merge(b'c' as TokenId, b'a' as TokenId, 256);
        assert_eq!(outcome.merges, 0);
        assert!(outcome.deltas.is_empty());
        assert_eq!(word.count(), 4);
    }

    #[test]
    fn enumerate_pairs_in_order() {
        let word = Word::from_bytes(&[1, 2, 3], 1);
        let mut collected = Vec::new();
        word.for_each_pair(|pair| collected.push(pair));
        assert_eq!(collected, vec![(1, 2), (2, 3)]);
    }
}
