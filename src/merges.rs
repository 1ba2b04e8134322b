//! Ordered merge rules and the rank lookup used by the encoder.
//!
//! Every byte string that appears in a rule (either side or the merged result)
//! is interned once as a [`SymbolId`]; single bytes occupy ids `0..=255`. The
//! encoder therefore compares small integers instead of hashing byte strings,
//! while surviving symbols are still resolved to token ids through the
//! vocabulary's bytes → id lookup.

use ahash::AHashMap;
use log::warn;
use rustc_hash::FxHashMap;

use crate::model::TokenId;
use crate::vocab::Vocabulary;

/// Merge rule expressed as `(left, right)` byte strings.
pub type MergeRule = (Vec<u8>, Vec<u8>);

/// Priority of a merge rule; lower ranks are applied first.
pub type Rank = u32;

/// Interned byte string used inside the encoder's symbol chain.
pub(crate) type SymbolId = u32;

/// Rank and result of applying a rule to an adjacent symbol pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeTarget {
    pub(crate) rank: Rank,
    pub(crate) merged: SymbolId,
}

/// Ordered merge rules plus an O(1) pair → rank index.
#[derive(Debug, Clone)]
pub struct MergeTable {
    rules: Vec<MergeRule>,
    symbols: Vec<Vec<u8>>,
    symbol_ids: AHashMap<Vec<u8>, SymbolId>,
    tokens: Vec<Option<TokenId>>,
    pairs: FxHashMap<(SymbolId, SymbolId), MergeTarget>,
}

impl MergeTable {
    /// Indexes `rules` in order; rank = position among the retained rules.
    ///
    /// Repeated rules keep their first (highest-priority) rank and are dropped
    /// with a warning. Symbols are resolved against `vocab` once, up front.
    pub fn new(rules: Vec<MergeRule>, vocab: &Vocabulary) -> Self {
        let mut table = Self {
            rules: Vec::with_capacity(rules.len()),
            symbols: Vec::with_capacity(256 + rules.len()),
            symbol_ids: AHashMap::with_capacity(256 + rules.len()),
            tokens: Vec::with_capacity(256 + rules.len()),
            pairs: FxHashMap::default(),
        };
        for byte in 0u8..=u8::MAX {
            table.intern(&[byte], vocab);
        }
        for (left, right) in rules {
            let left_id = table.intern(&left, vocab);
            let right_id = table.intern(&right, vocab);
            if table.pairs.contains_key(&(left_id, right_id)) {
                warn!(
                    "ignoring repeated merge rule {:?} {:?}",
                    String::from_utf8_lossy(&left),
                    String::from_utf8_lossy(&right)
                );
                continue;
            }
            let mut merged = Vec::with_capacity(left.len() + right.len());
            merged.extend_from_slice(&left);
            merged.extend_from_slice(&right);
            let merged_id = table.intern(&merged, vocab);
            let rank = table.rules.len() as Rank;
            table.pairs.insert(
                (left_id, right_id),
                MergeTarget {
                    rank,
                    merged: merged_id,
                },
            );
            table.rules.push((left, right));
        }
        table
    }

    /// Ordered rules; index = rank.
    #[must_use]
    pub fn rules(&self) -> &[MergeRule] {
        &self.rules
    }

    /// Number of retained rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when the table holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rank of the rule merging `left` and `right`, if any.
    #[must_use]
    pub fn rank(&self, left: &[u8], right: &[u8]) -> Option<Rank> {
        let left = self.symbol_ids.get(left)?;
        let right = self.symbol_ids.get(right)?;
        self.pairs.get(&(*left, *right)).map(|target| target.rank)
    }

    pub(crate) fn target(&self, left: SymbolId, right: SymbolId) -> Option<MergeTarget> {
        self.pairs.get(&(left, right)).copied()
    }

    pub(crate) fn symbol_bytes(&self, symbol: SymbolId) -> &[u8] {
        &self.symbols[symbol as usize]
    }

    pub(crate) fn symbol_token(&self, symbol: SymbolId) -> Option<TokenId> {
        self.tokens[symbol as usize]
    }

    fn intern(&mut self, bytes: &[u8], vocab: &Vocabulary) -> SymbolId {
        if let Some(&id) = self.symbol_ids.get(bytes) {
            return id;
        }
        let id = self.symbols.len() as SymbolId;
        self.symbols.push(bytes.to_vec());
        self.symbol_ids.insert(bytes.to_vec(), id);
        self.tokens.push(vocab.token_id(bytes));
        id
    }
}
