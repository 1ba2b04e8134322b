//! Text ↔ token id conversion using a trained vocabulary and merge list.

use std::collections::VecDeque;
use std::path::Path;

use rayon::prelude::*;

use crate::cache::EncodeCache;
use crate::config::{dedup_in_place, TokenizerConfig};
use crate::encoder::merge_symbols;
use crate::error::{BpeError, Result};
use crate::merges::{MergeRule, MergeTable};
use crate::model::TokenId;
use crate::pretokenize::PreTokenizer;
use crate::serialization;
use crate::vocab::Vocabulary;

/// Byte-level BPE encoder and decoder.
///
/// A `Tokenizer` is immutable apart from its internal cache and can be shared
/// across threads; [`Tokenizer::encode_batch`] fans out with rayon.
#[derive(Debug)]
pub struct Tokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    pre_tokenizer: PreTokenizer,
    cache: Option<EncodeCache>,
}

impl Tokenizer {
    /// Builds a tokenizer with the default cache size.
    pub fn new(
        vocab: Vocabulary,
        merges: Vec<MergeRule>,
        special_tokens: Vec<String>,
    ) -> Result<Self> {
        Self::with_config(
            vocab,
            merges,
            TokenizerConfig::with_special_tokens(special_tokens),
        )
    }

    /// Builds a tokenizer from explicit options.
    ///
    /// Special tokens are deduplicated keeping their first position, which is
    /// also their priority when two of them overlap in the input.
    pub fn with_config(
        vocab: Vocabulary,
        merges: Vec<MergeRule>,
        config: TokenizerConfig,
    ) -> Result<Self> {
        let mut special_tokens = config.special_tokens;
        dedup_in_place(&mut special_tokens);
        if special_tokens.iter().any(String::is_empty) {
            return Err(BpeError::InvalidConfig(
                "special tokens must not be empty".into(),
            ));
        }
        let pre_tokenizer = PreTokenizer::new(&special_tokens)?;
        let merges = MergeTable::new(merges, &vocab);
        Ok(Self {
            vocab,
            merges,
            pre_tokenizer,
            cache: EncodeCache::new(config.cache_capacity),
        })
    }

    /// Loads `vocab.json` and `merges.txt` written by [`crate::BpeModel::save`]
    /// or any GPT-2 compatible tool.
    pub fn from_files<P, Q>(
        vocab_path: P,
        merges_path: Q,
        special_tokens: Vec<String>,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let vocab = serialization::load_vocab(vocab_path)?;
        let merges = serialization::load_merges(merges_path)?;
        Self::new(vocab, merges.rules, special_tokens)
    }

    /// Returns the vocabulary.
    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Returns the indexed merge rules.
    #[must_use]
    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    /// Returns the special tokens in priority order.
    #[must_use]
    pub fn special_tokens(&self) -> &[String] {
        self.pre_tokenizer.special_tokens()
    }

    /// Returns the pre-tokenizer used to split input text.
    #[must_use]
    pub fn pre_tokenizer(&self) -> &PreTokenizer {
        &self.pre_tokenizer
    }

    /// Encodes `text` into token ids.
    ///
    /// Fails with [`BpeError::SpecialTokenMissing`] when a special token in the
    /// text has no vocabulary id and with [`BpeError::VocabularyInconsistency`]
    /// when merging leaves a byte string the vocabulary does not know.
    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let mut ids = Vec::with_capacity(text.len() / 3 + 1);
        self.encode_into(text, &mut ids, true)?;
        Ok(ids)
    }

    /// Encodes `text` without reading or populating the cache.
    pub fn encode_uncached(&self, text: &str) -> Result<Vec<TokenId>> {
        let mut ids = Vec::with_capacity(text.len() / 3 + 1);
        self.encode_into(text, &mut ids, false)?;
        Ok(ids)
    }

    /// Encodes many texts in parallel, preserving input order.
    pub fn encode_batch<S>(&self, texts: &[S]) -> Result<Vec<Vec<TokenId>>>
    where
        S: AsRef<str> + Sync,
    {
        texts
            .par_iter()
            .map(|text| self.encode(text.as_ref()))
            .collect()
    }

    /// Lazily encodes a sequence of text chunks.
    ///
    /// Chunks are treated as one continuous text: a pretoken or special token
    /// split across a chunk boundary is buffered until it is complete, so the
    /// concatenated output equals `encode` of the concatenated input. The
    /// stream yields the first error and then ends.
    pub fn encode_iter<I>(&self, chunks: I) -> EncodeStream<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        EncodeStream {
            tokenizer: self,
            chunks: chunks.into_iter(),
            carry: String::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Concatenates the bytes of `ids`. Unknown ids contribute nothing.
    #[must_use]
    pub fn decode_bytes(&self, ids: &[TokenId]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ids.len() * 4);
        for &id in ids {
            if let Some(bytes) = self.vocab.token_bytes(id) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// Decodes `ids` to text, replacing invalid UTF-8 with U+FFFD.
    #[must_use]
    pub fn decode(&self, ids: &[TokenId]) -> String {
        String::from_utf8_lossy(&self.decode_bytes(ids)).into_owned()
    }

    /// Number of pretokens currently cached.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, EncodeCache::len)
    }

    /// Empties the encode cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn encode_into(&self, text: &str, out: &mut Vec<TokenId>, use_cache: bool) -> Result<()> {
        for span in self.pre_tokenizer.spans(text) {
            self.encode_pretoken(&text[span.range], span.special, out, use_cache)?;
        }
        Ok(())
    }

    fn encode_pretoken(
        &self,
        piece: &str,
        special: bool,
        out: &mut Vec<TokenId>,
        use_cache: bool,
    ) -> Result<()> {
        let cache = self.cache.as_ref().filter(|_| use_cache);
        if let Some(ids) = cache.and_then(|cache| cache.get(piece)) {
            out.extend_from_slice(&ids);
            return Ok(());
        }

        let start = out.len();
        if special {
            let id = self
                .vocab
                .token_id(piece.as_bytes())
                .ok_or_else(|| BpeError::SpecialTokenMissing(piece.to_owned()))?;
            out.push(id);
        } else {
            for symbol in merge_symbols(piece.as_bytes(), &self.merges) {
                let id = self.merges.symbol_token(symbol).ok_or_else(|| {
                    BpeError::VocabularyInconsistency(format!(
                        "{:?} (from pretoken {piece:?}) has no vocabulary id",
                        String::from_utf8_lossy(self.merges.symbol_bytes(symbol))
                    ))
                })?;
                out.push(id);
            }
        }

        if let Some(cache) = cache {
            cache.insert(piece, &out[start..]);
        }
        Ok(())
    }
}

/// Iterator returned by [`Tokenizer::encode_iter`].
#[derive(Debug)]
pub struct EncodeStream<'t, I> {
    tokenizer: &'t Tokenizer,
    chunks: I,
    carry: String,
    pending: VecDeque<TokenId>,
    finished: bool,
}

impl<I> EncodeStream<'_, I> {
    /// Encodes every pretoken of `carry` that later input cannot change.
    ///
    /// The last pattern match may still grow (or shrink, for whitespace that
    /// turns out to precede a word), and a trailing prefix of a special token
    /// may complete into one, so both stay buffered.
    fn drain_settled(&mut self) -> Result<()> {
        let pre_tokenizer = &self.tokenizer.pre_tokenizer;
        let limit = self.carry.len() - pre_tokenizer.partial_special_suffix(&self.carry);
        let spans = pre_tokenizer.spans(&self.carry[..limit]);
        let cut = match spans.last() {
            None => return Ok(()),
            Some(last) if last.special => limit,
            Some(last) => last.range.start,
        };
        let mut ids = Vec::new();
        for span in spans.into_iter().take_while(|span| span.range.end <= cut) {
            self.tokenizer
                .encode_pretoken(&self.carry[span.range], span.special, &mut ids, true)?;
        }
        self.pending.extend(ids);
        self.carry.drain(..cut);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let rest = std::mem::take(&mut self.carry);
        let mut ids = Vec::new();
        self.tokenizer.encode_into(&rest, &mut ids, true)?;
        self.pending.extend(ids);
        Ok(())
    }
}

impl<I> Iterator for EncodeStream<'_, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Result<TokenId>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.pending.pop_front() {
                return Some(Ok(id));
            }
            if self.finished {
                return None;
            }
            let step = match self.chunks.next() {
                Some(chunk) => {
                    self.carry.push_str(chunk.as_ref());
                    self.drain_settled()
                }
                None => {
                    self.finished = true;
                    self.flush()
                }
            };
            if let Err(err) = step {
                self.finished = true;
                self.carry.clear();
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built model that only knows the bytes and merges of "the cat ate".
    fn fixture() -> Tokenizer {
        let vocab = Vocabulary::from_entries(
            [
                (0, " "),
                (1, "a"),
                (2, "c"),
                (3, "e"),
                (4, "h"),
                (5, "t"),
                (6, "th"),
                (7, " c"),
                (8, " a"),
                (9, "the"),
                (10, " at"),
                (11, "<|endoftext|>"),
            ]
            .into_iter()
            .map(|(id, token)| (id, token.as_bytes().to_vec())),
        )
        .expect("vocab");
        let merges = [("t", "h"), (" ", "c"), (" ", "a"), ("th", "e"), (" a", "t")]
            .into_iter()
            .map(|(l, r)| (l.as_bytes().to_vec(), r.as_bytes().to_vec()))
            .collect();
        Tokenizer::new(vocab, merges, vec!["<|endoftext|>".into()]).expect("tokenizer")
    }

    #[test]
    fn encodes_with_ranked_merges_and_special_tokens() {
        let tokenizer = fixture();
        let ids = tokenizer.encode("the cat ate<|endoftext|>").expect("encode");
        assert_eq!(ids, vec![9, 7, 1, 5, 10, 3, 11]);
        assert_eq!(tokenizer.decode(&ids), "the cat ate<|endoftext|>");
    }

    #[test]
    fn empty_input_encodes_to_nothing() {
        let tokenizer = fixture();
        assert!(tokenizer.encode("").expect("encode").is_empty());
        assert_eq!(tokenizer.decode(&[]), "");
    }

    #[test]
    fn cache_does_not_change_results() {
        let tokenizer = fixture();
        let cold = tokenizer.encode("the cat the cat").expect("cold");
        assert!(tokenizer.cache_len() > 0);
        let warm = tokenizer.encode("the cat the cat").expect("warm");
        assert_eq!(cold, warm);
        tokenizer.clear_cache();
        assert_eq!(tokenizer.cache_len(), 0);
        assert_eq!(tokenizer.encode_uncached("the cat the cat").expect("uncached"), cold);
        assert_eq!(tokenizer.cache_len(), 0);
    }

    #[test]
    fn disabled_cache_still_encodes() {
        let tokenizer = fixture();
        let config = TokenizerConfig::with_special_tokens(["<|endoftext|>"]).cache_capacity(0);
        let uncached = Tokenizer::with_config(
            tokenizer.vocab().clone(),
            tokenizer.merges().rules().to_vec(),
            config,
        )
        .expect("tokenizer");
        assert_eq!(
            uncached.encode("the cat").expect("encode"),
            tokenizer.encode("the cat").expect("encode")
        );
        assert_eq!(uncached.cache_len(), 0);
    }

    #[test]
    fn missing_special_token_id_is_reported() {
        let tokenizer = Tokenizer::new(
            Vocabulary::byte_level(),
            Vec::new(),
            vec!["<|pad|>".into()],
        )
        .expect("tokenizer");
        let err = tokenizer.encode("a<|pad|>").expect_err("no id for <|pad|>");
        assert!(matches!(err, BpeError::SpecialTokenMissing(token) if token == "<|pad|>"));
    }

    #[test]
    fn unresolvable_merge_result_is_reported() {
        let tokenizer = Tokenizer::new(
            Vocabulary::byte_level(),
            vec![(b"a".to_vec(), b"b".to_vec())],
            Vec::new(),
        )
        .expect("tokenizer");
        let err = tokenizer.encode("ab").expect_err("no id for ab");
        assert!(matches!(err, BpeError::VocabularyInconsistency(_)));
    }

    #[test]
    fn decode_skips_unknown_ids_and_replaces_invalid_utf8() {
        let tokenizer = Tokenizer::new(Vocabulary::byte_level(), Vec::new(), Vec::new())
            .expect("tokenizer");
        assert_eq!(tokenizer.decode(&[104, 9_999, 105]), "hi");
        assert_eq!(tokenizer.decode(&[0xE4, 0xB8]), "\u{FFFD}");
        assert_eq!(tokenizer.decode_bytes(&[0xE4, 0xB8]), vec![0xE4, 0xB8]);
    }

    #[test]
    fn byte_level_round_trip_is_lossless() {
        let tokenizer = Tokenizer::new(
            Vocabulary::byte_level(),
            Vec::new(),
            vec!["<|endoftext|>".into()],
        )
        .expect("tokenizer");
        let text = "héllo  世界\n\tdon't";
        let ids = tokenizer.encode(text).expect("encode");
        assert_eq!(ids.len(), text.len());
        assert_eq!(tokenizer.decode(&ids), text);
    }

    #[test]
    fn megabyte_runs_encode() {
        let tokenizer = Tokenizer::new(Vocabulary::byte_level(), Vec::new(), Vec::new())
            .expect("tokenizer");
        for text in [
            "é".repeat(1_000_000),
            "!?".repeat(1_000_000),
            format!("{}a", " ".repeat(2_000_000)),
            format!("{}\n\n x", "\n \t".repeat(2_000_000)),
        ] {
            let ids = tokenizer.encode(&text).expect("encode");
            assert_eq!(ids.len(), text.len());
            assert_eq!(tokenizer.decode_bytes(&ids), text.as_bytes());
        }
    }

    #[test]
    fn batch_matches_sequential() {
        let tokenizer = fixture();
        let texts = ["the cat", " ate", "<|endoftext|>the"];
        let batch = tokenizer.encode_batch(&texts).expect("batch");
        let sequential: Vec<Vec<TokenId>> = texts
            .iter()
            .map(|text| tokenizer.encode(text).expect("encode"))
            .collect();
        assert_eq!(batch, sequential);
    }

    #[test]
    fn streaming_matches_whole_text_for_any_chunking() {
        let tokenizer = fixture();
        let text = "the cat  ate<|endoftext|>the  cat ate";
        let expected = tokenizer.encode(text).expect("encode");
        for size in 1..=text.len() {
            let chunks: Vec<&str> = text
                .as_bytes()
                .chunks(size)
                .map(|chunk| std::str::from_utf8(chunk).expect("ascii"))
                .collect();
            let streamed: Vec<TokenId> = tokenizer
                .encode_iter(chunks)
                .collect::<Result<_>>()
                .expect("stream");
            assert_eq!(streamed, expected, "chunk size {size}");
        }
    }

    #[test]
    fn streaming_stops_after_first_error() {
        let tokenizer = Tokenizer::new(
            Vocabulary::byte_level(),
            Vec::new(),
            vec!["<|pad|>".into()],
        )
        .expect("tokenizer");
        let mut stream = tokenizer.encode_iter(["ok ", "<|pad|> more", " text"]);
        assert_eq!(stream.next().map(|r| r.ok()), Some(Some(u32::from(b'o'))));
        assert_eq!(stream.next().map(|r| r.ok()), Some(Some(u32::from(b'k'))));
        assert!(matches!(stream.next(), Some(Err(BpeError::SpecialTokenMissing(_)))));
        assert!(stream.next().is_none());
    }
}
