//! Model types and helpers for working with trained BPE tokenizers.

use std::fs;
use std::path::Path;

use crate::config::TokenizerConfig;
use crate::error::{BpeError, Result};
use crate::merges::MergeRule;
use crate::serialization::{self, MERGES_FILE, VOCAB_FILE};
use crate::tokenizer::Tokenizer;
use crate::vocab::Vocabulary;

/// Token identifier used throughout the crate.
pub type TokenId = u32;
/// Adjacent symbol pair encoded as `(left, right)` token identifiers.
pub type Pair = (TokenId, TokenId);

/// Trained BPE model containing the learned vocabulary and merge list.
#[must_use]
#[derive(Debug, Clone)]
pub struct BpeModel {
    vocab: Vocabulary,
    merges: Vec<MergeRule>,
    special_tokens: Vec<String>,
}

impl BpeModel {
    /// Constructs a new model from a vocabulary, ordered merges, and special tokens.
    pub fn new(vocab: Vocabulary, merges: Vec<MergeRule>, special_tokens: Vec<String>) -> Self {
        Self {
            vocab,
            merges,
            special_tokens,
        }
    }

    /// Returns the id ↔ bytes table.
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Returns the merges in rank order.
    #[must_use]
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Returns the special tokens kept atomic by this model.
    #[must_use]
    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Returns the total vocabulary size including special tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Builds an encoder/decoder with the default cache size.
    pub fn tokenizer(&self) -> Result<Tokenizer> {
        self.tokenizer_with(TokenizerConfig::with_special_tokens(
            self.special_tokens.iter().cloned(),
        ))
    }

    /// Builds an encoder/decoder with explicit options.
    pub fn tokenizer_with(&self, config: TokenizerConfig) -> Result<Tokenizer> {
        Tokenizer::with_config(self.vocab.clone(), self.merges.clone(), config)
    }

    /// Writes `vocab.json` and `merges.txt` into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| BpeError::io(err, Some(dir.to_path_buf())))?;
        serialization::save_vocab(&self.vocab, dir.join(VOCAB_FILE))?;
        serialization::save_merges(&self.merges, dir.join(MERGES_FILE))
    }

    /// Loads `vocab.json` and `merges.txt` from `dir`.
    ///
    /// Malformed merge lines are skipped with a warning; vocabulary violations abort.
    pub fn load<P: AsRef<Path>>(dir: P, special_tokens: Vec<String>) -> Result<Self> {
        let dir = dir.as_ref();
        let vocab = serialization::load_vocab(dir.join(VOCAB_FILE))?;
        let merges = serialization::load_merges(dir.join(MERGES_FILE))?;
        Ok(Self::new(vocab, merges.rules, special_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_model() -> BpeModel {
        let mut entries: Vec<(TokenId, Vec<u8>)> =
            (0u8..=u8::MAX).map(|b| (TokenId::from(b), vec![b])).collect();
        entries.push((256, b"<|endoftext|>".to_vec()));
        entries.push((257, b"lo".to_vec()));
        entries.push((258, b"low".to_vec()));
        let vocab = Vocabulary::from_entries(entries).expect("vocab");
        let merges = vec![
            (b"l".to_vec(), b"o".to_vec()),
            (b"lo".to_vec(), b"w".to_vec()),
        ];
        BpeModel::new(vocab, merges, vec!["<|endoftext|>".into()])
    }

    #[test]
    fn save_and_load_round_trip() {
        let model = sample_model();
        let dir = tempdir().expect("tempdir");
        model.save(dir.path()).expect("save");
        let loaded =
            BpeModel::load(dir.path(), model.special_tokens().to_vec()).expect("load model");
        assert_eq!(loaded.merges(), model.merges());
        assert_eq!(loaded.vocab().entries(), model.vocab().entries());
    }

    #[test]
    fn tokenizer_uses_model_special_tokens() {
        let tokenizer = sample_model().tokenizer().expect("tokenizer");
        let ids = tokenizer.encode("low<|endoftext|>").expect("encode");
        assert_eq!(ids, vec![258, 256]);
    }
}
