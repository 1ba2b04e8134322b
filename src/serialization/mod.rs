//! Helpers for (de)serialising vocabularies and merge lists.

pub mod gpt2;

pub use gpt2::{
    load_merges, load_vocab, merges_to_text, parse_merges, parse_vocab, save_merges, save_vocab,
    vocab_to_json, MergesFile, SkippedLine, MERGES_FILE, VOCAB_FILE,
};
