//! Lossless splitting of raw text into pretokens.
//!
//! Text is first cut around special-token literals (leftmost match, ties going
//! to the token configured first) and every remaining segment is scanned with
//! the GPT-2 pattern. Concatenating the output reproduces the input exactly.
//!
//! The pattern's `\s+(?!\S)` branch needs a lookahead, which a backtracking
//! engine pays for with stack on long runs. The scan instead uses the
//! linear-time `regex` crate and gives back the last whitespace character of
//! a run that is followed by more text, which yields the same pieces.

use std::ops::Range;

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;

use crate::error::{BpeError, Result};

/// GPT-2 pre-tokenization pattern: contractions, letter runs, digit runs,
/// punctuation runs (each optionally led by one space), then whitespace.
pub const GPT2_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// [`GPT2_PATTERN`] without the lookahead branch; see [`PreTokenizer::split_ranges`].
const SCAN_PATTERN: &str = r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+";

/// A contiguous piece of input text produced by [`PreTokenizer::segments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Verbatim occurrence of a configured special token.
    Special(&'a str),
    /// Ordinary text between special tokens.
    Text(&'a str),
}

/// Pretoken span within the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) range: Range<usize>,
    pub(crate) special: bool,
}

/// Splits text into pretokens, honouring a list of atomic special tokens.
#[derive(Debug, Clone)]
pub struct PreTokenizer {
    pattern: Regex,
    specials: Option<AhoCorasick>,
    special_tokens: Vec<String>,
}

impl PreTokenizer {
    /// Builds a pre-tokenizer that keeps each of `special_tokens` atomic.
    pub fn new(special_tokens: &[String]) -> Result<Self> {
        let pattern = Regex::new(SCAN_PATTERN)
            .map_err(|err| BpeError::Internal(format!("invalid pre-tokenizer pattern: {err}")))?;
        let specials = if special_tokens.is_empty() {
            None
        } else {
            let automaton = AhoCorasick::builder()
                .match_kind(MatchKind::LeftmostFirst)
                .build(special_tokens)
                .map_err(|err| BpeError::InvalidConfig(err.to_string()))?;
            Some(automaton)
        };
        Ok(Self {
            pattern,
            specials,
            special_tokens: special_tokens.to_vec(),
        })
    }

    /// Returns the special tokens in priority order.
    #[must_use]
    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Returns `true` when `piece` is exactly one of the configured special tokens.
    #[must_use]
    pub fn is_special(&self, piece: &str) -> bool {
        self.special_tokens.iter().any(|token| token == piece)
    }

    /// Cuts `text` around special-token occurrences without applying the pattern.
    #[must_use]
    pub fn segments<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let Some(specials) = &self.specials else {
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }
            return segments;
        };
        let mut cursor = 0usize;
        for found in specials.find_iter(text) {
            if found.start() > cursor {
                segments.push(Segment::Text(&text[cursor..found.start()]));
            }
            segments.push(Segment::Special(&text[found.start()..found.end()]));
            cursor = found.end();
        }
        if cursor < text.len() {
            segments.push(Segment::Text(&text[cursor..]));
        }
        segments
    }

    /// Splits a special-free segment with the GPT-2 pattern.
    #[must_use]
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.split_ranges(text)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    /// Splits `text` into its ordered pretokens.
    #[must_use]
    pub fn pretokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.spans(text)
            .into_iter()
            .map(|span| &text[span.range])
            .collect()
    }

    /// Byte ranges of the GPT-2 pieces of `text`.
    ///
    /// A whitespace-only match of two or more characters that stops before
    /// more text drops its last character, which then leads the next piece.
    fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut pos = 0usize;
        while let Some(found) = self.pattern.find_at(text, pos) {
            let mut end = found.end();
            let piece = found.as_str();
            if end < text.len() && piece.chars().all(char::is_whitespace) {
                if let Some((last, _)) = piece.char_indices().last().filter(|&(at, _)| at > 0) {
                    end = found.start() + last;
                }
            }
            ranges.push(found.start()..end);
            pos = end;
        }
        ranges
    }

    pub(crate) fn spans(&self, text: &str) -> Vec<Span> {
        let base = text.as_ptr() as usize;
        let mut spans = Vec::new();
        for segment in self.segments(text) {
            match segment {
                Segment::Special(token) => {
                    let start = token.as_ptr() as usize - base;
                    spans.push(Span {
                        range: start..start + token.len(),
                        special: true,
                    });
                }
                Segment::Text(chunk) => {
                    let offset = chunk.as_ptr() as usize - base;
                    for range in self.split_ranges(chunk) {
                        spans.push(Span {
                            range: offset + range.start..offset + range.end,
                            special: false,
                        });
                    }
                }
            }
        }
        spans
    }

    /// Length of the longest suffix of `text` that is a proper prefix of a special token.
    pub(crate) fn partial_special_suffix(&self, text: &str) -> usize {
        let haystack = text.as_bytes();
        self.special_tokens
            .iter()
            .map(|token| {
                let token = token.as_bytes();
                let longest = (token.len() - 1).min(haystack.len());
                (1..=longest)
                    .rev()
                    .find(|&len| haystack.ends_with(&token[..len]))
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> PreTokenizer {
        PreTokenizer::new(&[]).expect("pre-tokenizer")
    }

    #[test]
    fn splits_words_numbers_and_punctuation() {
        let pieces = plain().pretokenize("Hello, world! It's 2024.");
        assert_eq!(
            pieces,
            vec!["Hello", ",", " world", "!", " It", "'s", " 2024", "."]
        );
    }

    #[test]
    fn whitespace_runs_leave_one_space_for_the_next_word() {
        let pieces = plain().pretokenize("a   b\n\n");
        assert_eq!(pieces, vec!["a", "  ", " b", "\n\n"]);
    }

    #[test]
    fn split_is_lossless() {
        let text = "  Olá, 世界!\tdon't  stop\r\n 42x <|endoftext|>";
        let splitter = PreTokenizer::new(&["<|endoftext|>".to_string()]).expect("splitter");
        let pieces = splitter.pretokenize(text);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(plain().pretokenize("").is_empty());
    }

    #[test]
    fn special_tokens_stay_atomic() {
        let splitter = PreTokenizer::new(&["<|endoftext|>".to_string()]).expect("splitter");
        let pieces = splitter.pretokenize("the end<|endoftext|>next");
        assert_eq!(pieces, vec!["the", " end", "<|endoftext|>", "next"]);
    }

    #[test]
    fn overlapping_special_tokens_prefer_first_listed() {
        let tokens = vec!["<|a|>".to_string(), "<|a|><|b|>".to_string()];
        let splitter = PreTokenizer::new(&tokens).expect("splitter");
        let segments = splitter.segments("x<|a|><|b|>");
        assert_eq!(
            segments,
            vec![
                Segment::Text("x"),
                Segment::Special("<|a|>"),
                Segment::Text("<|b|>")
            ]
        );

        let reversed = vec!["<|a|><|b|>".to_string(), "<|a|>".to_string()];
        let splitter = PreTokenizer::new(&reversed).expect("splitter");
        assert_eq!(
            splitter.segments("x<|a|><|b|>"),
            vec![Segment::Text("x"), Segment::Special("<|a|><|b|>")]
        );
    }

    #[test]
    fn detects_partial_special_suffix() {
        let splitter = PreTokenizer::new(&["<|endoftext|>".to_string()]).expect("splitter");
        assert_eq!(splitter.partial_special_suffix("hello <|endof"), 7);
        assert_eq!(splitter.partial_special_suffix("hello"), 0);
        assert_eq!(splitter.partial_special_suffix("<|endoftext|>"), 0);
    }

    #[test]
    fn newline_runs_before_a_word_keep_their_last_character_apart() {
        let pieces = plain().pretokenize("\n\nx\t \ty \n");
        assert_eq!(pieces, vec!["\n", "\n", "x", "\t ", "\t", "y", " \n"]);
    }

    #[test]
    fn long_runs_split_without_failing() {
        let splitter = plain();
        let letters = "é".repeat(1_000_000);
        assert_eq!(splitter.pretokenize(&letters), vec![letters.as_str()]);

        let punctuation = "!?".repeat(1_000_000);
        assert_eq!(splitter.pretokenize(&punctuation), vec![punctuation.as_str()]);

        let spaces = format!("{}a", " ".repeat(2_000_000));
        let pieces = splitter.pretokenize(&spaces);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].len(), 1_999_999);
        assert_eq!(pieces[1], " a");

        let mixed = format!("{}\n\n x", "\n \t".repeat(2_000_000));
        let pieces = splitter.pretokenize(&mixed);
        assert_eq!(pieces.concat(), mixed);
        assert_eq!(pieces.last().copied(), Some(" x"));
        assert_eq!(pieces.len(), 2);
    }
}
