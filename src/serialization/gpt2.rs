//! GPT-2 style `vocab.json` / `merges.txt` persistence.
//!
//! Both files spell byte strings through the printable byte ↔ character table
//! in [`crate::bytes`], so arbitrary (non UTF-8) tokens survive a JSON round trip.

use std::fs;
use std::path::Path;

use log::warn;
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::bytes::{bytes_to_unicode, unicode_to_bytes};
use crate::error::{BpeError, Result};
use crate::merges::MergeRule;
use crate::model::TokenId;
use crate::vocab::Vocabulary;

/// File name of the persisted vocabulary inside a model directory.
pub const VOCAB_FILE: &str = "vocab.json";
/// File name of the persisted merge list inside a model directory.
pub const MERGES_FILE: &str = "merges.txt";

/// Header written as the first line of `merges.txt`.
const MERGES_HEADER: &str = "#version: 0.2";

/// A `merges.txt` line that could not be parsed and was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// One-based line number.
    pub line: usize,
    /// Why the line was rejected.
    pub reason: String,
}

/// Parsed merge list together with the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergesFile {
    /// Rules in file order; index = rank.
    pub rules: Vec<MergeRule>,
    /// Malformed lines, in file order.
    pub skipped: Vec<SkippedLine>,
}

/// JSON object written in id order rather than key order.
struct OrderedVocab(Vec<(String, TokenId)>);

impl Serialize for OrderedVocab {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(token, id)| (token, id)))
    }
}

/// Renders `vocab` as a pretty-printed JSON object of encoded token → id.
pub fn vocab_to_json(vocab: &Vocabulary) -> Result<String> {
    let ordered = OrderedVocab(
        vocab
            .entries()
            .into_iter()
            .map(|(id, bytes)| (bytes_to_unicode(bytes), id))
            .collect(),
    );
    Ok(serde_json::to_string_pretty(&ordered)?)
}

/// Parses a `vocab.json` document and checks the byte alphabet.
pub fn parse_vocab(json: &str) -> Result<Vocabulary> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(map) = value else {
        return Err(BpeError::Format(
            "vocabulary must be a JSON object of token -> id".into(),
        ));
    };
    let mut entries = Vec::with_capacity(map.len());
    for (token, id) in map {
        let id = id
            .as_u64()
            .and_then(|id| TokenId::try_from(id).ok())
            .ok_or_else(|| {
                BpeError::Format(format!("id of token {token:?} is not a valid token id: {id}"))
            })?;
        let bytes = unicode_to_bytes(&token).map_err(|ch| {
            BpeError::Format(format!(
                "token {token:?} contains {ch:?}, which is outside the byte alphabet"
            ))
        })?;
        entries.push((id, bytes));
    }
    let vocab = Vocabulary::from_entries(entries)?;
    vocab.validate_base_alphabet()?;
    Ok(vocab)
}

/// Writes `vocab` to `path` as JSON.
pub fn save_vocab<P: AsRef<Path>>(vocab: &Vocabulary, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = vocab_to_json(vocab)?;
    fs::write(path, json).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))
}

/// Reads and validates a vocabulary file.
pub fn load_vocab<P: AsRef<Path>>(path: P) -> Result<Vocabulary> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
    parse_vocab(&json)
}

/// Renders merges one rule per line, after a version header.
#[must_use]
pub fn merges_to_text(merges: &[MergeRule]) -> String {
    let mut out = String::from(MERGES_HEADER);
    out.push('\n');
    for (left, right) in merges {
        out.push_str(&bytes_to_unicode(left));
        out.push(' ');
        out.push_str(&bytes_to_unicode(right));
        out.push('\n');
    }
    out
}

/// Parses `merges.txt` content. Blank lines and `#version` headers are ignored;
/// malformed lines are recorded in [`MergesFile::skipped`] and logged.
#[must_use]
pub fn parse_merges(content: &[u8]) -> MergesFile {
    let mut parsed = MergesFile::default();
    for (idx, raw) in content.split(|&b| b == b'\n').enumerate() {
        let line = idx + 1;
        match parse_merge_line(raw) {
            Ok(Some(rule)) => parsed.rules.push(rule),
            Ok(None) => {}
            Err(reason) => {
                warn!("skipping merges line {line}: {reason}");
                parsed.skipped.push(SkippedLine { line, reason });
            }
        }
    }
    parsed
}

fn parse_merge_line(raw: &[u8]) -> std::result::Result<Option<MergeRule>, String> {
    let text = std::str::from_utf8(raw).map_err(|err| format!("not valid UTF-8 ({err})"))?;
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with("#version") {
        return Ok(None);
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let [left, right] = fields.as_slice() else {
        return Err(format!("expected 2 fields, found {}", fields.len()));
    };
    let decode = |field: &str| {
        unicode_to_bytes(field)
            .map_err(|ch| format!("{ch:?} in {field:?} is outside the byte alphabet"))
    };
    Ok(Some((decode(*left)?, decode(*right)?)))
}

/// Writes `merges` to `path`.
pub fn save_merges<P: AsRef<Path>>(merges: &[MergeRule], path: P) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, merges_to_text(merges)).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))
}

/// Reads a merges file, skipping malformed lines.
pub fn load_merges<P: AsRef<Path>>(path: P) -> Result<MergesFile> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
    Ok(parse_merges(&content))
}
