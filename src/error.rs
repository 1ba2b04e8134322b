//! Error type returned by every fallible operation in the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = BpeError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during configuration, IO, training, or encoding.
#[derive(Debug, Error)]
pub enum BpeError {
    /// Training or tokenizer configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A configured special token has no vocabulary entry.
    #[error("special token {0:?} is not in the vocabulary")]
    SpecialTokenMissing(String),
    /// A merge-produced or loaded byte string has no vocabulary id.
    #[error("vocabulary inconsistency: {0}")]
    VocabularyInconsistency(String),
    /// Persisted vocabulary or merges data violates the expected format.
    #[error("invalid file format: {0}")]
    Format(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// The wrapped error.
        source: std::io::Error,
        /// File being read or written, when known.
        path: Option<PathBuf>,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A broken internal invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BpeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl BpeError {
    /// Wraps an IO error, remembering the file it concerned.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }
}
