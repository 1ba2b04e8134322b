//! Byte-level byte pair encoding (BPE): training, encoding, and decoding.
//!
//! The crate exposes a library API and a `bytebpe` command line interface.
//! Text is split into GPT-2 style pretokens (special tokens such as
//! `<|endoftext|>` are kept whole), a [`Trainer`] learns a ranked merge list
//! from the resulting byte sequences, and a [`Tokenizer`] applies those merges
//! to turn text into token ids and back. Every byte has its own id, so encoding
//! never fails on unseen input and decoding is lossless.
//!
//! ```no_run
//! use bytebpe::{Trainer, TrainerConfig};
//!
//! # fn main() -> bytebpe::Result<()> {
//! let trainer_cfg = TrainerConfig::builder()
//!     .target_vocab_size(4096)
//!     .min_frequency(2)
//!     .show_progress(false)
//!     .build()?;
//! let trainer = Trainer::new(trainer_cfg);
//! let artifacts = trainer.train_from_text("low lower lowest<|endoftext|>new newer")?;
//! artifacts.model.save("model")?;
//!
//! let tokenizer = artifacts.model.tokenizer()?;
//! let ids = tokenizer.encode("lower<|endoftext|>")?;
//! assert_eq!(tokenizer.decode(&ids), "lower<|endoftext|>");
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature.  Users targeting the
//! library portion only can disable default features to avoid the CLI
//! dependencies: `bytebpe = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod bytes;
pub mod cache;
pub mod config;
pub mod corpus;
mod encoder;
pub mod error;
pub mod merges;
pub mod metrics;
pub mod model;
pub mod pretokenize;
pub mod serialization;
pub mod tokenizer;
pub mod trainer;
pub mod vocab;

pub use config::{
    IngestConfig, TokenizerConfig, TrainerBuilder, TrainerConfig, DEFAULT_CACHE_CAPACITY,
    END_OF_TEXT,
};
pub use error::{BpeError, Result};
pub use merges::{MergeRule, MergeTable, Rank};
pub use metrics::{IterationMetrics, StopReason, TrainingMetrics};
pub use model::{BpeModel, Pair, TokenId};
pub use pretokenize::{PreTokenizer, Segment, GPT2_PATTERN};
pub use tokenizer::{EncodeStream, Tokenizer};
pub use trainer::{Trainer, TrainerArtifacts};
pub use vocab::Vocabulary;
