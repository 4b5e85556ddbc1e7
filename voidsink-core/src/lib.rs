//! Infinite-content generation engine for the VoidSink tarpit.
//!
//! This crate provides everything a deceptive endpoint needs to produce an
//! endless, plausible byte stream:
//! - A corpus-trained word-adjacency model (`CorpusModel`)
//! - A per-stream cursor producing an unbounded token sequence (`SequenceGenerator`)
//! - A reusable buffer arena for continuous writes (`ChunkPool`)
//!
//! The model is immutable once built and meant to be shared by reference
//! (`Arc<CorpusModel>`) across every concurrent stream. Randomness is always
//! supplied by the caller, so readers never contend on a shared generator.

/// Corpus model and sequence generation.
///
/// Exposes the content-source interface consumed by transport handlers:
/// `seed`, `next` and `advance`.
pub mod model;

/// Reusable byte buffers for streaming writes.
pub mod pool;

/// Error types surfaced at startup.
pub mod error;

/// I/O utilities (corpus loading, path helpers).
///
/// Not exposed
pub(crate) mod io;

pub use error::ConfigurationError;
pub use model::corpus_model::{CorpusModel, ModelStats, State, TokenId};
pub use model::generator::SequenceGenerator;
pub use model::tokenizer::Tokenizer;
pub use pool::{ChunkPool, PooledBuffer};
