//! Corpus model and generation.
//!
//! This module provides the infinite-content engine, including:
//! - Corpus tokenization, plain or markup-aware (`Tokenizer`)
//! - The immutable word-adjacency table (`CorpusModel`)
//! - Per-stream generation state (`SequenceGenerator`)

/// Immutable second-order word model built from a corpus.
///
/// Supports parallel construction, frequency-weighted sampling and the
/// teleport fallback that keeps every stream alive.
pub mod corpus_model;

/// Per-stream cursor over a shared `CorpusModel`.
///
/// Advances one token at a time and fills byte buffers for streaming.
pub mod generator;

/// Corpus tokenization strategies.
pub mod tokenizer;

/// Transition accumulation used while a model is being built.
///
/// Tracks the observed followers of one state and supports merging partial
/// tables produced by worker threads.
/// This module is not exposed publicly.
mod transitions;
