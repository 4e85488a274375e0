//! Persistent, incrementally trainable word n-gram Markov model.
//!
//! This crate provides:
//! - A monotonic id allocator persisted in a store (`counter`)
//! - A frequency distribution with weighted sampling (`dictogram`)
//! - A word <-> id vocabulary that can grow across training runs (`vocabulary`)
//! - The Markov model itself: build, additive merge, generation (`model`)
//! - The persistent store interface and an in-memory implementation (`store`)
//!
//! Training can resume at any time: new text is merged into the stored
//! counts instead of rebuilding the model.

/// Error type shared by every module.
pub mod error;

/// Store interface (counters, tokens, windows) and `MemoryStore`.
pub mod store;

/// Named id sequences backing the vocabulary.
pub mod counter;

/// Counted multiset with uniform and frequency-weighted draws.
pub mod dictogram;

/// Word <-> id mapping with fresh, loaded and store-backed strategies.
pub mod vocabulary;

/// Transition table, Markov chain and session phases.
pub mod model;

/// Corpus loading and sentence marking.
pub mod io;

pub use error::{Error, Result};

/// Identity of a vocabulary word.
pub type TokenId = u64;

/// `window_size` consecutive token ids, the lookup key of the transition table.
pub type Window = Vec<TokenId>;
