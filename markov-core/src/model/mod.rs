//! Word-level Markov model.
//!
//! This module provides:
//! - Session options (`ChainOptions`)
//! - The in-memory transition table built by a training pass (`TransitionTable`)
//! - Buffered bulk writes of that table (`BatchWriter`)
//! - The store-backed chain: build, additive save, generation (`MarkovChain`)
//! - The build and generate phases of a session (`Trainer`, `Generator`)

/// Window and batch sizes, with validated setters.
pub mod options;

/// Window -> next-token distributions accumulated from one text.
///
/// Supports sequential and multi-threaded construction and additive merging.
pub mod table;

/// Buffered writer flushing window upserts to the store in bulk.
pub mod batch;

/// Markov chain over a persistent transition table.
///
/// Handles table construction from text, additive persistence,
/// and weighted random walks seeded from sentence starts.
pub mod chain;

/// Train / retrain pipelines and the read-only generation phase.
pub mod session;

pub use chain::MarkovChain;
pub use options::ChainOptions;
pub use session::{Generator, Mode, TrainReport, Trainer};
pub use table::TransitionTable;
