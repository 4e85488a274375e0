use thiserror::Error;

use crate::TokenId;

/// Errors raised by the store, the vocabulary and the Markov model.
///
/// Lookup failures (`NotFound`, `UnknownWord`, `UnknownIndex`, `UnknownWindow`)
/// are always surfaced to the caller. Uniqueness violations, empty
/// distributions and a missing sentinel are fatal for the current run.
#[derive(Debug, Error)]
pub enum Error {
	#[error("no {collection} record matches '{key}'")]
	NotFound { collection: &'static str, key: String },

	#[error("unknown word '{0}'")]
	UnknownWord(String),

	#[error("unknown token index {0}")]
	UnknownIndex(TokenId),

	#[error("window {0:?} was never observed during training")]
	UnknownWindow(Vec<TokenId>),

	#[error("{collection} record '{key}' already exists")]
	AlreadyExists { collection: &'static str, key: String },

	#[error("integrity violation: {0}")]
	Integrity(String),

	#[error("cannot sample from an empty distribution")]
	EmptyDistribution,

	#[error("no window is flagged as a sentence start")]
	NoStartSequence,

	#[error("vocabulary has no sentinel word '{}'", crate::vocabulary::SENTINEL)]
	MissingSentinel,

	#[error("window size must be >= 1, got {0}")]
	InvalidWindowSize(usize),

	#[error("batch size must be >= 1, got {0}")]
	InvalidBatchSize(usize),

	#[error("stored model uses windows of {stored} tokens, got {requested}")]
	WindowSizeMismatch { stored: usize, requested: usize },

	#[error("{operation} is not supported by the {strategy} vocabulary")]
	Unsupported { operation: &'static str, strategy: &'static str },

	#[error("could not reserve an id for '{word}' after {attempts} attempts")]
	ReservationContention { word: String, attempts: usize },

	#[error("store lock poisoned")]
	Poisoned,

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("snapshot encoding error: {0}")]
	Snapshot(#[from] postcard::Error),
}

impl Error {
	pub(crate) fn not_found<K: ToString>(collection: &'static str, key: K) -> Self {
		Error::NotFound { collection, key: key.to_string() }
	}

	/// Whether a batch generation loop may skip the failed sentence and go on.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Error::UnknownWindow(_) | Error::EmptyDistribution)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
