use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::WindowStore;

/// Window size used when none is configured.
pub const DEFAULT_WINDOW_SIZE: usize = 2;

/// Number of window upserts sent to the store per bulk write.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Parameters shared by every phase of a Markov model session.
///
/// # Invariants
/// - `window_size >= 1`
/// - `batch_size >= 1`
///
/// Values read through serde bypass the setters; consumers call
/// [`ChainOptions::validate`] before using them.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ChainOptions {
	/// Number of consecutive tokens forming a window (the model order).
	window_size: usize,

	/// Flush threshold of the transition-table batch writer.
	batch_size: usize,
}

impl Default for ChainOptions {
	fn default() -> Self {
		Self { window_size: DEFAULT_WINDOW_SIZE, batch_size: DEFAULT_BATCH_SIZE }
	}
}

impl ChainOptions {
	/// Options with the given window size and the default batch size.
	///
	/// # Errors
	/// `InvalidWindowSize` if `window_size == 0`.
	pub fn new(window_size: usize) -> Result<Self> {
		let mut options = Self::default();
		options.set_window_size(window_size)?;
		Ok(options)
	}

	pub fn window_size(&self) -> usize {
		self.window_size
	}

	pub fn batch_size(&self) -> usize {
		self.batch_size
	}

	pub fn set_window_size(&mut self, window_size: usize) -> Result<()> {
		if window_size == 0 {
			return Err(Error::InvalidWindowSize(window_size));
		}
		self.window_size = window_size;
		Ok(())
	}

	pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
		if batch_size == 0 {
			return Err(Error::InvalidBatchSize(batch_size));
		}
		self.batch_size = batch_size;
		Ok(())
	}

	/// Takes the window size of the model held by `store`, if it holds one.
	pub fn with_stored_window_size<S: WindowStore + ?Sized>(mut self, store: &S) -> Result<Self> {
		if let Some(stored) = store.stored_window_size()? {
			self.set_window_size(stored)?;
		}
		Ok(self)
	}

	pub fn validate(&self) -> Result<()> {
		if self.window_size == 0 {
			return Err(Error::InvalidWindowSize(self.window_size));
		}
		if self.batch_size == 0 {
			return Err(Error::InvalidBatchSize(self.batch_size));
		}
		Ok(())
	}
}
