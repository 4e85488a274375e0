use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::store::Store;

/// Monotonic id allocator for a named sequence, persisted in the store.
///
/// The vocabulary reserves `get(name) + 1` for a new word and only calls
/// `increment` once its insertion won, so the counter never double-spends an
/// id even when several writers grow the same vocabulary.
#[derive(Debug)]
pub struct Counter<S: Store> {
	store: Arc<S>,
}

impl<S: Store> Clone for Counter<S> {
	fn clone(&self) -> Self {
		Self { store: Arc::clone(&self.store) }
	}
}

impl<S: Store> Counter<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { store }
	}

	/// Creates the counter record for `name`.
	///
	/// # Errors
	/// `AlreadyExists` if the sequence was initialized before. Calling this
	/// twice is a caller bug, typically training a fresh model into a store
	/// that already holds one.
	pub fn initialize(&self, name: &str, last_id: u64) -> Result<()> {
		self.store.insert_counter(name, last_id)
	}

	/// Resynchronizes `last_id` with the largest id in the vocabulary store.
	///
	/// The store applies it as a raise, never lowering a counter that a
	/// concurrent writer has already advanced.
	///
	/// # Errors
	/// `NotFound` if the vocabulary is empty or the counter was never
	/// initialized.
	pub fn update(&self, name: &str) -> Result<()> {
		let max_idx = self
			.store
			.max_idx()?
			.ok_or_else(|| Error::not_found("tokens", "max idx"))?;
		debug!("counter '{}' resynchronized to {}", name, max_idx);
		self.store.raise_counter(name, max_idx)
	}

	/// Atomically adds `amount` to `last_id`.
	pub fn increment(&self, name: &str, amount: u64) -> Result<()> {
		self.store.increment_counter(name, amount)
	}

	/// Returns the current `last_id`.
	pub fn get(&self, name: &str) -> Result<u64> {
		self.store.counter(name)
	}
}
