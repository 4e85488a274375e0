//! Persistent store interface.
//!
//! The model never holds the vocabulary or the transition table as one
//! in-memory structure: both live behind a [`Store`], which is the system of
//! record across runs. The trait is split by collection:
//! - counters: `(name, last_id)`, one record per named id sequence
//! - tokens: `(word, idx)`, unique on both fields
//! - windows: `(key, value, start)`, unique on `key`
//!
//! Every method is a single synchronous request/response. Implementations must
//! make `increment_counter`, `raise_counter`, `insert_word_if_absent` and
//! each individual window upsert atomic. Concurrent trainers rely on nothing
//! else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{TokenId, Window};

mod memory;

pub use memory::MemoryStore;

/// Name of the counter sequence backing the vocabulary.
pub const TOKENS: &str = "tokens";

/// A persisted transition-table row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WindowRow {
	pub key: Window,
	/// Next-token id -> number of times it followed `key`.
	pub value: HashMap<TokenId, u64>,
	/// True iff `key[0]` is the sentinel id. Set on insertion only.
	pub start: bool,
}

/// One operation of a window bulk write.
///
/// Every count in `increments` is added to the stored row; `start` is only
/// used when the row does not exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowUpsert {
	pub key: Window,
	pub increments: HashMap<TokenId, u64>,
	pub start: bool,
}

/// Outcome of a conditional token insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
	/// This call created the record.
	Inserted,
	/// The word already has an id; nothing was written.
	WordExists,
	/// The reserved id belongs to another word; nothing was written.
	IndexTaken,
}

/// Rows touched by a bulk write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkReport {
	pub inserted: usize,
	pub updated: usize,
}

impl BulkReport {
	pub fn absorb(&mut self, other: BulkReport) {
		self.inserted += other.inserted;
		self.updated += other.updated;
	}
}

pub trait CounterStore {
	/// Creates a counter record. Fails with `AlreadyExists`.
	fn insert_counter(&self, name: &str, last_id: u64) -> Result<()>;

	/// Fails with `NotFound` if the record does not exist.
	fn counter(&self, name: &str) -> Result<u64>;

	/// Atomically sets `last_id` to `max(last_id, value)`, so a stale
	/// resynchronization never moves the counter backwards.
	/// Fails with `NotFound` if the record does not exist.
	fn raise_counter(&self, name: &str, value: u64) -> Result<()>;

	/// Atomically adds `amount` to `last_id`.
	fn increment_counter(&self, name: &str, amount: u64) -> Result<()>;
}

pub trait TokenStore {
	fn word_idx(&self, word: &str) -> Result<Option<TokenId>>;

	fn idx_word(&self, idx: TokenId) -> Result<Option<String>>;

	/// Largest assigned id, `None` for an empty vocabulary.
	fn max_idx(&self) -> Result<Option<TokenId>>;

	/// All entries ordered by id.
	fn tokens(&self) -> Result<Vec<(String, TokenId)>>;

	/// Inserts `(word, idx)` unless the word or the id is already present.
	fn insert_word_if_absent(&self, word: &str, idx: TokenId) -> Result<Insertion>;

	/// Inserts all entries or none. Any duplicate word or id, inside the batch
	/// or against stored records, fails with `Integrity`.
	fn insert_tokens(&self, entries: Vec<(String, TokenId)>) -> Result<()>;
}

pub trait WindowStore {
	fn window(&self, key: &[TokenId]) -> Result<Option<WindowRow>>;

	/// Up to `n` distinct rows drawn uniformly among those flagged `start`.
	fn sample_start_windows(&self, n: usize) -> Result<Vec<WindowRow>>;

	/// Applies every upsert. Operations are unordered; each one is atomic.
	fn bulk_upsert_windows(&self, operations: Vec<WindowUpsert>) -> Result<BulkReport>;

	fn window_count(&self) -> Result<usize>;

	/// Key length shared by the stored rows, `None` while the table is empty.
	fn stored_window_size(&self) -> Result<Option<usize>>;

	fn windows(&self) -> Result<Vec<WindowRow>>;
}

/// Everything the Markov model needs from its persistent store.
pub trait Store: CounterStore + TokenStore + WindowStore + Send + Sync {}

impl<T: CounterStore + TokenStore + WindowStore + Send + Sync> Store for T {}
