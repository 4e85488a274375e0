use std::sync::Arc;

use log::{debug, info};

use super::batch::BatchWriter;
use super::options::ChainOptions;
use super::table::TransitionTable;
use crate::dictogram::Dictogram;
use crate::error::{Error, Result};
use crate::store::{BulkReport, Store};
use crate::vocabulary::Vocabulary;
use crate::{TokenId, Window};

/// Word-level Markov chain whose transition table lives in a [`Store`].
///
/// # Responsibilities
/// - Build a [`TransitionTable`] from tokenized text
/// - Merge a table into the store additively (retraining never overwrites)
/// - Generate id sequences by weighted random walk over stored windows
///
/// The chain only reads the store during generation, so it can run next to
/// a retraining job; it may then observe a partially merged table.
#[derive(Debug)]
pub struct MarkovChain<S: Store> {
	store: Arc<S>,
	options: ChainOptions,
}

impl<S: Store> MarkovChain<S> {
	/// # Errors
	/// - `InvalidWindowSize` / `InvalidBatchSize` for out-of-range options
	/// - `WindowSizeMismatch` if the store already holds windows of another size
	pub fn new(store: Arc<S>, options: ChainOptions) -> Result<Self> {
		options.validate()?;
		if let Some(stored) = store.stored_window_size()? {
			if stored != options.window_size() {
				return Err(Error::WindowSizeMismatch { stored, requested: options.window_size() });
			}
		}
		Ok(Self { store, options })
	}

	pub fn store(&self) -> &Arc<S> {
		&self.store
	}

	pub fn options(&self) -> &ChainOptions {
		&self.options
	}

	pub fn window_size(&self) -> usize {
		self.options.window_size()
	}

	/// Tokenizes `text` and counts, for every window, the token that follows.
	///
	/// # Errors
	/// `UnknownWord` if a word of `text` is missing from `vocabulary`; words
	/// are never skipped.
	pub fn create_model_from_text(&self, text: &str, vocabulary: &Vocabulary<S>) -> Result<TransitionTable> {
		let ids = vocabulary.text_to_ids(text)?;
		debug!("converted text to {} ids", ids.len());
		let table = TransitionTable::build_parallel(&ids, self.window_size());
		info!("built {} windows from {} tokens", table.len(), ids.len());
		Ok(table)
	}

	/// Upserts every window of `table` into the store.
	///
	/// New rows get `start = (key[0] == end_id)`; existing rows keep their
	/// flag and have the new counts added to theirs. Writes are grouped in
	/// bulk operations of `batch_size`.
	pub fn save(&self, table: TransitionTable, end_id: TokenId) -> Result<BulkReport> {
		let total = table.len();
		let mut writer = BatchWriter::new(&*self.store, self.options.batch_size());
		for (i, upsert) in table.into_upserts(end_id).enumerate() {
			writer.push(upsert)?;
			if (i + 1) % 10_000 == 0 {
				debug!("saving: {}/{}", i + 1, total);
			}
		}
		let report = writer.finish()?;
		info!("saved {} windows ({} new, {} merged)", total, report.inserted, report.updated);
		Ok(report)
	}

	/// Stored distribution of the token following `window`.
	///
	/// # Errors
	/// `UnknownWindow` if `window` was never observed.
	fn distribution(&self, window: &[TokenId]) -> Result<Dictogram<TokenId>> {
		let row = self
			.store
			.window(window)?
			.ok_or_else(|| Error::UnknownWindow(window.to_vec()))?;
		Ok(Dictogram::from_counts(row.value))
	}

	/// Picks a sentence opening.
	///
	/// A row flagged `start` is drawn uniformly; its leading token (the
	/// sentinel) is dropped and one weighted draw from its distribution
	/// completes a full window.
	///
	/// # Errors
	/// `NoStartSequence` if no row is flagged `start`.
	pub fn generate_random_start_sequence(&self) -> Result<Window> {
		let row = self
			.store
			.sample_start_windows(1)?
			.into_iter()
			.next()
			.ok_or(Error::NoStartSequence)?;

		let dictogram = Dictogram::from_counts(row.value);
		let mut window = row.key[1..].to_vec();
		window.push(*dictogram.sample_weighted()?);
		Ok(window)
	}

	/// Extends `start` by `length` tokens.
	///
	/// Each step looks up the current window (the last `window_size` ids),
	/// draws the next id by weight and slides the window by one.
	///
	/// Returns `start` followed by the `length` generated ids.
	///
	/// # Errors
	/// `UnknownWindow` if a window (including `start`) is absent from the
	/// store or has the wrong size.
	pub fn generate_random_sentence(&self, length: usize, start: &[TokenId]) -> Result<Vec<TokenId>> {
		let w = self.window_size();
		if start.len() != w {
			return Err(Error::UnknownWindow(start.to_vec()));
		}

		let mut sentence = Vec::with_capacity(w + length);
		sentence.extend_from_slice(start);
		for _ in 0..length {
			let window = &sentence[sentence.len() - w..];
			let next = *self.distribution(window)?.sample_weighted()?;
			sentence.push(next);
		}
		Ok(sentence)
	}

	/// Generates `length` tokens from a random sentence start and returns them
	/// as text, without any sentinel.
	pub fn generate(&self, length: usize, vocabulary: &Vocabulary<S>) -> Result<String> {
		let start = self.generate_random_start_sequence()?;
		let sentence = self.generate_random_sentence(length, &start)?;

		let end_id = vocabulary.end_id();
		let words: Vec<TokenId> = sentence.into_iter().filter(|id| *id != end_id).collect();
		vocabulary.ids_to_text(&words)
	}
}
