use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use log::{debug, info};

use crate::counter::Counter;
use crate::error::{Error, Result};
use crate::store::{Insertion, Store, TOKENS};
use crate::TokenId;

/// Word marking sentence boundaries in the token stream.
pub const SENTINEL: &str = "end";

/// Upper bound on id reservations lost to a concurrent writer that has
/// inserted its word but not yet committed the counter.
const MAX_RESERVATION_ATTEMPTS: usize = 1024;

/// Fully materialized word <-> id bijection.
#[derive(Clone, Debug, Default)]
pub struct WordTable {
	word2idx: HashMap<String, TokenId>,
	idx2word: HashMap<TokenId, String>,
}

impl WordTable {
	/// Lower-cases and whitespace-splits `text`, then assigns ids `0..N`
	/// to the distinct words in lexicographic order.
	pub fn from_corpus(text: &str) -> Self {
		let words: BTreeSet<String> = text.split_whitespace().map(str::to_lowercase).collect();
		Self::from_entries(words.into_iter().zip(0..))
	}

	fn from_entries<I: IntoIterator<Item = (String, TokenId)>>(entries: I) -> Self {
		let mut table = Self::default();
		for (word, idx) in entries {
			table.idx2word.insert(idx, word.clone());
			table.word2idx.insert(word, idx);
		}
		table
	}

	pub fn len(&self) -> usize {
		self.word2idx.len()
	}

	pub fn is_empty(&self) -> bool {
		self.word2idx.is_empty()
	}

	pub fn idx(&self, word: &str) -> Option<TokenId> {
		self.word2idx.get(word).copied()
	}

	pub fn word(&self, idx: TokenId) -> Option<&str> {
		self.idx2word.get(&idx).map(String::as_str)
	}

	/// Entries ordered by id.
	pub fn entries(&self) -> Vec<(String, TokenId)> {
		let mut entries: Vec<_> = self.word2idx.iter().map(|(w, i)| (w.clone(), *i)).collect();
		entries.sort_by_key(|(_, idx)| *idx);
		entries
	}
}

/// How a [`Vocabulary`] resolves words and ids.
///
/// # Variants
/// - `Fresh`: built from the corpus of a first training pass; immutable.
/// - `Loaded`: every persisted entry copied into memory; immutable.
/// - `Persistent`: each lookup queries the store, and new words are
///   allocated ids through the [`Counter`].
#[derive(Debug)]
pub enum Strategy<S> {
	Fresh(WordTable),
	Loaded(WordTable),
	Persistent(Arc<S>),
}

impl<S> Strategy<S> {
	pub fn name(&self) -> &'static str {
		match self {
			Strategy::Fresh(_) => "fresh",
			Strategy::Loaded(_) => "loaded",
			Strategy::Persistent(_) => "persistent",
		}
	}
}

/// Bijective mapping between words and token ids.
///
/// The id of [`SENTINEL`] is resolved once at construction and cached in
/// `end_id`.
#[derive(Debug)]
pub struct Vocabulary<S: Store> {
	strategy: Strategy<S>,
	end_id: TokenId,
}

impl<S: Store> Vocabulary<S> {
	/// # Errors
	/// `MissingSentinel` if the strategy cannot resolve [`SENTINEL`].
	pub fn new(strategy: Strategy<S>) -> Result<Self> {
		let end_id = lookup(&strategy, SENTINEL)?.ok_or(Error::MissingSentinel)?;
		Ok(Self { strategy, end_id })
	}

	/// Builds a fresh vocabulary from raw corpus text.
	pub fn fresh(text: &str) -> Result<Self> {
		let table = WordTable::from_corpus(text);
		info!("built fresh vocabulary of {} words", table.len());
		Self::new(Strategy::Fresh(table))
	}

	/// Copies every persisted entry into memory.
	pub fn load(store: &S) -> Result<Self> {
		let table = WordTable::from_entries(store.tokens()?);
		info!("loaded vocabulary of {} words", table.len());
		Self::new(Strategy::Loaded(table))
	}

	/// Store-backed vocabulary, always reflecting the current store contents.
	pub fn persistent(store: Arc<S>) -> Result<Self> {
		Self::new(Strategy::Persistent(store))
	}

	pub fn strategy(&self) -> &Strategy<S> {
		&self.strategy
	}

	/// Id of the sentence boundary word.
	pub fn end_id(&self) -> TokenId {
		self.end_id
	}

	/// Number of words currently known.
	pub fn len(&self) -> Result<usize> {
		match &self.strategy {
			Strategy::Fresh(table) | Strategy::Loaded(table) => Ok(table.len()),
			Strategy::Persistent(store) => Ok(store.tokens()?.len()),
		}
	}

	/// # Errors
	/// `UnknownWord` if `word` has no id.
	pub fn word_to_idx(&self, word: &str) -> Result<TokenId> {
		lookup(&self.strategy, word)?.ok_or_else(|| Error::UnknownWord(word.to_owned()))
	}

	/// # Errors
	/// `UnknownIndex` if no word owns `idx`.
	pub fn idx_to_word(&self, idx: TokenId) -> Result<String> {
		let word = match &self.strategy {
			Strategy::Fresh(table) | Strategy::Loaded(table) => table.word(idx).map(str::to_owned),
			Strategy::Persistent(store) => store.idx_word(idx)?,
		};
		word.ok_or(Error::UnknownIndex(idx))
	}

	/// Adds `word` (lower-cased) to a persistent vocabulary.
	///
	/// The id `counter.get(TOKENS) + 1` is reserved and a conditional insert
	/// is attempted. Only the call that creates the record commits the
	/// reservation by incrementing the counter. If the word already exists
	/// this is a no-op. If another writer holds the reserved id but has not
	/// committed it yet, the counter is read again.
	///
	/// Returns the new id, or `None` if the word was already known.
	pub fn update(&self, word: &str, counter: &Counter<S>) -> Result<Option<TokenId>> {
		let store = match &self.strategy {
			Strategy::Persistent(store) => store,
			other => {
				return Err(Error::Unsupported { operation: "update", strategy: other.name() });
			}
		};

		let word = word.to_lowercase();
		for _ in 0..MAX_RESERVATION_ATTEMPTS {
			if store.word_idx(&word)?.is_some() {
				return Ok(None);
			}
			let reserved = counter.get(TOKENS)? + 1;
			match store.insert_word_if_absent(&word, reserved)? {
				Insertion::Inserted => {
					counter.increment(TOKENS, 1)?;
					return Ok(Some(reserved));
				}
				Insertion::WordExists => return Ok(None),
				Insertion::IndexTaken => thread::yield_now(),
			}
		}

		Err(Error::ReservationContention { word, attempts: MAX_RESERVATION_ATTEMPTS })
	}

	/// Calls [`Vocabulary::update`] once per distinct word, in source order.
	///
	/// Returns the number of words that received a new id.
	pub fn update_many<'a, I>(&self, words: I, counter: &Counter<S>) -> Result<usize>
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut seen = HashSet::new();
		let mut added = 0;
		for word in words {
			if !seen.insert(word.to_lowercase()) {
				continue;
			}
			if self.update(word, counter)?.is_some() {
				added += 1;
			}
			if seen.len() % 10_000 == 0 {
				debug!("updating vocabulary: {} distinct words checked", seen.len());
			}
		}
		info!("vocabulary update: {} new words out of {} distinct", added, seen.len());
		Ok(added)
	}

	/// Grows the vocabulary with every word of `text`.
	pub fn update_from_text(&self, text: &str, counter: &Counter<S>) -> Result<usize> {
		self.update_many(text.split_whitespace(), counter)
	}

	/// Converts whitespace-separated text to ids, lower-casing every word.
	///
	/// # Errors
	/// `UnknownWord` on the first word without an id.
	pub fn text_to_ids(&self, text: &str) -> Result<Vec<TokenId>> {
		text.split_whitespace()
			.map(|word| self.word_to_idx(&word.to_lowercase()))
			.collect()
	}

	/// Joins the words of `ids` with single spaces.
	pub fn ids_to_text(&self, ids: &[TokenId]) -> Result<String> {
		let words = ids
			.iter()
			.map(|idx| self.idx_to_word(*idx))
			.collect::<Result<Vec<_>>>()?;
		Ok(words.join(" "))
	}

	/// Persists an in-memory vocabulary.
	///
	/// # Errors
	/// `Integrity` if a word or an id is already stored; nothing is written
	/// in that case. `Unsupported` for a persistent vocabulary.
	pub fn save(&self, store: &S) -> Result<()> {
		match &self.strategy {
			Strategy::Fresh(table) | Strategy::Loaded(table) => {
				info!("saving vocabulary of {} words", table.len());
				store.insert_tokens(table.entries())
			}
			Strategy::Persistent(_) => {
				Err(Error::Unsupported { operation: "save", strategy: self.strategy.name() })
			}
		}
	}
}

fn lookup<S: Store>(strategy: &Strategy<S>, word: &str) -> Result<Option<TokenId>> {
	match strategy {
		Strategy::Fresh(table) | Strategy::Loaded(table) => Ok(table.idx(word)),
		Strategy::Persistent(store) => store.word_idx(word),
	}
}
