use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{BulkReport, CounterStore, Insertion, TokenStore, WindowRow, WindowStore, WindowUpsert};
use crate::error::{Error, Result};
use crate::{TokenId, Window};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct StoredWindow {
	value: HashMap<TokenId, u64>,
	start: bool,
}

/// All collections, serialized as-is into a snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct Collections {
	counters: HashMap<String, u64>,
	words: HashMap<String, TokenId>,
	indices: BTreeMap<TokenId, String>,
	windows: HashMap<Window, StoredWindow>,
	/// Keys of the rows flagged `start`, for uniform sampling.
	starts: Vec<Window>,
}

/// In-process store guarded by a single `RwLock`.
///
/// Each trait method takes the lock once, which makes every write atomic with
/// respect to other threads sharing the store through an `Arc`. Durability is
/// provided by [`MemoryStore::persist`], which writes a postcard snapshot that
/// [`MemoryStore::open`] reads back.
#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: RwLock<Collections>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads the snapshot at `path`, or returns an empty store if the file
	/// does not exist yet.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		if !path.exists() {
			debug!("no snapshot at {}, starting empty", path.display());
			return Ok(Self::new());
		}
		let bytes = fs::read(path)?;
		let collections: Collections = postcard::from_bytes(&bytes)?;
		debug!(
			"loaded snapshot {} ({} words, {} windows)",
			path.display(),
			collections.words.len(),
			collections.windows.len()
		);
		Ok(Self { inner: RwLock::new(collections) })
	}

	/// Atomically replaces the snapshot at `path` with the current contents.
	///
	/// The bytes go to a temporary file in the same directory which is then
	/// renamed over `path`, so readers never see a half-written snapshot.
	pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let path = path.as_ref();
		let bytes = postcard::to_stdvec(&*self.read()?)?;

		let parent = match path.parent() {
			Some(p) if !p.as_os_str().is_empty() => p,
			_ => Path::new("."),
		};
		fs::create_dir_all(parent)?;

		let mut temp_file = NamedTempFile::new_in(parent)?;
		temp_file.write_all(&bytes)?;
		temp_file.persist(path).map_err(|e| e.error)?;
		debug!("wrote snapshot {} ({} bytes)", path.display(), bytes.len());
		Ok(())
	}

	fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
		self.inner.read().map_err(|_| Error::Poisoned)
	}

	fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
		self.inner.write().map_err(|_| Error::Poisoned)
	}
}

impl CounterStore for MemoryStore {
	fn insert_counter(&self, name: &str, last_id: u64) -> Result<()> {
		let mut collections = self.write()?;
		if collections.counters.contains_key(name) {
			return Err(Error::AlreadyExists { collection: "counter", key: name.to_owned() });
		}
		collections.counters.insert(name.to_owned(), last_id);
		Ok(())
	}

	fn counter(&self, name: &str) -> Result<u64> {
		self.read()?
			.counters
			.get(name)
			.copied()
			.ok_or_else(|| Error::not_found("counter", name))
	}

	fn raise_counter(&self, name: &str, value: u64) -> Result<()> {
		let mut collections = self.write()?;
		let last_id = collections
			.counters
			.get_mut(name)
			.ok_or_else(|| Error::not_found("counter", name))?;
		*last_id = (*last_id).max(value);
		Ok(())
	}

	fn increment_counter(&self, name: &str, amount: u64) -> Result<()> {
		let mut collections = self.write()?;
		let value = collections
			.counters
			.get_mut(name)
			.ok_or_else(|| Error::not_found("counter", name))?;
		*value += amount;
		Ok(())
	}
}

impl TokenStore for MemoryStore {
	fn word_idx(&self, word: &str) -> Result<Option<TokenId>> {
		Ok(self.read()?.words.get(word).copied())
	}

	fn idx_word(&self, idx: TokenId) -> Result<Option<String>> {
		Ok(self.read()?.indices.get(&idx).cloned())
	}

	fn max_idx(&self) -> Result<Option<TokenId>> {
		Ok(self.read()?.indices.keys().next_back().copied())
	}

	fn tokens(&self) -> Result<Vec<(String, TokenId)>> {
		Ok(self
			.read()?
			.indices
			.iter()
			.map(|(idx, word)| (word.clone(), *idx))
			.collect())
	}

	fn insert_word_if_absent(&self, word: &str, idx: TokenId) -> Result<Insertion> {
		let mut collections = self.write()?;
		if collections.words.contains_key(word) {
			return Ok(Insertion::WordExists);
		}
		if collections.indices.contains_key(&idx) {
			return Ok(Insertion::IndexTaken);
		}
		collections.words.insert(word.to_owned(), idx);
		collections.indices.insert(idx, word.to_owned());
		Ok(Insertion::Inserted)
	}

	fn insert_tokens(&self, entries: Vec<(String, TokenId)>) -> Result<()> {
		let mut collections = self.write()?;

		let mut batch_words = HashSet::with_capacity(entries.len());
		let mut batch_indices = HashSet::with_capacity(entries.len());
		for (word, idx) in &entries {
			if collections.words.contains_key(word) || !batch_words.insert(word.as_str()) {
				return Err(Error::Integrity(format!("duplicate word '{}'", word)));
			}
			if collections.indices.contains_key(idx) || !batch_indices.insert(*idx) {
				return Err(Error::Integrity(format!("duplicate idx {}", idx)));
			}
		}

		for (word, idx) in entries {
			collections.indices.insert(idx, word.clone());
			collections.words.insert(word, idx);
		}
		Ok(())
	}
}

impl WindowStore for MemoryStore {
	fn window(&self, key: &[TokenId]) -> Result<Option<WindowRow>> {
		Ok(self.read()?.windows.get(key).map(|stored| WindowRow {
			key: key.to_vec(),
			value: stored.value.clone(),
			start: stored.start,
		}))
	}

	fn sample_start_windows(&self, n: usize) -> Result<Vec<WindowRow>> {
		let collections = self.read()?;
		let mut rng = rand::rng();
		Ok(collections
			.starts
			.choose_multiple(&mut rng, n)
			.filter_map(|key| {
				collections.windows.get(key).map(|stored| WindowRow {
					key: key.clone(),
					value: stored.value.clone(),
					start: stored.start,
				})
			})
			.collect())
	}

	fn bulk_upsert_windows(&self, operations: Vec<WindowUpsert>) -> Result<BulkReport> {
		let mut collections = self.write()?;
		let Collections { windows, starts, .. } = &mut *collections;

		let mut report = BulkReport::default();
		for WindowUpsert { key, increments, start } in operations {
			if windows.contains_key(&key) {
				report.updated += 1;
			} else {
				report.inserted += 1;
				if start {
					starts.push(key.clone());
				}
			}
			let stored = windows
				.entry(key)
				.or_insert_with(|| StoredWindow { value: HashMap::new(), start });
			for (next, count) in increments {
				*stored.value.entry(next).or_insert(0) += count;
			}
		}
		Ok(report)
	}

	fn window_count(&self) -> Result<usize> {
		Ok(self.read()?.windows.len())
	}

	fn stored_window_size(&self) -> Result<Option<usize>> {
		Ok(self.read()?.windows.keys().next().map(Vec::len))
	}

	fn windows(&self) -> Result<Vec<WindowRow>> {
		Ok(self
			.read()?
			.windows
			.iter()
			.map(|(key, stored)| WindowRow {
				key: key.clone(),
				value: stored.value.clone(),
				start: stored.start,
			})
			.collect())
	}
}

impl MemoryStore {
	/// Number of vocabulary entries.
	pub fn token_count(&self) -> Result<usize> {
		Ok(self.read()?.words.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::TOKENS;

	fn upsert(key: &[TokenId], next: &[(TokenId, u64)], start: bool) -> WindowUpsert {
		WindowUpsert { key: key.to_vec(), increments: next.iter().copied().collect(), start }
	}

	#[test]
	fn test_counter_lifecycle() {
		let store = MemoryStore::new();
		assert!(matches!(store.counter("tokens"), Err(Error::NotFound { .. })));

		store.insert_counter("tokens", 0).unwrap();
		assert!(matches!(store.insert_counter("tokens", 3), Err(Error::AlreadyExists { .. })));

		store.increment_counter("tokens", 2).unwrap();
		assert_eq!(store.counter("tokens").unwrap(), 2);
		store.raise_counter("tokens", 10).unwrap();
		assert_eq!(store.counter("tokens").unwrap(), 10);
		store.raise_counter("tokens", 3).unwrap();
		assert_eq!(store.counter("tokens").unwrap(), 10);
		assert!(store.raise_counter("other", 1).is_err());
	}

	#[test]
	fn test_insert_word_if_absent_outcomes() {
		let store = MemoryStore::new();
		assert_eq!(store.insert_word_if_absent("cat", 0).unwrap(), Insertion::Inserted);
		assert_eq!(store.insert_word_if_absent("cat", 1).unwrap(), Insertion::WordExists);
		assert_eq!(store.insert_word_if_absent("dog", 0).unwrap(), Insertion::IndexTaken);
		assert_eq!(store.word_idx("cat").unwrap(), Some(0));
		assert_eq!(store.word_idx("dog").unwrap(), None);
	}

	#[test]
	fn test_insert_tokens_is_all_or_nothing() {
		let store = MemoryStore::new();
		store.insert_tokens(vec![("a".into(), 0), ("b".into(), 1)]).unwrap();

		let duplicate_idx = store.insert_tokens(vec![("c".into(), 2), ("d".into(), 1)]);
		assert!(matches!(duplicate_idx, Err(Error::Integrity(_))));
		let duplicate_word = store.insert_tokens(vec![("e".into(), 5), ("e".into(), 6)]);
		assert!(matches!(duplicate_word, Err(Error::Integrity(_))));

		assert_eq!(store.word_idx("c").unwrap(), None);
		assert_eq!(store.max_idx().unwrap(), Some(1));
		assert_eq!(store.tokens().unwrap(), vec![("a".to_owned(), 0), ("b".to_owned(), 1)]);
	}

	#[test]
	fn test_bulk_upsert_adds_counts_and_keeps_start() {
		let store = MemoryStore::new();
		let report = store
			.bulk_upsert_windows(vec![upsert(&[0, 1], &[(2, 1)], true), upsert(&[1, 2], &[(3, 2)], false)])
			.unwrap();
		assert_eq!(report, BulkReport { inserted: 2, updated: 0 });

		let report = store
			.bulk_upsert_windows(vec![upsert(&[0, 1], &[(2, 4), (5, 1)], false)])
			.unwrap();
		assert_eq!(report, BulkReport { inserted: 0, updated: 1 });

		let row = store.window(&[0, 1]).unwrap().unwrap();
		assert!(row.start);
		assert_eq!(row.value[&2], 5);
		assert_eq!(row.value[&5], 1);
		assert_eq!(store.window_count().unwrap(), 2);
	}

	#[test]
	fn test_sample_start_windows_only_returns_starts() {
		let store = MemoryStore::new();
		assert!(store.sample_start_windows(1).unwrap().is_empty());

		store
			.bulk_upsert_windows(vec![upsert(&[0, 1], &[(2, 1)], true), upsert(&[1, 2], &[(3, 1)], false)])
			.unwrap();
		for _ in 0..20 {
			let rows = store.sample_start_windows(1).unwrap();
			assert_eq!(rows.len(), 1);
			assert_eq!(rows[0].key, vec![0, 1]);
		}
	}

	#[test]
	fn test_snapshot_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.bin");

		let store = MemoryStore::open(&path).unwrap();
		store.insert_counter(TOKENS, 1).unwrap();
		store.insert_tokens(vec![("end".into(), 0), ("cat".into(), 1)]).unwrap();
		store.bulk_upsert_windows(vec![upsert(&[0, 1], &[(0, 3)], true)]).unwrap();
		store.persist(&path).unwrap();

		let reopened = MemoryStore::open(&path).unwrap();
		assert_eq!(reopened.counter(TOKENS).unwrap(), 1);
		assert_eq!(reopened.token_count().unwrap(), 2);
		assert_eq!(reopened.word_idx("cat").unwrap(), Some(1));
		assert_eq!(reopened.window(&[0, 1]).unwrap().unwrap().value[&0], 3);
		assert_eq!(reopened.sample_start_windows(1).unwrap().len(), 1);
	}
}
