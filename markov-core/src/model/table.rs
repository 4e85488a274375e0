use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use crate::dictogram::Dictogram;
use crate::store::WindowUpsert;
use crate::{TokenId, Window};

/// Below this many window positions the table is built on the calling thread.
const PARALLEL_THRESHOLD: usize = 1 << 15;

/// In-memory transition table produced by one training pass.
///
/// Maps every observed window of `window_size` ids to the distribution of
/// the id that followed it. The table is discarded once saved; the store
/// keeps the cumulative counts.
///
/// # Invariants
/// - every key has exactly `window_size` ids
/// - every distribution is non-empty
#[derive(Clone, Debug)]
pub struct TransitionTable {
	window_size: usize,
	windows: HashMap<Window, Dictogram<TokenId>>,
}

impl TransitionTable {
	pub fn new(window_size: usize) -> Self {
		Self { window_size, windows: HashMap::new() }
	}

	/// Slides a window over `ids` left to right, counting the id that follows
	/// each position `p` in `[0, len - window_size)`.
	pub fn build(ids: &[TokenId], window_size: usize) -> Self {
		let mut table = Self::new(window_size);
		table.add_stream(ids);
		table
	}

	/// Same result as [`TransitionTable::build`], with the window positions
	/// split into ranges counted on worker threads and merged afterwards.
	///
	/// # Notes
	/// - Each worker receives its positions plus the `window_size` trailing
	///   ids it needs, so windows straddling a range boundary are counted once.
	/// - Uses `num_cpus * 8` ranges; small streams stay on the calling thread.
	pub fn build_parallel(ids: &[TokenId], window_size: usize) -> Self {
		let positions = ids.len().saturating_sub(window_size);
		if positions < PARALLEL_THRESHOLD {
			return Self::build(ids, window_size);
		}

		let chunks = num_cpus::get() * 8;
		let chunk_size = positions.div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for start in (0..positions).step_by(chunk_size) {
				let end = (start + chunk_size).min(positions);
				let slice = &ids[start..end + window_size];
				let tx = tx.clone();
				scope.spawn(move || {
					// The receiver outlives the scope
					let _ = tx.send(Self::build(slice, window_size));
				});
			}
		});
		drop(tx);

		let mut table = Self::new(window_size);
		for partial in rx.iter() {
			table.merge(&partial);
		}
		table
	}

	fn add_stream(&mut self, ids: &[TokenId]) {
		let w = self.window_size;
		for p in 0..ids.len().saturating_sub(w) {
			let window = &ids[p..p + w];
			let next = ids[p + w];
			match self.windows.get_mut(window) {
				Some(dictogram) => dictogram.add(next, 1),
				None => {
					self.windows.insert(window.to_vec(), Dictogram::from_counts([(next, 1)]));
				}
			}
		}
	}

	/// Adds every count of `other` into this table.
	pub fn merge(&mut self, other: &Self) {
		for (window, dictogram) in &other.windows {
			match self.windows.get_mut(window) {
				Some(existing) => existing.merge(dictogram),
				None => {
					self.windows.insert(window.clone(), dictogram.clone());
				}
			}
		}
	}

	pub fn window_size(&self) -> usize {
		self.window_size
	}

	pub fn get(&self, window: &[TokenId]) -> Option<&Dictogram<TokenId>> {
		self.windows.get(window)
	}

	/// Number of distinct windows.
	pub fn len(&self) -> usize {
		self.windows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.windows.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Window, &Dictogram<TokenId>)> {
		self.windows.iter()
	}

	/// Turns the table into store upserts. A window is a sentence start iff
	/// its first id is `end_id`.
	pub fn into_upserts(self, end_id: TokenId) -> impl Iterator<Item = WindowUpsert> {
		self.windows.into_iter().map(move |(key, dictogram)| WindowUpsert {
			start: key.first() == Some(&end_id),
			key,
			increments: dictogram.into_counts(),
		})
	}
}

#[cfg(test)]
mod tests {
	use rand::Rng;

	use super::*;

	#[test]
	fn test_build_counts_following_token() {
		// end the cat sat . end the cat ran . end
		let ids = [2, 5, 1, 4, 0, 2, 5, 1, 3, 0, 2];
		let table = TransitionTable::build(&ids, 2);

		assert_eq!(table.get(&[2, 5]).unwrap().count(&1), 2);
		let after_the_cat = table.get(&[5, 1]).unwrap();
		assert_eq!(after_the_cat.count(&4), 1);
		assert_eq!(after_the_cat.count(&3), 1);
		assert_eq!(after_the_cat.tokens(), 2);
		assert_eq!(table.get(&[1, 4]).unwrap().count(&0), 1);
		// Only the first "(. end)" has a successor
		assert_eq!(table.get(&[0, 2]).unwrap().tokens(), 1);
		assert_eq!(table.len(), 7);
	}

	#[test]
	fn test_short_stream_builds_nothing() {
		assert!(TransitionTable::build(&[1, 2], 2).is_empty());
		assert!(TransitionTable::build(&[], 3).is_empty());
		assert_eq!(TransitionTable::build(&[1, 2], 1).len(), 1);
	}

	#[test]
	fn test_parallel_build_matches_sequential() {
		let mut rng = rand::rng();
		let ids: Vec<TokenId> = (0..PARALLEL_THRESHOLD * 3).map(|_| rng.random_range(0..40)).collect();

		for window_size in [1, 2, 3] {
			let sequential = TransitionTable::build(&ids, window_size);
			let parallel = TransitionTable::build_parallel(&ids, window_size);
			assert_eq!(sequential.len(), parallel.len());
			for (window, dictogram) in sequential.iter() {
				let other = parallel.get(window).unwrap();
				assert_eq!(dictogram.tokens(), other.tokens());
				for (next, count) in dictogram.iter() {
					assert_eq!(other.count(next), count);
				}
			}
		}
	}

	#[test]
	fn test_into_upserts_flags_starts() {
		let table = TransitionTable::build(&[7, 1, 2, 7, 1, 3], 2);
		let upserts: Vec<_> = table.into_upserts(7).collect();
		assert_eq!(upserts.len(), 3);
		for upsert in upserts {
			assert_eq!(upsert.start, upsert.key[0] == 7);
			if upsert.key == vec![7, 1] {
				assert_eq!(upsert.increments[&2], 1);
				assert_eq!(upsert.increments[&3], 1);
			}
		}
	}
}
