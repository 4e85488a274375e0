use std::collections::HashMap;
use std::collections::hash_map;
use std::hash::Hash;

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::error::{Error, Result};

/// Frequency distribution over arbitrary hashable items.
///
/// Used in two places:
/// - as an accumulator while a transition table is built (one `Dictogram`
///   per window, counting the tokens that follow it)
/// - as the sampling primitive during generation, reconstructed from a
///   persisted window row
///
/// ## Invariants
/// - `tokens` is the sum of all counts
/// - `types` is the number of keys
/// - no key has a count of zero
#[derive(Clone, Debug)]
pub struct Dictogram<T> {
	counts: HashMap<T, u64>,
	types: usize,
	tokens: u64,
}

impl<T> Default for Dictogram<T> {
	fn default() -> Self {
		Self { counts: HashMap::new(), types: 0, tokens: 0 }
	}
}

impl<T: Eq + Hash> Dictogram<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a distribution from already tallied `(item, count)` pairs.
	///
	/// Pairs with the same item are summed; zero counts are ignored.
	pub fn from_counts<I: IntoIterator<Item = (T, u64)>>(counts: I) -> Self {
		let mut dictogram = Self::new();
		for (item, count) in counts {
			dictogram.add(item, count);
		}
		dictogram
	}

	/// Tallies every item of `items` on top of the existing counts.
	pub fn update<I: IntoIterator<Item = T>>(&mut self, items: I) {
		for item in items {
			self.add(item, 1);
		}
	}

	/// Records `n` occurrences of `item` at once.
	pub fn add(&mut self, item: T, n: u64) {
		if n == 0 {
			return;
		}
		match self.counts.entry(item) {
			hash_map::Entry::Occupied(mut entry) => *entry.get_mut() += n,
			hash_map::Entry::Vacant(entry) => {
				entry.insert(n);
				self.types += 1;
			}
		}
		self.tokens += n;
	}

	/// Sums the counts of `other` into this distribution.
	pub fn merge(&mut self, other: &Self)
	where
		T: Clone,
	{
		for (item, count) in &other.counts {
			self.add(item.clone(), *count);
		}
	}

	/// Tally of `item`, 0 when it was never seen.
	pub fn count(&self, item: &T) -> u64 {
		self.counts.get(item).copied().unwrap_or(0)
	}

	/// Number of distinct items.
	pub fn types(&self) -> usize {
		self.types
	}

	/// Total number of occurrences.
	pub fn tokens(&self) -> u64 {
		self.tokens
	}

	pub fn is_empty(&self) -> bool {
		self.tokens == 0
	}

	pub fn iter(&self) -> impl Iterator<Item = (&T, u64)> {
		self.counts.iter().map(|(item, count)| (item, *count))
	}

	pub fn into_counts(self) -> HashMap<T, u64> {
		self.counts
	}

	/// Draws a key uniformly, ignoring counts.
	pub fn sample_uniform(&self) -> Result<&T> {
		self.sample_uniform_with(&mut rand::rng())
	}

	pub fn sample_uniform_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T> {
		self.counts.keys().choose(rng).ok_or(Error::EmptyDistribution)
	}

	/// Draws a key with probability `count(key) / tokens`.
	///
	/// # Errors
	/// `EmptyDistribution` when no occurrence was recorded.
	pub fn sample_weighted(&self) -> Result<&T> {
		self.sample_weighted_with(&mut rand::rng())
	}

	/// Weighted draw with a caller-supplied generator.
	///
	/// Picks `r` in `[0, tokens - 1]`, then walks the keys in the map's
	/// enumeration order and returns the first one whose running count sum
	/// exceeds `r`.
	pub fn sample_weighted_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T> {
		if self.tokens == 0 {
			return Err(Error::EmptyDistribution);
		}

		let r = rng.random_range(0..self.tokens);
		let mut cumulative = 0;
		for (item, count) in &self.counts {
			cumulative += count;
			if cumulative > r {
				return Ok(item);
			}
		}

		// Unreachable while `tokens` equals the sum of the counts
		Err(Error::EmptyDistribution)
	}
}

impl<T: Eq + Hash> FromIterator<T> for Dictogram<T> {
	fn from_iter<I: IntoIterator<Item = T>>(items: I) -> Self {
		let mut dictogram = Self::new();
		dictogram.update(items);
		dictogram
	}
}

impl<T: Eq + Hash> Extend<T> for Dictogram<T> {
	fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
		self.update(items);
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;

	fn assert_invariants<T: Eq + Hash>(dictogram: &Dictogram<T>) {
		assert_eq!(dictogram.tokens(), dictogram.iter().map(|(_, c)| c).sum::<u64>());
		assert_eq!(dictogram.types(), dictogram.iter().count());
		assert!(dictogram.iter().all(|(_, c)| c > 0));
	}

	#[test]
	fn test_construct_and_count() {
		let dictogram: Dictogram<&str> = "one fish two fish red fish blue fish".split(' ').collect();
		assert_eq!(dictogram.count(&"fish"), 4);
		assert_eq!(dictogram.count(&"one"), 1);
		assert_eq!(dictogram.count(&"whale"), 0);
		assert_eq!(dictogram.types(), 5);
		assert_eq!(dictogram.tokens(), 8);
		assert_invariants(&dictogram);
	}

	#[test]
	fn test_update_is_additive() {
		let mut dictogram: Dictogram<u64> = [1, 2, 2].into_iter().collect();
		dictogram.update([2, 3]);
		dictogram.update(Vec::new());
		dictogram.add(4, 0);
		dictogram.add(1, 5);

		assert_eq!(dictogram.count(&1), 6);
		assert_eq!(dictogram.count(&2), 3);
		assert_eq!(dictogram.count(&3), 1);
		assert_eq!(dictogram.count(&4), 0);
		assert_invariants(&dictogram);
	}

	#[test]
	fn test_merge_sums_counts() {
		let mut left = Dictogram::from_counts([('a', 2), ('b', 1)]);
		let right = Dictogram::from_counts([('b', 4), ('c', 1)]);
		left.merge(&right);

		assert_eq!(left.count(&'a'), 2);
		assert_eq!(left.count(&'b'), 5);
		assert_eq!(left.count(&'c'), 1);
		assert_eq!(left.types(), 3);
		assert_eq!(left.tokens(), 8);
	}

	#[test]
	fn test_empty_distribution_fails() {
		let dictogram: Dictogram<u64> = Dictogram::new();
		assert!(matches!(dictogram.sample_weighted(), Err(Error::EmptyDistribution)));
		assert!(matches!(dictogram.sample_uniform(), Err(Error::EmptyDistribution)));
	}

	#[test]
	fn test_single_key_always_sampled() {
		let dictogram = Dictogram::from_counts([("only", 3)]);
		for _ in 0..50 {
			assert_eq!(*dictogram.sample_weighted().unwrap(), "only");
			assert_eq!(*dictogram.sample_uniform().unwrap(), "only");
		}
	}

	#[test]
	fn test_weighted_sampling_fidelity() {
		let dictogram = Dictogram::from_counts([('a', 1), ('b', 3)]);
		let mut rng = StdRng::seed_from_u64(42);

		let draws = 20_000;
		let b = (0..draws)
			.filter(|_| *dictogram.sample_weighted_with(&mut rng).unwrap() == 'b')
			.count();
		let frequency = b as f64 / draws as f64;

		// sigma = sqrt(0.75 * 0.25 / 20000) ~ 0.003, tolerance is > 6 sigma
		assert!((frequency - 0.75).abs() < 0.02, "frequency of b was {}", frequency);
	}

	#[test]
	fn test_uniform_sampling_ignores_counts() {
		let dictogram = Dictogram::from_counts([('a', 1), ('b', 99)]);
		let mut rng = StdRng::seed_from_u64(7);

		let draws = 10_000;
		let a = (0..draws)
			.filter(|_| *dictogram.sample_uniform_with(&mut rng).unwrap() == 'a')
			.count();
		let frequency = a as f64 / draws as f64;
		assert!((frequency - 0.5).abs() < 0.03, "frequency of a was {}", frequency);
	}
}
