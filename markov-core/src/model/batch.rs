use log::debug;

use crate::error::Result;
use crate::store::{BulkReport, Store, WindowUpsert};

/// Buffers window upserts and sends them to the store in bulk.
///
/// Operations are flushed once `threshold` of them are pending, and on
/// [`BatchWriter::finish`]. Each upsert is a pure count addition, so the
/// grouping never changes the stored totals.
#[must_use = "pending upserts are lost unless `finish` is called"]
pub struct BatchWriter<'a, S: Store> {
	store: &'a S,
	pending: Vec<WindowUpsert>,
	threshold: usize,
	report: BulkReport,
	flushes: usize,
}

impl<'a, S: Store> BatchWriter<'a, S> {
	pub fn new(store: &'a S, threshold: usize) -> Self {
		let threshold = threshold.max(1);
		Self {
			store,
			pending: Vec::with_capacity(threshold.min(4096)),
			threshold,
			report: BulkReport::default(),
			flushes: 0,
		}
	}

	pub fn push(&mut self, upsert: WindowUpsert) -> Result<()> {
		self.pending.push(upsert);
		if self.pending.len() >= self.threshold {
			self.flush()?;
		}
		Ok(())
	}

	/// Sends every pending operation as one bulk write.
	pub fn flush(&mut self) -> Result<()> {
		if self.pending.is_empty() {
			return Ok(());
		}
		let batch = std::mem::take(&mut self.pending);
		let size = batch.len();
		self.report.absorb(self.store.bulk_upsert_windows(batch)?);
		self.flushes += 1;
		debug!("flushed batch {} ({} windows)", self.flushes, size);
		Ok(())
	}

	/// Number of bulk writes sent so far.
	pub fn flushes(&self) -> usize {
		self.flushes
	}

	/// Flushes the remainder and returns the rows touched overall.
	pub fn finish(mut self) -> Result<BulkReport> {
		self.flush()?;
		Ok(self.report)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::store::{MemoryStore, WindowStore};

	fn upsert(key: u64) -> WindowUpsert {
		WindowUpsert { key: vec![key], increments: HashMap::from([(0, 1)]), start: false }
	}

	#[test]
	fn test_flushes_at_threshold() {
		let store = MemoryStore::new();
		let mut writer = BatchWriter::new(&store, 2);
		for key in 0..5 {
			writer.push(upsert(key)).unwrap();
		}
		assert_eq!(writer.flushes(), 2);
		assert_eq!(store.window_count().unwrap(), 4);

		let report = writer.finish().unwrap();
		assert_eq!(report, BulkReport { inserted: 5, updated: 0 });
		assert_eq!(store.window_count().unwrap(), 5);
	}

	#[test]
	fn test_repeated_keys_across_batches_add_up() {
		let store = MemoryStore::new();
		let mut writer = BatchWriter::new(&store, 3);
		for _ in 0..7 {
			writer.push(upsert(9)).unwrap();
		}
		let report = writer.finish().unwrap();
		assert_eq!(report, BulkReport { inserted: 1, updated: 6 });
		assert_eq!(store.window(&[9]).unwrap().unwrap().value[&0], 7);
	}

	#[test]
	fn test_zero_threshold_flushes_every_push() {
		let store = MemoryStore::new();
		let mut writer = BatchWriter::new(&store, 0);
		writer.push(upsert(1)).unwrap();
		assert_eq!(writer.flushes(), 1);
		assert_eq!(writer.finish().unwrap().inserted, 1);
	}
}
