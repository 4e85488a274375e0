use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use super::chain::MarkovChain;
use super::options::ChainOptions;
use crate::counter::Counter;
use crate::error::Result;
use crate::store::{BulkReport, Store, TOKENS};
use crate::vocabulary::Vocabulary;

/// Which build pipeline a [`Trainer`] ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	/// First pass into an empty store.
	Train,
	/// Additive pass over an existing model.
	Retrain,
}

/// What a training pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrainReport {
	/// Words that received an id during this pass.
	pub new_words: usize,
	/// Length of the tokenized text.
	pub tokens: usize,
	/// Distinct windows observed in the text.
	pub windows: usize,
	/// Stored rows created or merged into.
	pub rows: BulkReport,
}

/// Build phase of a session.
///
/// # Behavior
/// - `train`: fresh vocabulary from the corpus, counter initialization,
///   vocabulary save, table build and save, counter resynchronization.
/// - `retrain`: store-backed vocabulary, counter resynchronization,
///   vocabulary growth from the new text, table build and additive save.
///
/// Any error aborts the pass; nothing is rolled back.
#[derive(Debug)]
pub struct Trainer<S: Store> {
	mode: Mode,
	chain: MarkovChain<S>,
	vocabulary: Vocabulary<S>,
	report: TrainReport,
}

impl<S: Store> Trainer<S> {
	/// Trains a new model from `text` into an empty store.
	///
	/// # Errors
	/// - `MissingSentinel` if `text` never contains the sentinel word
	/// - `AlreadyExists` if the store already holds a model
	pub fn train(store: Arc<S>, text: &str, options: ChainOptions) -> Result<Self> {
		let chain = MarkovChain::new(Arc::clone(&store), options)?;
		let counter = Counter::new(Arc::clone(&store));

		info!("training a new model (window size {})", chain.window_size());
		let vocabulary = Vocabulary::fresh(text)?;
		counter.initialize(TOKENS, 0)?;
		vocabulary.save(&*store)?;

		let mut trainer = Self { mode: Mode::Train, chain, vocabulary, report: TrainReport::default() };
		trainer.report.new_words = trainer.vocabulary.len()?;
		trainer.build(text)?;
		counter.update(TOKENS)?;
		Ok(trainer)
	}

	/// Merges `text` into the model already held by `store`.
	///
	/// # Errors
	/// - `MissingSentinel` / `NotFound` if the store holds no trained model
	pub fn retrain(store: Arc<S>, text: &str, options: ChainOptions) -> Result<Self> {
		let chain = MarkovChain::new(Arc::clone(&store), options)?;
		let counter = Counter::new(Arc::clone(&store));

		info!("retraining the stored model (window size {})", chain.window_size());
		let vocabulary = Vocabulary::persistent(Arc::clone(&store))?;
		counter.update(TOKENS)?;
		let new_words = vocabulary.update_from_text(text, &counter)?;

		let mut trainer = Self { mode: Mode::Retrain, chain, vocabulary, report: TrainReport::default() };
		trainer.report.new_words = new_words;
		trainer.build(text)?;
		Ok(trainer)
	}

	fn build(&mut self, text: &str) -> Result<()> {
		let table = self.chain.create_model_from_text(text, &self.vocabulary)?;
		self.report.tokens = text.split_whitespace().count();
		self.report.windows = table.len();
		self.report.rows = self.chain.save(table, self.vocabulary.end_id())?;
		Ok(())
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn report(&self) -> &TrainReport {
		&self.report
	}

	/// Ends the build phase. The generator reads the vocabulary from the
	/// store from now on.
	pub fn into_generator(self) -> Result<Generator<S>> {
		let vocabulary = match self.mode {
			Mode::Retrain => self.vocabulary,
			Mode::Train => Vocabulary::persistent(Arc::clone(self.chain.store()))?,
		};
		Ok(Generator { chain: self.chain, vocabulary })
	}
}

/// Generate phase of a session: read-only sampling from a stored model.
#[derive(Debug)]
pub struct Generator<S: Store> {
	chain: MarkovChain<S>,
	vocabulary: Vocabulary<S>,
}

impl<S: Store> Generator<S> {
	/// Opens the model held by `store` for generation.
	///
	/// # Errors
	/// `MissingSentinel` if the store holds no vocabulary.
	pub fn open(store: Arc<S>, options: ChainOptions) -> Result<Self> {
		let chain = MarkovChain::new(Arc::clone(&store), options)?;
		let vocabulary = Vocabulary::persistent(store)?;
		Ok(Self { chain, vocabulary })
	}

	pub fn chain(&self) -> &MarkovChain<S> {
		&self.chain
	}

	pub fn vocabulary(&self) -> &Vocabulary<S> {
		&self.vocabulary
	}

	/// One sentence of `length` generated words (sentinels removed).
	pub fn generate(&self, length: usize) -> Result<String> {
		self.chain.generate(length, &self.vocabulary)
	}

	/// Generates up to `count` sentences.
	///
	/// `cancel` is checked before each sentence, never in the middle of one.
	/// A sentence failing with a recoverable error (an unknown window or an
	/// empty distribution) is skipped; any other error is returned.
	pub fn generate_sentences(&self, count: usize, length: usize, cancel: &AtomicBool) -> Result<Vec<String>> {
		let mut sentences = Vec::with_capacity(count);
		for i in 0..count {
			if cancel.load(Ordering::Relaxed) {
				info!("generation cancelled after {} sentences", sentences.len());
				break;
			}
			match self.generate(length) {
				Ok(sentence) => sentences.push(sentence),
				Err(e) if e.is_recoverable() => warn!("skipping sentence {}: {}", i + 1, e),
				Err(e) => return Err(e),
			}
		}
		Ok(sentences)
	}
}
