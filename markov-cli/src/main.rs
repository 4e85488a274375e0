mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use log::info;
use markov_core::io::{mark_sentences, read_corpus};
use markov_core::model::{ChainOptions, Generator, TrainReport, Trainer};
use markov_core::store::MemoryStore;

use crate::config::{CliOverrides, load_config, merge_cli_overrides};

/// Train and sample a persistent word n-gram Markov model.
#[derive(Parser, Debug)]
#[command(name = "markov", version)]
struct Cli {
	/// Config file (defaults to ./markov.toml when present)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Model snapshot file
	#[arg(long, global = true)]
	store: Option<PathBuf>,

	/// Number of tokens per window
	#[arg(long = "window", global = true)]
	window_size: Option<usize>,

	/// Window upserts per bulk write
	#[arg(long, global = true)]
	batch_size: Option<usize>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Train a new model into an empty store
	Train(CorpusArgs),
	/// Merge a corpus into the stored model
	Retrain(CorpusArgs),
	/// Print sentences sampled from the stored model
	Generate {
		/// Number of sentences
		#[arg(long)]
		count: Option<usize>,
		/// Words per sentence
		#[arg(long)]
		length: Option<usize>,
	},
}

#[derive(clap::Args, Debug)]
struct CorpusArgs {
	/// UTF-8 text file
	corpus: PathBuf,

	/// Insert the sentinel at sentence boundaries first
	#[arg(long)]
	mark_sentences: bool,
}

impl Cli {
	fn overrides(&self) -> CliOverrides {
		let mut overrides = CliOverrides {
			store: self.store.clone(),
			window_size: self.window_size,
			batch_size: self.batch_size,
			..Default::default()
		};
		match &self.command {
			Command::Train(args) | Command::Retrain(args) => {
				overrides.mark_sentences = args.mark_sentences.then_some(true);
			}
			Command::Generate { count, length } => {
				overrides.sentences = *count;
				overrides.length = *length;
			}
		}
		overrides
	}
}

fn load_text(path: &Path, mark: bool) -> std::io::Result<String> {
	let text = read_corpus(path)?;
	Ok(if mark { mark_sentences(&text) } else { text })
}

/// Unless `--window` was given, a stored model's window size wins over the
/// configured one.
fn session_options(options: ChainOptions, explicit: bool, store: &MemoryStore) -> markov_core::Result<ChainOptions> {
	if explicit {
		Ok(options)
	} else {
		options.with_stored_window_size(store)
	}
}

fn print_report(report: &TrainReport) {
	println!(
		"{} tokens, {} new words, {} windows ({} rows inserted, {} updated)",
		report.tokens, report.new_words, report.windows, report.rows.inserted, report.rows.updated
	);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();

	let cli = Cli::parse();
	let mut config = load_config(cli.config.as_deref())?;
	merge_cli_overrides(&mut config, &cli.overrides());
	let store = Arc::new(MemoryStore::open(&config.store)?);
	let options = session_options(config.chain_options()?, cli.window_size.is_some(), &store)?;

	match &cli.command {
		Command::Train(args) => {
			let text = load_text(&args.corpus, config.mark_sentences)?;
			let trainer = Trainer::train(Arc::clone(&store), &text, options)?;
			store.persist(&config.store)?;
			print_report(trainer.report());
		}
		Command::Retrain(args) => {
			let text = load_text(&args.corpus, config.mark_sentences)?;
			let trainer = Trainer::retrain(Arc::clone(&store), &text, options)?;
			store.persist(&config.store)?;
			print_report(trainer.report());
		}
		Command::Generate { .. } => {
			let generator = Generator::open(Arc::clone(&store), options)?;
			let cancel = AtomicBool::new(false);
			let sentences = generator.generate_sentences(config.sentences, config.length, &cancel)?;
			info!("generated {} of {} sentences", sentences.len(), config.sentences);
			println!("{}", sentences.join("\n\n"));
		}
	}

	info!("model at {} holds {} words", config.store.display(), store.token_count()?);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;

	#[test]
	fn test_train_flags_become_overrides() {
		let cli = Cli::try_parse_from([
			"markov",
			"--window",
			"3",
			"train",
			"corpus.txt",
			"--mark-sentences",
		])
		.unwrap();

		let overrides = cli.overrides();
		assert_eq!(overrides.window_size, Some(3));
		assert_eq!(overrides.mark_sentences, Some(true));
		assert_eq!(overrides.sentences, None);
	}

	#[test]
	fn test_unset_flags_keep_file_values() {
		let cli = Cli::try_parse_from(["markov", "retrain", "more.txt"]).unwrap();
		let mut config = Config { mark_sentences: true, store: PathBuf::from("news.bin"), ..Config::default() };
		merge_cli_overrides(&mut config, &cli.overrides());
		assert!(config.mark_sentences);
		assert_eq!(config.store, PathBuf::from("news.bin"));
	}

	#[test]
	fn test_generate_flags() {
		let cli = Cli::try_parse_from(["markov", "generate", "--count", "2", "--length", "7", "--store", "m.bin"])
			.unwrap();
		let overrides = cli.overrides();
		assert_eq!(overrides.sentences, Some(2));
		assert_eq!(overrides.length, Some(7));
		assert_eq!(overrides.store, Some(PathBuf::from("m.bin")));
	}

	#[test]
	fn test_train_then_generate_through_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let corpus = dir.path().join("corpus.txt");
		std::fs::write(&corpus, "The cat sat. The cat ran.").unwrap();
		let snapshot = dir.path().join("model.bin");
		let options = Config::default().chain_options().unwrap();

		let store = Arc::new(MemoryStore::open(&snapshot).unwrap());
		let text = load_text(&corpus, true).unwrap();
		Trainer::train(Arc::clone(&store), &text, options).unwrap();
		store.persist(&snapshot).unwrap();

		let reopened = Arc::new(MemoryStore::open(&snapshot).unwrap());
		let generator = Generator::open(reopened, options).unwrap();
		let sentences = generator.generate_sentences(3, 1, &AtomicBool::new(false)).unwrap();
		assert_eq!(sentences.len(), 3);
		for sentence in sentences {
			assert!(sentence == "the cat sat" || sentence == "the cat ran", "{}", sentence);
		}
	}

	#[test]
	fn test_stored_window_size_wins_unless_explicit() {
		let store = Arc::new(MemoryStore::new());
		let trained = ChainOptions::new(3).unwrap();
		Trainer::train(Arc::clone(&store), "end a b c d . end a b c e . end", trained).unwrap();

		let configured = Config::default().chain_options().unwrap();
		let options = session_options(configured, false, &store).unwrap();
		assert_eq!(options.window_size(), 3);
		assert!(Trainer::retrain(Arc::clone(&store), "end a b c f . end", options).is_ok());

		let options = session_options(configured, true, &store).unwrap();
		let result = Trainer::retrain(Arc::clone(&store), "end a b c g . end", options);
		assert!(matches!(
			result,
			Err(markov_core::Error::WindowSizeMismatch { stored: 3, requested: 2 })
		));
	}
}
