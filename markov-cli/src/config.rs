//! `markov.toml` loading and CLI overrides.

use std::fs;
use std::path::{Path, PathBuf};

use markov_core::model::ChainOptions;
use markov_core::model::options::{DEFAULT_BATCH_SIZE, DEFAULT_WINDOW_SIZE};
use serde::Deserialize;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "markov.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid config: {0}")]
	Invalid(#[from] markov_core::Error),
}

/// Settings of one CLI run.
///
/// Every field is optional in the file; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// Snapshot file holding the model.
	pub store: PathBuf,
	pub window_size: usize,
	pub batch_size: usize,
	/// Number of sentences printed by `generate`.
	pub sentences: usize,
	/// Words per generated sentence.
	pub length: usize,
	/// Insert the sentinel at sentence boundaries before training.
	pub mark_sentences: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			store: PathBuf::from("model.bin"),
			window_size: DEFAULT_WINDOW_SIZE,
			batch_size: DEFAULT_BATCH_SIZE,
			sentences: 10,
			length: 100,
			mark_sentences: false,
		}
	}
}

impl Config {
	/// Validated chain options for this configuration.
	pub fn chain_options(&self) -> Result<ChainOptions, ConfigError> {
		let mut options = ChainOptions::new(self.window_size)?;
		options.set_batch_size(self.batch_size)?;
		Ok(options)
	}
}

/// Command-line values taking precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
	pub store: Option<PathBuf>,
	pub window_size: Option<usize>,
	pub batch_size: Option<usize>,
	pub sentences: Option<usize>,
	pub length: Option<usize>,
	pub mark_sentences: Option<bool>,
}

/// Returns `dir/markov.toml` if it exists.
pub fn find_config_in(dir: &Path) -> Option<PathBuf> {
	let path = dir.join(CONFIG_FILE);
	path.is_file().then_some(path)
}

/// Loads the configuration.
///
/// # Parameters
/// - `path`: explicit config file; when `None`, `markov.toml` is looked up in
///   the working directory and the defaults are used if there is none.
///
/// # Errors
/// - `Io` if an explicit file cannot be read
/// - `Parse` on malformed TOML or unknown keys
/// - `Invalid` if the window or batch size is zero
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
	let path = match path {
		Some(p) => Some(p.to_path_buf()),
		None => std::env::current_dir().ok().and_then(|cwd| find_config_in(&cwd)),
	};

	match path {
		Some(p) => load_config_file(&p),
		None => Ok(Config::default()),
	}
}

fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
	let contents = fs::read_to_string(path)?;
	let config: Config = toml::from_str(&contents)?;
	config.chain_options()?;
	log::debug!("loaded config from {}", path.display());
	Ok(config)
}

pub fn merge_cli_overrides(config: &mut Config, overrides: &CliOverrides) {
	if let Some(ref store) = overrides.store {
		config.store = store.clone();
	}
	if let Some(window_size) = overrides.window_size {
		config.window_size = window_size;
	}
	if let Some(batch_size) = overrides.batch_size {
		config.batch_size = batch_size;
	}
	if let Some(sentences) = overrides.sentences {
		config.sentences = sentences;
	}
	if let Some(length) = overrides.length {
		config.length = length;
	}
	if let Some(mark_sentences) = overrides.mark_sentences {
		config.mark_sentences = mark_sentences;
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
		let path = dir.path().join(CONFIG_FILE);
		fs::write(&path, contents).unwrap();
		path
	}

	#[test]
	fn test_partial_file_keeps_defaults() {
		let dir = TempDir::new().unwrap();
		let path = write_config(&dir, "window_size = 3\nstore = \"data/news.bin\"\n");

		let config = load_config(Some(&path)).unwrap();
		assert_eq!(config.window_size, 3);
		assert_eq!(config.store, PathBuf::from("data/news.bin"));
		assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
		assert_eq!(config.sentences, 10);
		assert_eq!(config.length, 100);
		assert!(!config.mark_sentences);
	}

	#[test]
	fn test_find_config_in() {
		let dir = TempDir::new().unwrap();
		assert_eq!(find_config_in(dir.path()), None);
		let path = write_config(&dir, "");
		assert_eq!(find_config_in(dir.path()), Some(path));
	}

	#[test]
	fn test_rejected_files() {
		let dir = TempDir::new().unwrap();

		let path = write_config(&dir, "window_size = 0\n");
		assert!(matches!(load_config(Some(&path)), Err(ConfigError::Invalid(_))));

		let path = write_config(&dir, "colour = \"blue\"\n");
		assert!(matches!(load_config(Some(&path)), Err(ConfigError::Parse(_))));

		let missing = dir.path().join("missing.toml");
		assert!(matches!(load_config(Some(&missing)), Err(ConfigError::Io(_))));
	}

	#[test]
	fn test_overrides_take_precedence() {
		let mut config = Config { sentences: 4, ..Config::default() };
		let overrides = CliOverrides {
			window_size: Some(1),
			length: Some(12),
			mark_sentences: Some(true),
			..Default::default()
		};
		merge_cli_overrides(&mut config, &overrides);

		assert_eq!(config.window_size, 1);
		assert_eq!(config.length, 12);
		assert_eq!(config.sentences, 4);
		assert!(config.mark_sentences);
		assert_eq!(config.chain_options().unwrap().window_size(), 1);
	}
}
