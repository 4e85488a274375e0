use std::fs;
use std::io;
use std::path::Path;

use crate::vocabulary::SENTINEL;

/// Characters closing a sentence when they end a word.
const TERMINALS: &[char] = &['.', '!', '?'];

/// Reads a UTF-8 corpus file into memory.
///
/// Fails with `InvalidData` if the file is not valid UTF-8.
pub fn read_corpus<P: AsRef<Path>>(path: P) -> io::Result<String> {
	fs::read_to_string(path)
}

/// Inserts the sentinel word at every sentence boundary.
///
/// - A trailing run of `.`, `!` or `?` is split from its word into its own
///   token, then followed by the sentinel.
/// - The text starts with a sentinel, so the first sentence is a valid start.
/// - Sentinels already present are kept, never doubled.
///
/// Example:
/// `"The cat sat. The cat ran."` → `"end The cat sat . end The cat ran . end"`
pub fn mark_sentences(text: &str) -> String {
	let mut tokens: Vec<&str> = vec![SENTINEL];

	for word in text.split_whitespace() {
		if word.eq_ignore_ascii_case(SENTINEL) {
			if tokens.last() != Some(&SENTINEL) {
				tokens.push(SENTINEL);
			}
			continue;
		}

		let stem = word.trim_end_matches(TERMINALS);
		if stem.len() == word.len() {
			tokens.push(word);
			continue;
		}
		if !stem.is_empty() {
			tokens.push(stem);
		}
		tokens.push(&word[stem.len()..]);
		tokens.push(SENTINEL);
	}

	tokens.join(" ")
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn test_mark_sentences_splits_terminals() {
		assert_eq!(
			mark_sentences("The cat sat. The cat ran."),
			"end The cat sat . end The cat ran . end"
		);
		assert_eq!(mark_sentences("Really?! Yes"), "end Really ?! end Yes");
		assert_eq!(mark_sentences("wait . now"), "end wait . end now");
	}

	#[test]
	fn test_mark_sentences_keeps_existing_sentinels() {
		assert_eq!(mark_sentences("end hello . END"), "end hello . end");
		assert_eq!(mark_sentences(""), "end");
	}

	#[test]
	fn test_read_corpus() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "Привет мир.\nsecond line").unwrap();
		assert_eq!(read_corpus(file.path()).unwrap(), "Привет мир.\nsecond line");

		let mut invalid = tempfile::NamedTempFile::new().unwrap();
		invalid.write_all(&[0xff, 0xfe, 0x00]).unwrap();
		let error = read_corpus(invalid.path()).unwrap_err();
		assert_eq!(error.kind(), io::ErrorKind::InvalidData);
	}
}
