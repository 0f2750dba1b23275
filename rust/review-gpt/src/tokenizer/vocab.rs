//! Word-level vocabulary lookup.
//!
//! Index 0 is the padding entry (empty string) and index 1 the out-of-vocabulary
//! entry `[UNK]`. Every other word gets the next free index in insertion order,
//! which for a fitted vocabulary means most frequent first.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{GptError, Result};

/// Special token IDs.
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

pub const PAD_TOKEN: &str = "";
pub const UNK_TOKEN: &str = "[UNK]";

/// Characters split off as standalone tokens during standardisation.
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Bidirectional word <-> id table.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, u32>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_tokens(std::iter::empty::<String>())
    }
}

impl Vocabulary {
    /// Build a vocabulary from words in id order, after the two reserved entries.
    ///
    /// Duplicates and the reserved strings are skipped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()];
        let mut index = HashMap::new();
        index.insert(PAD_TOKEN.to_string(), PAD_ID);
        index.insert(UNK_TOKEN.to_string(), UNK_ID);

        for token in tokens {
            let token = token.into();
            if index.contains_key(&token) {
                continue;
            }
            index.insert(token.clone(), words.len() as u32);
            words.push(token);
        }

        Self { words, index }
    }

    /// Load a newline-delimited vocabulary file as written by [`Vocabulary::save`].
    ///
    /// Line `n` (from 0) is the word with id `n`, so the file must start with the
    /// padding and `[UNK]` lines.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the reserved lines are missing,
    /// or a word appears twice.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let vocab = Self::from_lines(raw.lines().map(str::trim_end))?;
        tracing::info!("loaded vocabulary of {} words from {}", vocab.len(), path.display());
        Ok(vocab)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut words = Vec::new();
        let mut index = HashMap::new();

        for (line, word) in lines.into_iter().enumerate() {
            let expected = match line {
                0 => PAD_TOKEN,
                1 => UNK_TOKEN,
                _ => word,
            };
            if word != expected {
                return Err(GptError::VocabFormat {
                    line,
                    reason: format!("expected reserved entry {expected:?}, found {word:?}"),
                });
            }
            if let Some(&first) = index.get(word) {
                return Err(GptError::VocabFormat {
                    line,
                    reason: format!("{word:?} already has id {first}"),
                });
            }
            index.insert(word.to_string(), line as u32);
            words.push(word.to_string());
        }

        if words.len() < 2 {
            return Err(GptError::VocabFormat {
                line: words.len(),
                reason: "missing reserved padding and [UNK] entries".to_string(),
            });
        }
        Ok(Self { words, index })
    }

    /// Write the vocabulary in the format read by [`Vocabulary::load`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = self.words.join("\n");
        out.push('\n');
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Number of entries, including the two reserved ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false: the reserved entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Id for a word, or [`UNK_ID`] when the word is unknown.
    #[must_use]
    pub fn id(&self, word: &str) -> u32 {
        self.index.get(word).copied().unwrap_or(UNK_ID)
    }

    /// Word for an id; ids past the end render as `[UNK]`.
    #[must_use]
    pub fn word(&self, id: u32) -> &str {
        self.words.get(id as usize).map_or(UNK_TOKEN, String::as_str)
    }

    /// Lowercase, turn `<br />` into a space and split punctuation into its own tokens.
    #[must_use]
    pub fn standardize(text: &str) -> String {
        let lowered = text.to_lowercase().replace("<br />", " ");
        let mut out = String::with_capacity(lowered.len());
        for ch in lowered.chars() {
            if PUNCTUATION.contains(ch) {
                out.push(' ');
                out.push(ch);
                out.push(' ');
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// Encode text into ids; unknown words map to [`UNK_ID`].
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<u32> {
        Self::standardize(text)
            .split_whitespace()
            .map(|w| self.id(w))
            .collect()
    }

    /// Decode ids into space-separated text, skipping padding.
    #[must_use]
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| id != PAD_ID)
            .map(|&id| self.word(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
