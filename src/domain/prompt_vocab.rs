// ============================================================
// Layer 3: Prompt Vocabulary
// ============================================================
// The soft prompt has its own tiny vocabulary, completely
// separate from the tokenizer's. Each word of the prompt
// phrase is looked up here and becomes a row index into the
// trainable prompt-embedding table.
//
//   vocab  = ["Summarize", "the", "following", "sentence", ":"]
//   phrase = "Summarize the following sentence :"
//   ids    = [0, 1, 2, 3, 4]   → table with 5 rows
//
// The table has exactly one row per word in the phrase, so
// every index must be smaller than the phrase length.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Word → index mapping, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptVocab {
    words: Vec<String>,
    index: HashMap<String, u32>,
}

impl PromptVocab {
    /// Build the vocabulary. A repeated word keeps its last index,
    /// the same as building a dict from an enumerated list.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as u32))
            .collect();
        Self { words, index }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn index_of(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    /// Turn a whitespace separated phrase into the prompt sequence.
    pub fn encode(&self, phrase: &str) -> Result<PromptSequence> {
        let mut ids = Vec::new();
        for word in phrase.split_whitespace() {
            match self.index_of(word) {
                Some(id) => ids.push(id),
                None => bail!(
                    "Prompt word '{word}' is not in the prompt vocabulary {:?}",
                    self.words
                ),
            }
        }
        PromptSequence::new(ids)
    }
}

/// The ordered prompt indices. Its length is the number of rows
/// of the prompt-embedding table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSequence {
    ids: Vec<u32>,
}

impl PromptSequence {
    pub fn new(ids: Vec<u32>) -> Result<Self> {
        if ids.is_empty() {
            bail!("Prompt phrase must contain at least one word");
        }
        let rows = ids.len() as u32;
        if let Some(&bad) = ids.iter().find(|&&id| id >= rows) {
            bail!(
                "Prompt index {bad} is outside the {rows}-row prompt table; \
                 the prompt vocabulary must not be larger than the phrase"
            );
        }
        Ok(Self { ids })
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Number of prompt tokens (= prompt table rows)
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
