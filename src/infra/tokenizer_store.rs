// ============================================================
// Layer 6: Tokenizer Store
// ============================================================
// Loads the pretrained model's tokenizer and keeps a copy next
// to the checkpoint, so inference always decodes with exactly
// the vocabulary the prompt was trained against.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

/// GPT-2's end-of-sequence marker, also used as padding.
pub const DEFAULT_EOS_TOKEN: &str = "<|endoftext|>";

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the tokenizer saved alongside a checkpoint
    pub fn load(&self) -> Result<Tokenizer> {
        load_tokenizer(&self.path())
    }

    /// Write a copy of `tokenizer` into the store directory
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, false)
            .map_err(|e| anyhow::anyhow!("Cannot save tokenizer to '{}': {e}", path.display()))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }
}

/// Load a Hugging Face `tokenizer.json`
pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

/// Resolve a token string (e.g. the EOS marker) to its id
pub fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .with_context(|| format!("Token '{token}' is not in the tokenizer vocabulary"))
}

/// A whitespace word-level tokenizer over `words`, with the
/// EOS marker registered as a special token. Ids follow the
/// order of `words`.
#[cfg(test)]
pub fn word_level_tokenizer(words: &[&str]) -> Tokenizer {
    use std::str::FromStr;

    let vocab: serde_json::Map<String, serde_json::Value> = words
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), serde_json::json!(i)))
        .collect();
    let eos_id = words
        .iter()
        .position(|w| *w == DEFAULT_EOS_TOKEN)
        .expect("test vocabulary needs the EOS token");

    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": eos_id, "content": DEFAULT_EOS_TOKEN, "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": DEFAULT_EOS_TOKEN
        }
    });

    Tokenizer::from_str(&tokenizer_json.to_string()).expect("valid tokenizer json")
}
