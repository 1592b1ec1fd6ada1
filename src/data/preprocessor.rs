// ============================================================
// Layer 4: Sequence Preprocessor
// ============================================================
// Turns raw text into the fixed-length id sequences the model
// consumes. Every sequence is first truncated, then right-padded
// with the end-of-sequence id:
//
//   "A B C" → [A, B, C]            (tokenise)
//           → [A, B, C]            (truncate to max_length)
//           → [A, B, C, E, E]      (pad to target length)
//
// Sequence lengths for one example (MAX_LEN = 1024, 1 prompt):
//
//   article  : 1023 ids   (MAX_LEN - prompt tokens)
//   summary  : first 300 tokens, padded to 1024
//
// The prompt plus the article is exactly MAX_LEN positions,
// so the model emits one logit row per summary position.

use anyhow::{ensure, Result};
use tokenizers::Tokenizer;

use crate::data::dataset::SummaryExample;
use crate::domain::example::ArticleSummary;

/// Fixed sequence lengths derived from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLayout {
    /// Padded article length (MAX_LEN - prompt tokens)
    pub article_len: usize,
    /// Summary tokens kept before padding
    pub summary_tokens: usize,
    /// Padded summary length (MAX_LEN)
    pub summary_len: usize,
}

impl SequenceLayout {
    pub fn new(max_len: usize, num_prompt_tokens: usize, max_summary_tokens: usize) -> Result<Self> {
        ensure!(
            max_len > num_prompt_tokens,
            "max_len ({max_len}) must be larger than the number of prompt tokens ({num_prompt_tokens})"
        );
        Ok(Self {
            article_len:    max_len - num_prompt_tokens,
            summary_tokens: max_summary_tokens.min(max_len),
            summary_len:    max_len,
        })
    }
}

/// Tokenises, truncates and pads text with a shared tokenizer.
pub struct Preprocessor<'a> {
    tokenizer: &'a Tokenizer,
    eos_id:    u32,
}

impl<'a> Preprocessor<'a> {
    pub fn new(tokenizer: &'a Tokenizer, eos_id: u32) -> Self {
        Self { tokenizer, eos_id }
    }

    /// Tokenise `text`, keeping at most `max_length` ids.
    pub fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        let mut ids = encoding.get_ids().to_vec();
        ids.truncate(max_length);
        Ok(ids)
    }

    /// Tokenise, truncate to `max_length` and pad to `target_len`.
    pub fn encode_padded(&self, text: &str, max_length: usize, target_len: usize) -> Result<Vec<u32>> {
        let ids = self.encode(text, max_length)?;
        Ok(pad_to(ids, target_len, self.eos_id))
    }

    /// Build one training example from a raw row.
    pub fn example(&self, row: &ArticleSummary, layout: &SequenceLayout) -> Result<SummaryExample> {
        let article_ids = self.encode_padded(&row.article, layout.article_len, layout.article_len)?;
        let summary_ids = self.encode_padded(&row.highlights, layout.summary_tokens, layout.summary_len)?;
        Ok(SummaryExample { article_ids, summary_ids })
    }
}

/// Truncate then right-pad `ids` with `pad_id` to exactly `target_len`.
pub fn pad_to(mut ids: Vec<u32>, target_len: usize, pad_id: u32) -> Vec<u32> {
    ids.truncate(target_len);
    ids.resize(target_len, pad_id);
    ids
}
