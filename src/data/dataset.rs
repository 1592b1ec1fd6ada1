use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::{Preprocessor, SequenceLayout};
use crate::domain::example::ArticleSummary;

/// One tokenised and padded article/summary pair.
/// article: MAX_LEN - prompt tokens ids, summary: MAX_LEN ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryExample {
    pub article_ids: Vec<u32>,
    pub summary_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct SummaryDataset {
    examples: Vec<SummaryExample>,
}

impl SummaryDataset {
    pub fn new(examples: Vec<SummaryExample>) -> Self { Self { examples } }

    /// Tokenise every row with the given layout, keeping row order.
    pub fn encode(
        rows:         &[ArticleSummary],
        preprocessor: &Preprocessor<'_>,
        layout:       &SequenceLayout,
    ) -> Result<Self> {
        let examples = rows
            .iter()
            .map(|row| preprocessor.example(row, layout))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(examples))
    }

    pub fn examples(&self) -> &[SummaryExample] { &self.examples }
}

impl Dataset<SummaryExample> for SummaryDataset {
    fn get(&self, index: usize) -> Option<SummaryExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
