// ============================================================
// Layer 3: ArticleSummary Domain Type
// ============================================================
// One row of the summarization dataset before tokenisation:
// the full news article and its reference highlights.
//
// Example:
//   article:    "Celtic defender Virgil van Dijk admits ..."
//   highlights: "Van Dijk feared his cup final dream was over"

use serde::{Deserialize, Serialize};

/// A raw (article, summary) pair read from one CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    /// The source text the model reads
    pub article: String,

    /// The reference summary the model is scored against
    pub highlights: String,
}

impl ArticleSummary {
    pub fn new(article: impl Into<String>, highlights: impl Into<String>) -> Self {
        Self {
            article:    article.into(),
            highlights: highlights.into(),
        }
    }
}
