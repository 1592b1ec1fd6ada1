// ============================================================
// Layer 3: Core Traits
// ============================================================
// The application layer reads dataset rows through this trait.

use anyhow::Result;
use crate::domain::example::ArticleSummary;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Anything that can produce complete (article, summary) rows.
///
/// Implementations:
///   - CsvLoader → one CSV split on disk
pub trait ExampleSource {
    fn load_all(&self) -> Result<Vec<ArticleSummary>>;
}
