// ============================================================
// Layer 4: CSV Loader
// ============================================================
// Reads one split of the summarization dataset.
//
// Expected layout (CNN/DailyMail style):
//   id,article,highlights
//   0001,"LONDON, England (Reuters) ...","Harry Potter star ..."
//
// Extra columns are allowed. A row with ANY empty field is
// treated as incomplete and dropped, the same way a whole-row
// dropna() treats a missing value in any column.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::domain::example::ArticleSummary;
use crate::domain::traits::ExampleSource;

pub const ARTICLE_COLUMN:    &str = "article";
pub const HIGHLIGHTS_COLUMN: &str = "highlights";

/// Loads article/highlights pairs from a CSV file.
pub struct CsvLoader {
    path: PathBuf,
}

impl CsvLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl ExampleSource for CsvLoader {
    fn load_all(&self) -> Result<Vec<ArticleSummary>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Cannot read header row of '{}'", self.path.display()))?
            .clone();

        let article_idx    = column_index(&headers, ARTICLE_COLUMN, &self.path)?;
        let highlights_idx = column_index(&headers, HIGHLIGHTS_COLUMN, &self.path)?;

        let mut rows    = Vec::new();
        let mut dropped = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("Malformed CSV record {} in '{}'", line + 1, self.path.display())
            })?;

            if record.iter().any(|field| field.trim().is_empty()) {
                dropped += 1;
                continue;
            }

            rows.push(ArticleSummary::new(&record[article_idx], &record[highlights_idx]));
        }

        tracing::info!(
            "Loaded {} complete rows from '{}' ({} incomplete dropped)",
            rows.len(),
            self.path.display(),
            dropped,
        );
        Ok(rows)
    }
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| {
            format!("Column '{name}' not found in '{}' (columns: {:?})", path.display(), headers)
        })
}
