// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from a CSV split on disk to per-example tensors.
//
//   train.csv / validation.csv / test.csv
//       │
//       ▼
//   CsvLoader         → reads rows, drops incomplete ones
//       │
//       ▼
//   sample_fraction   → random subset of the rows
//       │
//       ▼
//   Preprocessor      → tokenise, truncate, pad with EOS
//       │
//       ▼
//   SummaryDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   SummaryBatcher    → Int tensors, via an in-order DataLoader

/// Reads CSV splits with article/highlights columns
pub mod loader;

/// Random fractional subsampling
pub mod sampler;

/// Tokenisation, truncation and padding
pub mod preprocessor;

/// Tokenised examples behind Burn's Dataset trait
pub mod dataset;

/// Example → tensor conversion and the split loaders
pub mod batcher;
