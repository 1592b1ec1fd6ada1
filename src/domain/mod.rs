// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust types describing the experiment: dataset rows,
// the prompt vocabulary and the data-source seam the application
// layer programs against.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs and traits

/// A raw article/summary row
pub mod example;

/// Prompt word → prompt-table row mapping
pub mod prompt_vocab;

/// Abstractions implemented by the data and ml layers
pub mod traits;
