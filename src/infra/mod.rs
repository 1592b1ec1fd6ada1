// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by the other layers:
//
//   checkpoint.rs      model record + configs in one directory
//   tokenizer_store.rs tokenizer copy next to the checkpoint
//   pretrained.rs      GPT-2 weights from safetensors (local or Hub)
//   metrics.rs         overlap metric and the per-epoch CSV log
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Records and Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer saving and loading
pub mod tokenizer_store;

/// Pretrained GPT-2 resolution and weight loading
pub mod pretrained;

/// Overlap metric and training metrics CSV logger
pub mod metrics;
