// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// Orchestrates the other layers into the three workflows the
// CLI exposes:
//
//   train_use_case.rs     prompt-tune on CSV splits, save a checkpoint
//   evaluate_use_case.rs  test-split loss and overlap of a checkpoint
//                         or of an untrained (hard) prompt
//   infer_use_case.rs     argmax pseudo-summary of a single text
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow
pub mod train_use_case;

// Test-split evaluation
pub mod evaluate_use_case;

// Single-text inference
pub mod infer_use_case;
