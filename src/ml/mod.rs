// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here.
//
//   gpt2.rs           GPT-2 decoder (embeddings, causal blocks,
//                     final layer norm, tied LM head)
//   model.rs          frozen decoder + trainable prompt table
//   loss.rs           cross-entropy that skips EOS targets
//   early_stopping.rs patience counter on validation loss
//   evaluator.rs      gradient-free pass over a split
//   trainer.rs        prompt-tuning loop
//   inferencer.rs     argmax readout for a single text
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Radford et al. (2019) Language Models are Unsupervised Multitask Learners
//            Lester et al. (2021) The Power of Scale for Parameter-Efficient Prompt Tuning

/// Backend used for training: GPU through wgpu, with autodiff
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend used for evaluation and inference
pub type InferBackend = burn::backend::Wgpu;

/// GPT-2 decoder architecture and parameter sources
pub mod gpt2;

/// Soft-prompt wrapper around the frozen decoder
pub mod model;

/// Masked cross-entropy
pub mod loss;

/// Early stopping on validation loss
pub mod early_stopping;

/// Mean loss / overlap over a split
pub mod evaluator;

/// Training loop with gradient accumulation
pub mod trainer;

/// Inference engine: loads a checkpoint and decodes predictions
pub mod inferencer;
