// ============================================================
// Layer 2: EvaluateUseCase
// ============================================================
// Scores a model on the test split, without training:
//
//   checkpoint → the trained prompt, its tokenizer and layout
//   pretrained → the frozen decoder behind a freshly initialised
//                prompt table (the "hard prompt" baseline)

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::application::train_use_case::load_split;
use crate::data::{
    batcher::summary_loader,
    preprocessor::{Preprocessor, SequenceLayout},
    sampler::{split_rng, Split},
};
use crate::domain::prompt_vocab::{PromptSequence, PromptVocab};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::SplitSummary,
    pretrained::load_pretrained,
    tokenizer_store::{token_id, TokenizerStore, DEFAULT_EOS_TOKEN},
};
use crate::ml::{
    evaluator::evaluate_split,
    model::{SoftPromptConfig, SoftPromptModel},
    InferBackend,
};

/// Where the evaluated model comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelSource {
    /// A directory written by `train`
    Checkpoint { dir: String },
    /// A pretrained GPT-2 with an untrained prompt
    Pretrained {
        model:        String,
        prompt_vocab: Vec<String>,
        prompt:       String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub source:             ModelSource,
    pub test_csv:           String,
    /// Ignored for checkpoints, which carry their own
    pub max_len:            usize,
    /// Ignored for checkpoints, which carry their own
    pub max_summary_tokens: usize,
    pub sample_fraction:    f64,
    pub seed:               u64,
    pub quiet:              bool,
}

struct Loaded<B: Backend> {
    model:              SoftPromptModel<B>,
    prompt:             PromptSequence,
    tokenizer:          Tokenizer,
    max_len:            usize,
    max_summary_tokens: usize,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SplitSummary> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.run::<InferBackend>(&device)
    }

    pub fn run<B: Backend>(&self, device: &B::Device) -> Result<SplitSummary> {
        let cfg    = &self.config;
        let loaded = self.load::<B>(device)?;
        let eos_id = token_id(&loaded.tokenizer, DEFAULT_EOS_TOKEN)?;

        let layout       = SequenceLayout::new(loaded.max_len, loaded.prompt.len(), loaded.max_summary_tokens)?;
        let preprocessor = Preprocessor::new(&loaded.tokenizer, eos_id);
        let mut rng      = split_rng(cfg.seed, Split::Test);
        let test = load_split(&cfg.test_csv, cfg.sample_fraction, &mut rng, &preprocessor, &layout)?;
        let loader = summary_loader::<B>(test, device);

        let summary = evaluate_split(
            &loaded.model, &loaded.prompt, loader.as_ref(), eos_id, "Test", device, !cfg.quiet,
        )?;
        println!("Test : % Exact Match: {:.4}", summary.mean_overlap);
        println!("Test Loss : {:.4}", summary.mean_loss);
        Ok(summary)
    }

    fn load<B: Backend>(&self, device: &B::Device) -> Result<Loaded<B>> {
        match &self.config.source {
            ModelSource::Checkpoint { dir } => {
                let ckpt      = CheckpointManager::open(dir)?;
                let train_cfg = ckpt.load_config()?;
                let model_cfg = ckpt.load_model_config()?;
                let model     = ckpt.load_model(model_cfg.init::<B>(device), device)?;
                let prompt    = PromptVocab::new(train_cfg.prompt_vocab.iter()).encode(&train_cfg.prompt)?;
                tracing::info!("Evaluating checkpoint '{dir}'");
                Ok(Loaded {
                    model,
                    prompt,
                    tokenizer:          TokenizerStore::new(ckpt.dir()).load()?,
                    max_len:            train_cfg.max_len,
                    max_summary_tokens: train_cfg.max_summary_tokens,
                })
            }
            ModelSource::Pretrained { model, prompt_vocab, prompt } => {
                let pretrained = load_pretrained::<B>(model, device)?;
                let prompt     = PromptVocab::new(prompt_vocab.iter()).encode(prompt)?;
                tracing::info!("Evaluating '{model}' behind an untrained {}-token prompt", prompt.len());
                let model      = SoftPromptConfig::new(pretrained.config, prompt.len())
                    .with_decoder(pretrained.decoder, device);
                Ok(Loaded {
                    model,
                    prompt,
                    tokenizer:          pretrained.tokenizer,
                    max_len:            self.config.max_len,
                    max_summary_tokens: self.config.max_summary_tokens,
                })
            }
        }
    }
}
