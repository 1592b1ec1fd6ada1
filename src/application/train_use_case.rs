// ============================================================
// Layer 2: TrainUseCase
// ============================================================
// Orchestrates the full prompt-tuning run in order:
//
//   Step 1: Load pretrained GPT-2 + tokenizer  (Layer 6 - infra)
//   Step 2: Build the prompt sequence          (Layer 3 - domain)
//   Step 3: Load, sample and encode the splits (Layer 4 - data)
//   Step 4: Wrap the frozen decoder            (Layer 5 - ml)
//   Step 5: Save configs + tokenizer           (Layer 6 - infra)
//   Step 6: Run the training loop              (Layer 5 - ml)
//   Step 7: Save the trained model             (Layer 6 - infra)

use anyhow::{ensure, Result};
use burn::tensor::backend::AutodiffBackend;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::SummaryDataset,
    loader::CsvLoader,
    preprocessor::{Preprocessor, SequenceLayout},
    sampler::{sample_fraction, split_rng, Split},
};
use crate::domain::{prompt_vocab::PromptVocab, traits::ExampleSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    pretrained::load_pretrained,
    tokenizer_store::{token_id, TokenizerStore, DEFAULT_EOS_TOKEN},
};
use crate::ml::{
    model::SoftPromptConfig,
    trainer::{fine_tune, Splits, TrainingReport, TrainingSettings},
    TrainBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a run. Saved next to the checkpoint so inference
// can rebuild the prompt and sequence layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_csv:               String,
    pub validation_csv:          String,
    pub test_csv:                String,
    pub model:                   String,
    pub checkpoint_dir:          String,
    pub prompt_vocab:            Vec<String>,
    pub prompt:                  String,
    pub max_len:                 usize,
    pub max_summary_tokens:      usize,
    pub sample_fraction:         f64,
    pub seed:                    u64,
    pub epochs:                  usize,
    pub lr:                      f64,
    pub grad_accumulation_steps: usize,
    pub grad_clip_norm:          f32,
    pub early_stopping_patience: usize,
    #[serde(default)]
    pub quiet:                   bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_csv:               "cnn_dailymail/train.csv".to_string(),
            validation_csv:          "cnn_dailymail/validation.csv".to_string(),
            test_csv:                "cnn_dailymail/test.csv".to_string(),
            model:                   "gpt2".to_string(),
            checkpoint_dir:          "checkpoints".to_string(),
            prompt_vocab:            vec!["[SUMMARIZE]".to_string()],
            prompt:                  "[SUMMARIZE]".to_string(),
            max_len:                 1024,
            max_summary_tokens:      300,
            sample_fraction:         0.001,
            seed:                    42,
            epochs:                  10,
            lr:                      1e-3,
            grad_accumulation_steps: 1,
            grad_clip_norm:          1.0,
            early_stopping_patience: 2,
            quiet:                   false,
        }
    }
}

impl TrainConfig {
    fn settings(&self, eos_id: u32) -> TrainingSettings {
        TrainingSettings {
            epochs:                  self.epochs,
            learning_rate:           self.lr,
            grad_accumulation_steps: self.grad_accumulation_steps,
            grad_clip_norm:          self.grad_clip_norm,
            early_stopping_patience: self.early_stopping_patience,
            eos_id,
            show_progress:           !self.quiet,
        }
    }
}

/// Read one CSV split, keep a random `fraction` of its complete rows
/// and encode them with `layout`.
pub fn load_split<R: RngCore>(
    path:         &str,
    fraction:     f64,
    rng:          &mut R,
    preprocessor: &Preprocessor<'_>,
    layout:       &SequenceLayout,
) -> Result<SummaryDataset> {
    let rows    = CsvLoader::new(path).load_all()?;
    let total   = rows.len();
    let sampled = sample_fraction(rows, fraction, rng);
    tracing::info!("'{path}': sampled {} of {total} rows", sampled.len());
    SummaryDataset::encode(&sampled, preprocessor, layout)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on the GPU backend
    pub fn execute(&self) -> Result<TrainingReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.run::<TrainBackend>(&device)
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainingReport> {
        let cfg = &self.config;

        // ── Step 1: Pretrained decoder + tokenizer ────────────────────────────
        let pretrained = load_pretrained::<B>(&cfg.model, device)?;
        let eos_id     = token_id(&pretrained.tokenizer, DEFAULT_EOS_TOKEN)?;
        ensure!(
            cfg.max_len <= pretrained.config.n_positions,
            "max_len {} exceeds the model context of {} positions",
            cfg.max_len,
            pretrained.config.n_positions
        );

        // ── Step 2: Prompt sequence ───────────────────────────────────────────
        let vocab  = PromptVocab::new(cfg.prompt_vocab.iter());
        let prompt = vocab.encode(&cfg.prompt)?;
        tracing::info!("Prompt '{}' → {:?} over {:?}", cfg.prompt, prompt.ids(), vocab.words());

        // ── Step 3: Datasets ──────────────────────────────────────────────────
        let layout       = SequenceLayout::new(cfg.max_len, prompt.len(), cfg.max_summary_tokens)?;
        let preprocessor = Preprocessor::new(&pretrained.tokenizer, eos_id);
        let sample = |path: &str, split| {
            load_split(path, cfg.sample_fraction, &mut split_rng(cfg.seed, split), &preprocessor, &layout)
        };
        let train = sample(&cfg.train_csv, Split::Train)?;
        let val   = sample(&cfg.validation_csv, Split::Validation)?;
        let test  = sample(&cfg.test_csv, Split::Test)?;
        tracing::info!(
            "Split: {} train, {} validation, {} test",
            train.examples().len(),
            val.examples().len(),
            test.examples().len()
        );

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let model_cfg = SoftPromptConfig::new(pretrained.config.clone(), prompt.len());
        let model     = model_cfg.with_decoder(pretrained.decoder, device).freeze_decoder();

        // ── Step 5: Everything inference needs, written up front ──────────────
        let ckpt = CheckpointManager::create(&cfg.checkpoint_dir)?;
        ckpt.save_config(cfg)?;
        ckpt.save_model_config(&model_cfg)?;
        TokenizerStore::new(ckpt.dir()).save(&pretrained.tokenizer)?;
        let metrics = MetricsLogger::new(ckpt.dir())?;
        tracing::info!("Logging epoch metrics to '{}'", metrics.csv_path().display());

        // ── Step 6: Training loop ─────────────────────────────────────────────
        let splits = Splits { train, validation: val, test };
        let (model, report) = fine_tune(model, &prompt, splits, &cfg.settings(eos_id), Some(&metrics), device)?;

        // ── Step 7: Trained model ─────────────────────────────────────────────
        ckpt.save_model(&model)?;
        tracing::info!(
            "Saved checkpoint to '{}' (best val loss {:.4})",
            ckpt.dir().display(),
            report.best_val_loss
        );
        Ok(report)
    }
}
