// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Everything needed to rebuild a trained model lives in one
// directory:
//
//   checkpoints/
//     model.mpk.gz        ← full SoftPromptModel record (f32)
//     model_config.json   ← decoder shape + prompt length
//     train_config.json   ← the run's hyperparameters
//     tokenizer.json      ← written by TokenizerStore
//     metrics.csv         ← written by MetricsLogger
//
// The record is written at full precision. Frozen decoder
// weights are re-saved too, so a checkpoint is loadable without
// the pretrained safetensors. Loading fails when the record
// does not match the freshly built model's shape.

use anyhow::{ensure, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{SoftPromptConfig, SoftPromptModel, SoftPromptModelRecord};

const MODEL_FILE:        &str = "model";
const MODEL_CONFIG_FILE: &str = "model_config.json";
const TRAIN_CONFIG_FILE: &str = "train_config.json";

type ModelRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory for reading.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        anyhow::ensure!(
            dir.is_dir(),
            "Checkpoint directory '{}' does not exist. Have you run 'train' first?",
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_model<B: Backend>(&self, model: &SoftPromptModel<B>) -> Result<()> {
        let path = self.dir.join(MODEL_FILE);
        ModelRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved model record to '{}.mpk.gz'", path.display());
        Ok(())
    }

    /// Restore saved weights into `model`, which must have been
    /// built from the saved model config.
    pub fn load_model<B: Backend>(
        &self,
        model:  SoftPromptModel<B>,
        device: &B::Device,
    ) -> Result<SoftPromptModel<B>> {
        let path   = self.dir.join(MODEL_FILE);
        let record = ModelRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;
        check_record(&model, &record)
            .with_context(|| format!("Checkpoint '{}' does not match its model config", path.display()))?;
        Ok(model.load_record(record))
    }

    pub fn save_model_config(&self, cfg: &SoftPromptConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<SoftPromptConfig> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        SoftPromptConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read model config from '{}': {e}", path.display()))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'infer'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed training config '{}'", path.display()))
    }
}

/// `load_record` panics on a different layer count and silently
/// accepts a differently sized prompt table, so shapes are compared
/// first.
fn check_record<B: Backend>(model: &SoftPromptModel<B>, record: &SoftPromptModelRecord<B>) -> Result<()> {
    same_shape("Prompt table", record.soft_prompt.weight.val().dims(), model.soft_prompt.weight.val().dims())?;
    same_shape("Token embedding", record.decoder.wte.val().dims(), model.decoder.wte.val().dims())?;
    same_shape("Position embedding", record.decoder.wpe.val().dims(), model.decoder.wpe.val().dims())?;
    ensure!(
        record.decoder.blocks.len() == model.decoder.blocks.len(),
        "{} decoder layers were saved, {} expected",
        record.decoder.blocks.len(),
        model.decoder.blocks.len()
    );
    for (i, (saved, built)) in record.decoder.blocks.iter().zip(&model.decoder.blocks).enumerate() {
        same_shape(&format!("Layer {i} attention"), saved.c_attn.weight.val().dims(), built.c_attn.weight.val().dims())?;
        same_shape(&format!("Layer {i} MLP"), saved.c_fc.weight.val().dims(), built.c_fc.weight.val().dims())?;
    }
    Ok(())
}

fn same_shape<const D: usize>(what: &str, saved: [usize; D], expected: [usize; D]) -> Result<()> {
    ensure!(saved == expected, "{what} was saved as {saved:?}, {expected:?} expected");
    Ok(())
}
