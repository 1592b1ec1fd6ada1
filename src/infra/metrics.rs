// ============================================================
// Layer 6: Metrics
// ============================================================
// Two concerns live here:
//
//   1. The token-overlap score reported as "% exact match".
//      It is a bag-of-tokens measure, NOT sequence accuracy:
//
//        predicted = argmax of every logit row
//        overlap   = |set(predicted) ∩ set(target)| / |set(predicted)| × 100
//
//      Position is ignored and repeated tokens count once.
//
//   2. A CSV log with one row per epoch:
//
//        epoch,train_loss,train_overlap,val_loss,val_overlap
//        1,6.912345,11.250000,6.501234,12.500000

use anyhow::{Context, Result};
use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// Percentage of distinct predicted ids that occur anywhere in `target`.
/// Always within [0, 100]; an empty prediction scores 0.
pub fn overlap_percentage(predicted: &[u32], target: &[u32]) -> f64 {
    let predicted: HashSet<u32> = predicted.iter().copied().collect();
    if predicted.is_empty() {
        return 0.0;
    }
    let target: HashSet<u32> = target.iter().copied().collect();
    let shared = predicted.intersection(&target).count();
    shared as f64 / predicted.len() as f64 * 100.0
}

/// Running mean of per-example loss and overlap for one split.
#[derive(Debug, Clone, Default)]
pub struct SplitAccumulator {
    loss_sum:    f64,
    overlap_sum: f64,
    count:       usize,
}

impl SplitAccumulator {
    pub fn record(&mut self, loss: f64, overlap: f64) {
        self.loss_sum    += loss;
        self.overlap_sum += overlap;
        self.count       += 1;
    }

    pub fn mean_loss(&self) -> f64 {
        if self.count > 0 { self.loss_sum / self.count as f64 } else { f64::NAN }
    }

    pub fn mean_overlap(&self) -> f64 {
        if self.count > 0 { self.overlap_sum / self.count as f64 } else { 0.0 }
    }

    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            mean_loss:    self.mean_loss(),
            mean_overlap: self.mean_overlap(),
            examples:     self.count,
        }
    }
}

/// Mean loss and mean overlap over one pass of a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub mean_loss:    f64,
    pub mean_overlap: f64,
    pub examples:     usize,
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    pub train: SplitSummary,

    pub validation: SplitSummary,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: SplitSummary, validation: SplitSummary) -> Self {
        Self { epoch, train, validation }
    }
}

/// Appends epoch metrics to `metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Starts a fresh `metrics.csv` holding only the header. Rows
    /// from an earlier run in the same directory are discarded.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "epoch,train_loss,train_overlap,val_loss,val_overlap")?;
        tracing::debug!("Started metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train.mean_loss,
            m.train.mean_overlap,
            m.validation.mean_loss,
            m.validation.mean_overlap,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train.mean_loss,
            m.validation.mean_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
