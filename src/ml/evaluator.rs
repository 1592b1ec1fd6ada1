// ============================================================
// Layer 5: Split Evaluation
// ============================================================
// One gradient-free pass over a split: mean masked cross-entropy
// and mean token overlap. Used for the validation pass after
// every epoch, the final test pass, and the `evaluate` command.

use anyhow::{ensure, Result};
use burn::{data::dataloader::DataLoader, prelude::*};
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::batcher::{id_tensor, SummaryBatch};
use crate::domain::prompt_vocab::PromptSequence;
use crate::infra::metrics::{overlap_percentage, SplitAccumulator, SplitSummary};
use crate::ml::{loss::masked_cross_entropy, model::SoftPromptModel};

pub fn evaluate_split<B: Backend>(
    model:   &SoftPromptModel<B>,
    prompt:  &PromptSequence,
    loader:  &dyn DataLoader<B, SummaryBatch<B>>,
    eos_id:  u32,
    label:   &str,
    device:  &B::Device,
    show_progress: bool,
) -> Result<SplitSummary> {
    let total = loader.num_items();
    ensure!(total > 0, "{label} split has no examples to evaluate");

    let prompt_ids = id_tensor::<B>(prompt.ids(), device);
    let progress   = progress_bar(total, label, show_progress)?;
    let mut acc    = SplitAccumulator::default();

    for batch in loader.iter() {
        for row in 0..batch.len() {
            let (input_ids, labels) = batch.row(row);
            check_lengths(model, prompt, input_ids.dims()[0], labels.dims()[0])?;
            let logits = model.forward(input_ids, prompt_ids.clone());

            let predicted = argmax_ids(logits.clone());
            let loss      = masked_cross_entropy(logits, labels, eos_id)
                .into_scalar()
                .elem::<f64>();

            acc.record(loss, overlap_percentage(&predicted, &batch.targets[row]));
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    let summary = acc.summary();
    tracing::debug!(
        "{label}: {} examples, mean loss {:.4}, overlap {:.2}%",
        summary.examples,
        summary.mean_loss,
        summary.mean_overlap,
    );
    Ok(summary)
}

/// Logit rows must line up one-to-one with summary positions.
pub(crate) fn check_lengths<B: Backend>(
    model:       &SoftPromptModel<B>,
    prompt:      &PromptSequence,
    article_len: usize,
    summary_len: usize,
) -> Result<()> {
    model.check_input_len(prompt.len(), article_len)?;
    ensure!(
        prompt.len() + article_len == summary_len,
        "Shape mismatch: {} prompt + {article_len} article positions vs {summary_len} summary targets",
        prompt.len(),
    );
    Ok(())
}

/// logits [seq, vocab] → the most likely token id at every position
pub(crate) fn argmax_ids<B: Backend>(logits: Tensor<B, 2>) -> Vec<u32> {
    let [seq, _] = logits.dims();
    logits
        .argmax(1)
        .reshape([seq])
        .into_data()
        .iter::<i64>()
        .map(|id| id as u32)
        .collect()
}

pub(crate) fn progress_bar(len: usize, label: &str, show: bool) -> Result<ProgressBar> {
    if !show {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::with_template(
        "{msg:>12} {bar:40.green/black} {pos}/{len} [{elapsed}<{eta}]",
    )?);
    bar.set_message(label.to_string());
    Ok(bar)
}
