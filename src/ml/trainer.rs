// ============================================================
// Layer 5: Training Loop
// ============================================================
// Prompt tuning with batch size one:
//
//   for each epoch:
//     for each training example:
//       logits = model(article, prompt)          [MAX_LEN, vocab]
//       loss   = CE(logits, summary, ignore=EOS)
//       grads += ∇(loss / accumulation_steps)    prompt table only
//       every `accumulation_steps` examples (and at the end):
//         Adam step (eps 1e-8) with gradient-norm clipping, reset grads
//     validation pass → mean loss, mean overlap
//     early-stopping check on mean validation loss
//   test pass → mean loss, mean overlap
//
// The decoder was frozen with no_grad() before training starts,
// so backward() only produces gradients for the prompt table.
// Validation and test run on model.valid() (inner backend, no
// autodiff graph, dropout disabled).

use anyhow::{ensure, Result};
use burn::{
    data::dataloader::DataLoader,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{id_tensor, summary_loader, SummaryBatch},
    dataset::SummaryDataset,
};
use crate::domain::prompt_vocab::PromptSequence;
use crate::infra::metrics::{
    overlap_percentage, EpochMetrics, MetricsLogger, SplitAccumulator, SplitSummary,
};
use crate::ml::early_stopping::{EarlyStopping, EpochVerdict};
use crate::ml::evaluator::{argmax_ids, check_lengths, evaluate_split, progress_bar};
use crate::ml::loss::masked_cross_entropy;
use crate::ml::model::SoftPromptModel;

/// Loop hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingSettings {
    pub epochs:                  usize,
    pub learning_rate:           f64,
    pub grad_accumulation_steps: usize,
    pub grad_clip_norm:          f32,
    pub early_stopping_patience: usize,
    /// Padding id, ignored by the loss
    pub eos_id:                  u32,
    pub show_progress:           bool,
}

/// Everything the loop measured.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub history:       Vec<EpochMetrics>,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub test:          SplitSummary,
}

pub struct Splits {
    pub train:      SummaryDataset,
    pub validation: SummaryDataset,
    pub test:       SummaryDataset,
}

pub fn fine_tune<B: AutodiffBackend>(
    mut model: SoftPromptModel<B>,
    prompt:    &PromptSequence,
    splits:    Splits,
    settings:  &TrainingSettings,
    metrics:   Option<&MetricsLogger>,
    device:    &B::Device,
) -> Result<(SoftPromptModel<B>, TrainingReport)> {
    ensure!(settings.grad_accumulation_steps > 0, "grad_accumulation_steps must be at least 1");

    // ── DataLoaders ───────────────────────────────────────────────────────────
    // Batch size one and no shuffling: examples run in CSV order.
    let train_loader = summary_loader::<B>(splits.train, device);
    let val_loader   = summary_loader::<B::InnerBackend>(splits.validation, device);
    let test_loader  = summary_loader::<B::InnerBackend>(splits.test, device);

    // ── Adam over the prompt table ────────────────────────────────────────────
    // Only prompt-table gradients are ever handed to step(), so the
    // optimizer state exists for that one parameter and nothing else.
    let mut optim = adam_config(settings).init::<B, SoftPromptModel<B>>();

    let mut stopper       = EarlyStopping::new(settings.early_stopping_patience);
    let mut history       = Vec::new();
    let mut stopped_early = false;

    for epoch in 1..=settings.epochs {
        let label = format!("Epoch {epoch}/{}", settings.epochs);
        let (next, train) = train_epoch(model, &mut optim, prompt, train_loader.as_ref(), settings, &label, device)?;
        model = next;

        let valid      = model.valid();
        let validation = evaluate_split(
            &valid, prompt, val_loader.as_ref(), settings.eos_id, "Validation", device, settings.show_progress,
        )?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train % exact match={:.2} | val_loss={:.4} | val % exact match={:.2}",
            epoch, settings.epochs, train.mean_loss, train.mean_overlap,
            validation.mean_loss, validation.mean_overlap,
        );

        let row = EpochMetrics::new(epoch, train, validation);
        if let Some(logger) = metrics {
            logger.log(&row)?;
        }
        history.push(row);

        match stopper.observe(validation.mean_loss) {
            EpochVerdict::Improved => {
                tracing::info!("Epoch {epoch}: new best validation loss {:.4}", validation.mean_loss);
            }
            EpochVerdict::Stale { stale } => {
                tracing::info!("Epoch {epoch}: no improvement for {stale} epoch(s)");
            }
            EpochVerdict::Stop => {
                println!(
                    "Early stopping after {} epochs without improvement.",
                    settings.early_stopping_patience
                );
                stopped_early = true;
                break;
            }
        }
    }

    // ── Test pass ─────────────────────────────────────────────────────────────
    let test = evaluate_split(
        &model.valid(), prompt, test_loader.as_ref(), settings.eos_id, "Test", device, settings.show_progress,
    )?;
    println!("Test : % Exact Match: {:.4}", test.mean_overlap);
    println!("Test Loss : {:.4}", test.mean_loss);

    let report = TrainingReport {
        history,
        best_val_loss: stopper.best(),
        stopped_early,
        test,
    };
    Ok((model, report))
}

fn adam_config(settings: &TrainingSettings) -> AdamConfig {
    AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(settings.grad_clip_norm)))
}

fn train_epoch<B, O>(
    mut model: SoftPromptModel<B>,
    optim:     &mut O,
    prompt:    &PromptSequence,
    loader:    &dyn DataLoader<B, SummaryBatch<B>>,
    settings:  &TrainingSettings,
    label:     &str,
    device:    &B::Device,
) -> Result<(SoftPromptModel<B>, SplitSummary)>
where
    B: AutodiffBackend,
    O: Optimizer<SoftPromptModel<B>, B>,
{
    let total = loader.num_items();
    ensure!(total > 0, "Training split has no examples");

    let steps       = settings.grad_accumulation_steps;
    let prompt_ids  = id_tensor::<B>(prompt.ids(), device);
    let progress    = progress_bar(total, label, settings.show_progress)?;
    let mut acc     = SplitAccumulator::default();
    let mut pending = GradientsAccumulator::<SoftPromptModel<B>>::new();
    let mut seen    = 0;

    for batch in loader.iter() {
        for row in 0..batch.len() {
            let (input_ids, labels) = batch.row(row);
            check_lengths(&model, prompt, input_ids.dims()[0], labels.dims()[0])?;

            let (loss, predicted) = accumulate_example(
                &model, prompt_ids.clone(), input_ids, labels, settings.eos_id, steps, &mut pending,
            );
            acc.record(loss, overlap_percentage(&predicted, &batch.targets[row]));
            seen += 1;

            if seen % steps == 0 || seen == total {
                model = optim.step(settings.learning_rate, model, pending.grads());
            }

            progress.inc(1);
            progress.set_message(format!("{label} loss {:.4}", acc.mean_loss()));
        }
    }
    progress.finish_and_clear();

    println!("Train : % Exact Match: {:.4}", acc.mean_overlap());
    Ok((model, acc.summary()))
}

/// Forward and backward one example, adding the prompt-table
/// gradient of `loss / steps` to `pending`. Returns the unscaled loss
/// and the argmax prediction.
fn accumulate_example<B: AutodiffBackend>(
    model:      &SoftPromptModel<B>,
    prompt_ids: Tensor<B, 1, Int>,
    input_ids:  Tensor<B, 1, Int>,
    labels:     Tensor<B, 1, Int>,
    eos_id:     u32,
    steps:      usize,
    pending:    &mut GradientsAccumulator<SoftPromptModel<B>>,
) -> (f64, Vec<u32>) {
    let logits    = model.forward(input_ids, prompt_ids);
    let predicted = argmax_ids(logits.clone());
    let loss      = masked_cross_entropy(logits, labels, eos_id);
    let value     = loss.clone().into_scalar().elem::<f64>();

    let mut grads = loss.div_scalar(steps as f64).backward();
    let grads     = GradientsParams::from_module(&mut grads, &model.soft_prompt);
    pending.accumulate(model, grads);
    (value, predicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::SummaryExample;
    use crate::data::preprocessor::{Preprocessor, SequenceLayout};
    use crate::domain::example::ArticleSummary;
    use crate::infra::tokenizer_store::{word_level_tokenizer, DEFAULT_EOS_TOKEN};
    use crate::ml::gpt2::tests::tiny_config;
    use crate::ml::model::SoftPromptConfig;

    type TestAutodiffBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    fn settings(epochs: usize, learning_rate: f64, patience: usize) -> TrainingSettings {
        TrainingSettings {
            epochs,
            learning_rate,
            grad_accumulation_steps: 1,
            grad_clip_norm:          1.0,
            early_stopping_patience: patience,
            eos_id:                  3,
            show_progress:           false,
        }
    }

    fn frozen_model(device: &<TestAutodiffBackend as Backend>::Device) -> SoftPromptModel<TestAutodiffBackend> {
        SoftPromptConfig::new(tiny_config(), 1)
            .init::<TestAutodiffBackend>(device)
            .freeze_decoder()
    }

    /// "A B C" → "B" with MAX_LEN 6 and one prompt token.
    fn abc_dataset() -> SummaryDataset {
        let tok    = word_level_tokenizer(&["A", "B", "C", DEFAULT_EOS_TOKEN, "D", "F", "G", "H"]);
        let prep   = Preprocessor::new(&tok, 3);
        let layout = SequenceLayout::new(6, 1, 300).unwrap();
        SummaryDataset::encode(&[ArticleSummary::new("A B C", "B")], &prep, &layout).unwrap()
    }

    fn abc_example() -> SummaryExample {
        SummaryExample {
            article_ids: vec![0, 1, 2, 3, 3],
            summary_ids: vec![1, 3, 3, 3, 3, 3],
        }
    }

    fn repeated(n: usize) -> SummaryDataset {
        SummaryDataset::new(vec![abc_example(); n])
    }

    fn splits(train: SummaryDataset) -> Splits {
        Splits { train, validation: abc_dataset(), test: abc_dataset() }
    }

    fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[test]
    fn test_one_epoch_gives_finite_loss() {
        let device = Default::default();
        let data   = abc_dataset();
        assert_eq!(data.examples()[0], abc_example());

        let prompt = PromptSequence::new(vec![0]).unwrap();
        let (_, report) = fine_tune(frozen_model(&device), &prompt, splits(data), &settings(1, 1e-3, 2), None, &device).unwrap();

        assert_eq!(report.history.len(), 1);
        assert!(report.history[0].train.mean_loss.is_finite());
        assert!(report.history[0].validation.mean_loss.is_finite());
        assert!(report.test.mean_loss.is_finite());
    }

    #[test]
    fn test_only_the_prompt_table_changes() {
        let device = Default::default();
        let model  = frozen_model(&device);
        let wte_before    = to_vec(model.decoder.wte.val());
        let block_before  = to_vec(model.decoder.blocks[0].c_attn.weight.val());
        let prompt_before = to_vec(model.soft_prompt.weight.val());

        let prompt = PromptSequence::new(vec![0]).unwrap();
        let (model, _) = fine_tune(model, &prompt, splits(abc_dataset()), &settings(2, 0.1, 5), None, &device).unwrap();

        assert_eq!(to_vec(model.decoder.wte.val()), wte_before);
        assert_eq!(to_vec(model.decoder.blocks[0].c_attn.weight.val()), block_before);
        assert_ne!(to_vec(model.soft_prompt.weight.val()), prompt_before);
    }

    #[test]
    fn test_early_stopping_halts_after_patience() {
        // A zero learning rate never changes the prompt, so the
        // validation loss repeats exactly and never improves again.
        let device = Default::default();
        let prompt = PromptSequence::new(vec![0]).unwrap();

        let (_, report) = fine_tune(frozen_model(&device), &prompt, splits(abc_dataset()), &settings(10, 0.0, 2), None, &device).unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.history.len(), 3);
    }

    /// The prompt-table gradient left in `pending` after `count`
    /// copies of the "A B C" example, each scaled by `1 / steps`.
    fn accumulated_prompt_grad(
        model:   &SoftPromptModel<TestAutodiffBackend>,
        pending: &mut GradientsAccumulator<SoftPromptModel<TestAutodiffBackend>>,
        count:   usize,
        steps:   usize,
    ) -> Vec<f32> {
        let device  = Default::default();
        let example = abc_example();
        for _ in 0..count {
            accumulate_example(
                model,
                id_tensor::<TestAutodiffBackend>(&[0], &device),
                id_tensor::<TestAutodiffBackend>(&example.article_ids, &device),
                id_tensor::<TestAutodiffBackend>(&example.summary_ids, &device),
                3,
                steps,
                pending,
            );
        }
        let grads = pending.grads();
        let grad  = grads
            .get::<burn::backend::NdArray, 2>(model.soft_prompt.weight.id)
            .unwrap();
        to_vec(grad)
    }

    #[test]
    fn test_accumulated_gradient_is_the_mean_over_steps() {
        let device = Default::default();
        let model  = frozen_model(&device);

        let single = accumulated_prompt_grad(&model, &mut GradientsAccumulator::new(), 1, 1);
        let pair   = accumulated_prompt_grad(&model, &mut GradientsAccumulator::new(), 2, 2);
        assert!(single.iter().any(|g| *g != 0.0));
        assert_close(&pair, &single);
    }

    #[test]
    fn test_accumulator_is_empty_after_each_step() {
        let device      = Default::default();
        let model       = frozen_model(&device);
        let mut pending = GradientsAccumulator::new();

        let first  = accumulated_prompt_grad(&model, &mut pending, 1, 1);
        let second = accumulated_prompt_grad(&model, &mut pending, 1, 1);
        assert_close(&second, &first);
    }

    #[test]
    fn test_accumulating_two_steps_matches_one_step_per_example() {
        // Four identical examples over two accumulation steps take the
        // same two Adam steps as two examples stepped one at a time.
        let device = Default::default();
        let model  = frozen_model(&device);
        let prompt = PromptSequence::new(vec![0]).unwrap();

        let mut accumulated = settings(1, 0.05, 2);
        accumulated.grad_accumulation_steps = 2;
        let (a, report) = fine_tune(model.clone(), &prompt, splits(repeated(4)), &accumulated, None, &device).unwrap();
        let (b, _)      = fine_tune(model, &prompt, splits(repeated(2)), &settings(1, 0.05, 2), None, &device).unwrap();

        assert_eq!(report.history[0].train.examples, 4);
        assert_close(&to_vec(a.soft_prompt.weight.val()), &to_vec(b.soft_prompt.weight.val()));
    }

    #[test]
    fn test_gradient_accumulation_over_partial_tail() {
        // Three examples with accumulation over two: one full step and
        // one step for the leftover example.
        let device = Default::default();
        let model  = frozen_model(&device);
        let prompt_before = to_vec(model.soft_prompt.weight.val());

        let prompt = PromptSequence::new(vec![0]).unwrap();
        let mut s  = settings(1, 0.05, 2);
        s.grad_accumulation_steps = 2;

        let (model, report) = fine_tune(model, &prompt, splits(repeated(3)), &s, None, &device).unwrap();
        assert_eq!(report.history[0].train.examples, 3);
        assert_ne!(to_vec(model.soft_prompt.weight.val()), prompt_before);
    }

    #[test]
    fn test_adam_uses_small_epsilon_and_norm_clipping() {
        let json = serde_json::to_value(adam_config(&settings(1, 1e-3, 2))).unwrap();
        let eps  = json["epsilon"].as_f64().unwrap();
        assert!((eps - 1e-8).abs() < 1e-12, "epsilon {eps}");
        assert!(json["grad_clipping"].to_string().contains("Norm"));
    }

    #[test]
    fn test_empty_training_split_is_an_error() {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 1).init::<TestAutodiffBackend>(&device);
        let prompt = PromptSequence::new(vec![0]).unwrap();
        assert!(fine_tune(model, &prompt, splits(repeated(0)), &settings(1, 1e-3, 2), None, &device).is_err());
    }
}
