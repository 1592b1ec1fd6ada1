// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   1. `train`    prompt-tunes GPT-2 and writes a checkpoint
//   2. `evaluate` scores a checkpoint or the hard-prompt baseline
//   3. `infer`    pseudo-summarises one text
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, EvaluateArgs, InferArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "soft-prompt-summarizer",
    version = "0.1.0",
    about = "Prompt-tune a frozen GPT-2 for summarization, then evaluate and run it."
)]
pub struct Cli {
    /// The subcommand to run (train, evaluate or infer)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Infer(args)    => run_infer(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting prompt tuning of '{}' on '{}'", args.model, args.train_csv);
    let checkpoint_dir = args.checkpoint_dir.clone();
    let report = TrainUseCase::new(args.into()).execute()?;

    if report.stopped_early {
        tracing::info!("Stopped early after {} epochs", report.history.len());
    }
    tracing::info!(
        "Best validation loss {:.4}; test loss {:.4} over {} examples",
        report.best_val_loss,
        report.test.mean_loss,
        report.test.examples
    );
    println!("Training complete. Checkpoint saved to '{checkpoint_dir}'.");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let summary = EvaluateUseCase::new(args.into()).execute()?;
    tracing::info!("Evaluated {} test examples", summary.examples);
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<()> {
    use crate::application::infer_use_case::InferUseCase;

    let text = match (args.text, args.text_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read input text from '{path}'"))?,
        (None, None) => anyhow::bail!("Pass --text or --text-file"),
    };

    let prediction = InferUseCase::new(&args.checkpoint_dir)?.predict(&text)?;
    tracing::info!("Predicted {} tokens", prediction.token_ids.len());
    println!("\nSummary: {}", prediction.text);
    println!("Logits shape: {:?}", prediction.logits_shape);
    Ok(())
}
