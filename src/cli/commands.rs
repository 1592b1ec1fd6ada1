// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `evaluate` and `infer`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgGroup, Args, Subcommand};

use crate::application::{
    evaluate_use_case::{EvaluateConfig, ModelSource},
    train_use_case::TrainConfig,
};

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prompt-tune GPT-2 on CNN/DailyMail style CSV splits
    Train(TrainArgs),

    /// Test-split loss and overlap of a checkpoint or an untrained prompt
    Evaluate(EvaluateArgs),

    /// Pseudo-summarise a single text with a trained checkpoint
    Infer(InferArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(long, default_value = "cnn_dailymail/train.csv")]
    pub train_csv: String,

    #[arg(long, default_value = "cnn_dailymail/validation.csv")]
    pub validation_csv: String,

    #[arg(long, default_value = "cnn_dailymail/test.csv")]
    pub test_csv: String,

    /// Hugging Face model id or a local directory with
    /// config.json, model.safetensors and tokenizer.json
    #[arg(long, default_value = "gpt2")]
    pub model: String,

    /// Directory to save the checkpoint, tokenizer and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Words of the prompt vocabulary, comma separated
    #[arg(long, value_delimiter = ',', default_value = "[SUMMARIZE]")]
    pub prompt_vocab: Vec<String>,

    /// Prompt phrase; every word must be in --prompt-vocab
    #[arg(long, default_value = "[SUMMARIZE]")]
    pub prompt: String,

    /// Prompt + article length, and the padded summary length
    #[arg(long, default_value_t = 1024)]
    pub max_len: usize,

    /// Summary tokens kept before padding
    #[arg(long, default_value_t = 300)]
    pub max_summary_tokens: usize,

    /// Fraction of each split's rows used for the run
    #[arg(long, default_value_t = 0.001)]
    pub sample_fraction: f64,

    /// Seed for the row sampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Examples whose gradients are summed before each optimiser step
    #[arg(long, default_value_t = 1)]
    pub grad_accumulation_steps: usize,

    /// Maximum L2 norm of the prompt gradient
    #[arg(long, default_value_t = 1.0)]
    pub grad_clip_norm: f32,

    /// Epochs without validation improvement before stopping
    #[arg(long, default_value_t = 2)]
    pub early_stopping_patience: usize,

    /// Hide the progress bars
    #[arg(long)]
    pub quiet: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_csv:               a.train_csv,
            validation_csv:          a.validation_csv,
            test_csv:                a.test_csv,
            model:                   a.model,
            checkpoint_dir:          a.checkpoint_dir,
            prompt_vocab:            a.prompt_vocab,
            prompt:                  a.prompt,
            max_len:                 a.max_len,
            max_summary_tokens:      a.max_summary_tokens,
            sample_fraction:         a.sample_fraction,
            seed:                    a.seed,
            epochs:                  a.epochs,
            lr:                      a.lr,
            grad_accumulation_steps: a.grad_accumulation_steps,
            grad_clip_norm:          a.grad_clip_norm,
            early_stopping_patience: a.early_stopping_patience,
            quiet:                   a.quiet,
        }
    }
}

/// All arguments for the `evaluate` command.
/// Either a trained checkpoint or a pretrained model is scored.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["checkpoint_dir", "model"])))]
pub struct EvaluateArgs {
    /// Directory written by `train`
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Pretrained model to evaluate behind an untrained prompt
    #[arg(long)]
    pub model: Option<String>,

    /// Prompt vocabulary for --model, comma separated
    #[arg(long, value_delimiter = ',', default_value = "Summarize,the,following,sentence,:")]
    pub prompt_vocab: Vec<String>,

    /// Prompt phrase for --model
    #[arg(long, default_value = "Summarize the following sentence :")]
    pub prompt: String,

    #[arg(long, default_value = "cnn_dailymail/test.csv")]
    pub test_csv: String,

    /// Sequence length for --model (checkpoints keep their own)
    #[arg(long, default_value_t = 1024)]
    pub max_len: usize,

    /// Summary tokens kept for --model (checkpoints keep their own)
    #[arg(long, default_value_t = 300)]
    pub max_summary_tokens: usize,

    #[arg(long, default_value_t = 0.001)]
    pub sample_fraction: f64,

    /// Seed for the test-row sampling; the training run's seed and
    /// fraction select the same test rows it scored
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long)]
    pub quiet: bool,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        let source = match (a.checkpoint_dir, a.model) {
            (Some(dir), _) => ModelSource::Checkpoint { dir },
            (None, model) => ModelSource::Pretrained {
                model:        model.unwrap_or_else(|| "gpt2".to_string()),
                prompt_vocab: a.prompt_vocab,
                prompt:       a.prompt,
            },
        };
        EvaluateConfig {
            source,
            test_csv:           a.test_csv,
            max_len:            a.max_len,
            max_summary_tokens: a.max_summary_tokens,
            sample_fraction:    a.sample_fraction,
            seed:               a.seed,
            quiet:              a.quiet,
        }
    }
}

/// All arguments for the `infer` command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["text", "text_file"])))]
pub struct InferArgs {
    /// Directory where the checkpoint was saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Text to summarise
    #[arg(long)]
    pub text: Option<String>,

    /// File holding the text to summarise
    #[arg(long)]
    pub text_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("soft-prompt-summarizer").chain(args.iter().copied()))
    }

    #[test]
    fn test_train_defaults() {
        let cli = parse(&["train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);
        assert_eq!(cfg.max_len, 1024);
        assert_eq!(cfg.max_summary_tokens, 300);
        assert_eq!(cfg.sample_fraction, 0.001);
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.lr, 1e-3);
        assert_eq!(cfg.grad_accumulation_steps, 1);
        assert_eq!(cfg.grad_clip_norm, 1.0);
        assert_eq!(cfg.early_stopping_patience, 2);
        assert_eq!(cfg.prompt_vocab, vec!["[SUMMARIZE]"]);
        assert_eq!(cfg.train_csv, "cnn_dailymail/train.csv");
    }

    #[test]
    fn test_prompt_vocab_is_comma_separated() {
        let cli = parse(&["train", "--prompt-vocab", "Summarize,this", "--prompt", "Summarize this"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.prompt_vocab, vec!["Summarize", "this"]);
    }

    #[test]
    fn test_evaluate_needs_a_source() {
        assert!(parse(&["evaluate"]).is_err());

        let cli = parse(&["evaluate", "--model", "gpt2"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        match EvaluateConfig::from(args).source {
            ModelSource::Pretrained { prompt_vocab, prompt, .. } => {
                assert_eq!(prompt_vocab.len(), 5);
                assert_eq!(prompt, "Summarize the following sentence :");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_infer_needs_text_or_file() {
        assert!(parse(&["infer"]).is_err());
        assert!(parse(&["infer", "--text", "A B", "--text-file", "x.txt"]).is_err());
        assert!(parse(&["infer", "--text", "A B"]).is_ok());
    }
}
