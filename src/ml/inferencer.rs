// ============================================================
// Layer 5: Inferencer
// ============================================================
// Greedy next-token readout, no generation loop:
//
//   text → ids (truncated to max_len − prompt_len)
//        → logits [prompt_len + ids, vocab]
//        → argmax per position
//        → decode, skipping special tokens
//
// The result has one token per input position, so it is a
// same-length pseudo-summary rather than generated text.

use anyhow::{ensure, Result};
use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::data::{batcher::id_tensor, preprocessor::Preprocessor};
use crate::domain::prompt_vocab::{PromptSequence, PromptVocab};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{token_id, TokenizerStore, DEFAULT_EOS_TOKEN},
};
use crate::ml::{evaluator::argmax_ids, model::SoftPromptModel};

#[derive(Debug, Clone)]
pub struct Prediction {
    pub token_ids:    Vec<u32>,
    pub text:         String,
    pub logits_shape: [usize; 2],
}

pub struct Inferencer<B: Backend> {
    model:     SoftPromptModel<B>,
    prompt:    PromptSequence,
    tokenizer: Tokenizer,
    max_len:   usize,
    device:    B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:     SoftPromptModel<B>,
        prompt:    PromptSequence,
        tokenizer: Tokenizer,
        max_len:   usize,
        device:    B::Device,
    ) -> Result<Self> {
        ensure!(
            max_len > prompt.len(),
            "max_len ({max_len}) leaves no room for text after {} prompt tokens",
            prompt.len()
        );
        Ok(Self { model, prompt, tokenizer, max_len, device })
    }

    /// Rebuild the trained model, its prompt and its tokenizer from
    /// a checkpoint directory.
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device) -> Result<Self> {
        let train_cfg = ckpt.load_config()?;
        let model_cfg = ckpt.load_model_config()?;
        let model     = ckpt.load_model(model_cfg.init::<B>(&device), &device)?;

        let vocab  = PromptVocab::new(train_cfg.prompt_vocab.iter());
        let prompt = vocab.encode(&train_cfg.prompt)?;
        let tokenizer = TokenizerStore::new(ckpt.dir()).load()?;

        tracing::info!(
            "Model loaded from '{}' ({} prompt tokens)",
            ckpt.dir().display(),
            prompt.len()
        );
        Self::new(model, prompt, tokenizer, train_cfg.max_len, device)
    }

    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let eos_id = token_id(&self.tokenizer, DEFAULT_EOS_TOKEN)?;
        let ids    = Preprocessor::new(&self.tokenizer, eos_id)
            .encode(text, self.max_len - self.prompt.len())?;
        self.model.check_input_len(self.prompt.len(), ids.len())?;

        let logits = self.model.forward(
            id_tensor::<B>(&ids, &self.device),
            id_tensor::<B>(self.prompt.ids(), &self.device),
        );
        let logits_shape = logits.dims();

        let token_ids = argmax_ids(logits);
        let text = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| anyhow::anyhow!("Decoding error: {e}"))?;

        tracing::debug!("Predicted {} tokens, logits {:?}", token_ids.len(), logits_shape);
        Ok(Prediction { token_ids, text, logits_shape })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::word_level_tokenizer;
    use crate::ml::gpt2::tests::{tiny_config, TestBackend};
    use crate::ml::model::SoftPromptConfig;

    const WORDS: [&str; 8] = ["A", "B", "C", DEFAULT_EOS_TOKEN, "D", "F", "G", "H"];

    fn inferencer(max_len: usize) -> Inferencer<TestBackend> {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 2).init::<TestBackend>(&device);
        let prompt = PromptSequence::new(vec![0, 1]).unwrap();
        Inferencer::new(model, prompt, word_level_tokenizer(&WORDS), max_len, device).unwrap()
    }

    #[test]
    fn test_prediction_covers_prompt_and_text() {
        let pred = inferencer(16).predict("A B C D").unwrap();
        assert_eq!(pred.logits_shape, [6, 8]);
        assert_eq!(pred.token_ids.len(), 6);
    }

    #[test]
    fn test_long_input_is_truncated_to_fit() {
        // 10 words, but only max_len − 2 = 4 fit after the prompt
        let pred = inferencer(6).predict("A B C D F G H A B C").unwrap();
        assert_eq!(pred.logits_shape, [6, 8]);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let inf = inferencer(16);
        assert_eq!(inf.predict("A B").unwrap().text, inf.predict("A B").unwrap().text);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(inferencer(16).predict("").is_err());
    }

    #[test]
    fn test_max_len_must_exceed_prompt() {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 2).init::<TestBackend>(&device);
        let prompt = PromptSequence::new(vec![0, 1]).unwrap();
        assert!(Inferencer::new(model, prompt, word_level_tokenizer(&WORDS), 2, device).is_err());
    }
}
