use anyhow::{ensure, Result};
use burn::{
    nn::{Embedding, EmbeddingConfig},
    prelude::*,
};

use crate::ml::gpt2::{Gpt2Config, Gpt2Model};

#[derive(Config, Debug)]
pub struct SoftPromptConfig {
    pub decoder:           Gpt2Config,
    pub num_prompt_tokens: usize,
}

impl SoftPromptConfig {
    /// Randomly initialised decoder and prompt table.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SoftPromptModel<B> {
        self.with_decoder(self.decoder.init(device), device)
    }

    /// Wrap an already built (usually pretrained) decoder with a
    /// fresh N(0, 1) prompt table of `num_prompt_tokens` rows.
    pub fn with_decoder<B: Backend>(&self, decoder: Gpt2Model<B>, device: &B::Device) -> SoftPromptModel<B> {
        let soft_prompt = EmbeddingConfig::new(self.num_prompt_tokens, self.decoder.n_embd).init(device);
        SoftPromptModel { decoder, soft_prompt }
    }
}

#[derive(Module, Debug)]
pub struct SoftPromptModel<B: Backend> {
    pub decoder:     Gpt2Model<B>,
    pub soft_prompt: Embedding<B>,
}

impl<B: Backend> SoftPromptModel<B> {
    /// Stop tracking gradients for every decoder weight. Only the
    /// prompt table stays trainable.
    pub fn freeze_decoder(self) -> Self {
        Self { decoder: self.decoder.no_grad(), ..self }
    }

    pub fn num_prompt_tokens(&self) -> usize {
        self.soft_prompt.weight.val().dims()[0]
    }

    /// Fail early when prompt + input would not fit the decoder context.
    pub fn check_input_len(&self, prompt_len: usize, input_len: usize) -> Result<()> {
        ensure!(
            prompt_len == self.num_prompt_tokens(),
            "Prompt has {prompt_len} tokens but the prompt table has {} rows",
            self.num_prompt_tokens()
        );
        ensure!(input_len > 0, "Input sequence is empty");
        let total = prompt_len + input_len;
        ensure!(
            total <= self.decoder.max_positions(),
            "Prompt + input is {total} positions, the decoder context is {}",
            self.decoder.max_positions()
        );
        Ok(())
    }

    /// input_ids: [article_len], prompt_ids: [num_prompt_tokens]
    /// → logits [num_prompt_tokens + article_len, vocab]
    pub fn forward(&self, input_ids: Tensor<B, 1, Int>, prompt_ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let prompt_emb = self.soft_prompt.forward(prompt_ids.unsqueeze::<2>());
        let base_emb   = self.decoder.embed_tokens(input_ids).unsqueeze::<3>();
        let embeds     = Tensor::cat(vec![prompt_emb, base_emb], 1);

        let logits = self.decoder.forward_embeds(embeds);
        let [_, seq, vocab] = logits.dims();
        logits.reshape([seq, vocab])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::gpt2::tests::{tiny_config, TestBackend};

    #[test]
    fn test_logits_cover_prompt_and_article() {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 2).init::<TestBackend>(&device);
        let input  = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3, 4, 5].as_slice(), &device);
        let prompt = Tensor::<TestBackend, 1, Int>::from_ints([0, 1].as_slice(), &device);
        assert_eq!(model.forward(input, prompt).dims(), [7, 8]);
    }

    #[test]
    fn test_prompt_table_shape() {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 5).init::<TestBackend>(&device);
        assert_eq!(model.num_prompt_tokens(), 5);
        assert_eq!(model.soft_prompt.weight.val().dims(), [5, 8]);
    }

    #[test]
    fn test_input_len_checks() {
        let device = Default::default();
        let model  = SoftPromptConfig::new(tiny_config(), 1).init::<TestBackend>(&device);
        assert!(model.check_input_len(1, 15).is_ok());
        assert!(model.check_input_len(1, 16).is_err()); // 17 > 16 positions
        assert!(model.check_input_len(2, 4).is_err());  // table has 1 row
        assert!(model.check_input_len(1, 0).is_err());
    }
}
