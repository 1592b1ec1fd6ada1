use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Initializer, LayerNorm, LayerNormConfig, Linear},
    prelude::*,
    tensor::activation::softmax,
};

/// Additive attention bias for positions a query may not see.
const MASKED: f32 = -1.0e9;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Gpt2Config {
    pub vocab_size:  usize,
    pub n_positions: usize,
    pub n_embd:      usize,
    pub n_head:      usize,
    pub n_layer:     usize,
    #[config(default = 1e-5)]
    pub layer_norm_epsilon: f64,
    #[config(default = 0.1)]
    pub dropout: f64,
}

/// Where the decoder's parameters come from: fresh initialisers
/// or a pretrained checkpoint. Names follow the Hugging Face GPT-2
/// layout (`h.0.attn.c_attn.weight`, ...).
pub trait ParamSource<B: Backend> {
    type Error;

    fn device(&self) -> &B::Device;

    fn param<const D: usize>(
        &mut self,
        name:  &str,
        shape: [usize; D],
        init:  Initializer,
    ) -> Result<Param<Tensor<B, D>>, Self::Error>;
}

/// Fills every parameter from its initialiser.
pub struct RandomInit<'a, B: Backend> {
    device: &'a B::Device,
}

impl<'a, B: Backend> RandomInit<'a, B> {
    pub fn new(device: &'a B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> ParamSource<B> for RandomInit<'_, B> {
    type Error = std::convert::Infallible;

    fn device(&self) -> &B::Device {
        self.device
    }

    fn param<const D: usize>(
        &mut self,
        _name: &str,
        shape: [usize; D],
        init:  Initializer,
    ) -> Result<Param<Tensor<B, D>>, Self::Error> {
        Ok(init.init(shape, self.device))
    }
}

fn weight_init() -> Initializer {
    Initializer::Normal { mean: 0.0, std: 0.02 }
}

impl Gpt2Config {
    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Gpt2Model<B> {
        match self.build(&mut RandomInit::new(device)) {
            Ok(model) => model,
            Err(never) => match never {},
        }
    }

    pub fn build<B: Backend, S: ParamSource<B>>(&self, source: &mut S) -> Result<Gpt2Model<B>, S::Error> {
        let wte = source.param("wte.weight", [self.vocab_size, self.n_embd], weight_init())?;
        let wpe = source.param("wpe.weight", [self.n_positions, self.n_embd], Initializer::Normal { mean: 0.0, std: 0.01 })?;
        let blocks = (0..self.n_layer)
            .map(|i| self.build_block(&format!("h.{i}"), source))
            .collect::<Result<Vec<_>, _>>()?;
        let ln_f = self.build_layer_norm("ln_f", source)?;
        Ok(Gpt2Model {
            wte,
            wpe,
            blocks,
            ln_f,
            dropout: DropoutConfig::new(self.dropout).init(),
        })
    }

    fn build_block<B: Backend, S: ParamSource<B>>(&self, prefix: &str, source: &mut S) -> Result<Gpt2Block<B>, S::Error> {
        let d = self.n_embd;
        Ok(Gpt2Block {
            ln_1:    self.build_layer_norm(&format!("{prefix}.ln_1"), source)?,
            c_attn:  build_projection(&format!("{prefix}.attn.c_attn"), d, 3 * d, source)?,
            attn_proj: build_projection(&format!("{prefix}.attn.c_proj"), d, d, source)?,
            ln_2:    self.build_layer_norm(&format!("{prefix}.ln_2"), source)?,
            c_fc:    build_projection(&format!("{prefix}.mlp.c_fc"), d, 4 * d, source)?,
            mlp_proj: build_projection(&format!("{prefix}.mlp.c_proj"), 4 * d, d, source)?,
            dropout: DropoutConfig::new(self.dropout).init(),
            n_head:  self.n_head,
        })
    }

    /// burn's LayerNorm keeps its epsilon private, so the module comes
    /// from the config and only gamma/beta are swapped in.
    fn build_layer_norm<B: Backend, S: ParamSource<B>>(&self, prefix: &str, source: &mut S) -> Result<LayerNorm<B>, S::Error> {
        let gamma = source.param(&format!("{prefix}.weight"), [self.n_embd], Initializer::Ones)?;
        let beta  = source.param(&format!("{prefix}.bias"), [self.n_embd], Initializer::Zeros)?;
        let mut norm = LayerNormConfig::new(self.n_embd)
            .with_epsilon(self.layer_norm_epsilon)
            .init(source.device());
        norm.gamma = gamma;
        norm.beta  = Some(beta);
        Ok(norm)
    }
}

/// burn's Linear stores its weight `[d_in, d_out]`, the same layout
/// as GPT-2's Conv1D, so checkpoint tensors go in untransposed.
fn build_projection<B: Backend, S: ParamSource<B>>(
    prefix: &str,
    d_in:   usize,
    d_out:  usize,
    source: &mut S,
) -> Result<Linear<B>, S::Error> {
    Ok(Linear {
        weight: source.param(&format!("{prefix}.weight"), [d_in, d_out], weight_init())?,
        bias:   Some(source.param(&format!("{prefix}.bias"), [d_out], Initializer::Zeros)?),
    })
}

#[derive(Module, Debug)]
pub struct Gpt2Block<B: Backend> {
    pub ln_1:      LayerNorm<B>,
    pub c_attn:    Linear<B>,
    pub attn_proj: Linear<B>,
    pub ln_2:      LayerNorm<B>,
    pub c_fc:      Linear<B>,
    pub mlp_proj:  Linear<B>,
    pub dropout:   Dropout,
    pub n_head:    usize,
}

impl<B: Backend> Gpt2Block<B> {
    /// Pre-norm residual block. `bias` is the `[1, 1, seq, seq]` causal mask.
    pub fn forward(&self, x: Tensor<B, 3>, bias: Tensor<B, 4>) -> Tensor<B, 3> {
        let attn = self.attention(self.ln_1.forward(x.clone()), bias);
        let x    = x + self.dropout.forward(attn);
        let mlp  = self.mlp_proj.forward(gelu_new(self.c_fc.forward(self.ln_2.forward(x.clone()))));
        x + self.dropout.forward(mlp)
    }

    fn attention(&self, x: Tensor<B, 3>, bias: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, seq, d_model] = x.dims();
        let head_dim = d_model / self.n_head;

        let qkv = self.c_attn.forward(x);
        let split = |i: usize| {
            qkv.clone()
                .slice([0..batch, 0..seq, i * d_model..(i + 1) * d_model])
                .reshape([batch, seq, self.n_head, head_dim])
                .swap_dims(1, 2)
        };
        let (q, k, v) = (split(0), split(1), split(2));

        let scores = q.matmul(k.swap_dims(2, 3)).div_scalar((head_dim as f64).sqrt()) + bias;
        let probs  = self.dropout.forward(softmax(scores, 3));
        let context = probs
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq, d_model]);

        self.attn_proj.forward(context)
    }
}

/// GPT-2 decoder with the LM head tied to the token embedding.
#[derive(Module, Debug)]
pub struct Gpt2Model<B: Backend> {
    pub wte:     Param<Tensor<B, 2>>,
    pub wpe:     Param<Tensor<B, 2>>,
    pub blocks:  Vec<Gpt2Block<B>>,
    pub ln_f:    LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Gpt2Model<B> {
    pub fn max_positions(&self) -> usize {
        self.wpe.val().dims()[0]
    }

    pub fn vocab_size(&self) -> usize {
        self.wte.val().dims()[0]
    }

    /// ids: [seq_len] → token embeddings [seq_len, n_embd]
    pub fn embed_tokens(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.wte.val().select(0, ids)
    }

    /// embeds: [batch, seq_len, n_embd] → logits [batch, seq_len, vocab]
    pub fn forward_embeds(&self, embeds: Tensor<B, 3>) -> Tensor<B, 3> {
        let [_, seq, _] = embeds.dims();
        let device = embeds.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq as i64, &device);
        let pos_emb   = self.wpe.val().select(0, positions).unsqueeze::<3>();

        let bias = causal_bias::<B>(seq, &device);
        let mut x = self.dropout.forward(embeds + pos_emb);
        for block in &self.blocks {
            x = block.forward(x, bias.clone());
        }
        let x = self.ln_f.forward(x);

        let [batch, seq, d_model] = x.dims();
        x.reshape([batch * seq, d_model])
            .matmul(self.wte.val().transpose())
            .reshape([batch, seq, self.vocab_size()])
    }
}

/// [1, 1, seq, seq]: 0 on and below the diagonal, MASKED above it.
fn causal_bias<B: Backend>(seq: usize, device: &B::Device) -> Tensor<B, 4> {
    let values: Vec<f32> = (0..seq)
        .flat_map(|row| (0..seq).map(move |col| if col > row { MASKED } else { 0.0 }))
        .collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([1, 1, seq, seq])
}

/// The tanh approximation of GELU used by GPT-2.
fn gelu_new<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let cubic = x.clone() * x.clone() * x.clone();
    let inner = (x.clone() + cubic.mul_scalar(0.044715))
        .mul_scalar((2.0 / std::f64::consts::PI).sqrt());
    x.mul_scalar(0.5) * inner.tanh().add_scalar(1.0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub type TestBackend = burn::backend::NdArray;

    pub fn tiny_config() -> Gpt2Config {
        Gpt2Config::new(8, 16, 8, 2, 1).with_dropout(0.0)
    }

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let ids    = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 3].as_slice(), &device);
        let embeds = model.embed_tokens(ids).unsqueeze::<3>();
        assert_eq!(model.forward_embeds(embeds).dims(), [1, 3, 8]);
    }

    #[test]
    fn test_earlier_positions_ignore_later_tokens() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);

        let run = |ids: &[i32]| {
            let ids = Tensor::<TestBackend, 1, Int>::from_ints(ids, &device);
            model.forward_embeds(model.embed_tokens(ids).unsqueeze::<3>())
        };
        let a = run(&[1, 2, 3, 4]).slice([0..1, 0..2, 0..8]);
        let b = run(&[1, 2, 7, 0]).slice([0..1, 0..2, 0..8]);

        for (x, y) in to_vec(a).into_iter().zip(to_vec(b)) {
            assert!((x - y).abs() < 1e-5, "{x} != {y}");
        }
    }

    #[test]
    fn test_random_init_layout() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let block  = &model.blocks[0];

        assert_eq!(block.c_attn.weight.val().dims(), [8, 24]);
        assert_eq!(block.mlp_proj.weight.val().dims(), [32, 8]);
        assert!(block.c_fc.bias.is_some());
        assert_eq!(to_vec(model.ln_f.gamma.val()), vec![1.0; 8]);
        assert_eq!(to_vec(model.ln_f.beta.as_ref().unwrap().val()), vec![0.0; 8]);
    }

    #[test]
    fn test_gelu_new_reference_values() {
        let device = Default::default();
        let x   = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.0, 1.0].as_slice(), &device);
        let out = to_vec(gelu_new(x));
        assert!((out[0] + 0.1588).abs() < 1e-3);
        assert!(out[1].abs() < 1e-6);
        assert!((out[2] - 0.8412).abs() < 1e-3);
    }
}
