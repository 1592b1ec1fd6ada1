// ============================================================
// Layer 6: Pretrained GPT-2
// ============================================================
// Resolves a model reference to three files and builds a burn
// decoder from them:
//
//   config.json         → Gpt2Config
//   model.safetensors   → every decoder weight (F32)
//   tokenizer.json      → the matching BPE tokenizer
//
// A reference is either a local directory holding those files or
// a Hugging Face Hub model id ("gpt2"), downloaded into the hub
// cache on first use.
//
// Weight names follow the Hugging Face layout, with or without a
// leading "transformer." segment. Conv1D weights are stored
// [d_in, d_out] there, the same layout as burn's Linear, so nothing
// is transposed.

use anyhow::{bail, ensure, Context, Result};
use burn::{module::Param, nn::Initializer, prelude::*};
use hf_hub::{api::sync::Api, Repo, RepoType};
use safetensors::{tensor::Dtype, SafeTensors};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::infra::tokenizer_store::load_tokenizer;
use crate::ml::gpt2::{Gpt2Config, Gpt2Model, ParamSource};

const CONFIG_FILE:    &str = "config.json";
const WEIGHTS_FILE:   &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct PretrainedFiles {
    pub config:    PathBuf,
    pub weights:   PathBuf,
    pub tokenizer: PathBuf,
}

impl PretrainedFiles {
    /// A local directory wins over a hub id of the same name.
    pub fn resolve(model: &str) -> Result<Self> {
        let dir = Path::new(model);
        if dir.is_dir() {
            tracing::info!("Using local model files from '{}'", dir.display());
            return Self::from_dir(dir);
        }
        Self::fetch(model)
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let files = Self {
            config:    dir.join(CONFIG_FILE),
            weights:   dir.join(WEIGHTS_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
        };
        for path in [&files.config, &files.weights, &files.tokenizer] {
            ensure!(path.is_file(), "Missing pretrained file '{}'", path.display());
        }
        Ok(files)
    }

    fn fetch(model_id: &str) -> Result<Self> {
        tracing::info!("Fetching '{model_id}' from the Hugging Face Hub");
        let api  = Api::new().context("Cannot initialise the Hugging Face Hub client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let get  = |file: &str| {
            repo.get(file)
                .with_context(|| format!("Cannot download '{file}' for model '{model_id}'"))
        };
        Ok(Self {
            config:    get(CONFIG_FILE)?,
            weights:   get(WEIGHTS_FILE)?,
            tokenizer: get(TOKENIZER_FILE)?,
        })
    }
}

/// The subset of a Hugging Face GPT-2 `config.json` the decoder needs.
#[derive(Debug, Clone, Deserialize)]
pub struct HfGpt2Config {
    pub vocab_size:  usize,
    pub n_positions: usize,
    pub n_embd:      usize,
    pub n_head:      usize,
    pub n_layer:     usize,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    #[serde(default = "default_dropout")]
    pub resid_pdrop: f64,
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

fn default_dropout() -> f64 {
    0.1
}

impl HfGpt2Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read model config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a GPT-2 config", path.display()))
    }
}

impl From<HfGpt2Config> for Gpt2Config {
    fn from(hf: HfGpt2Config) -> Self {
        Gpt2Config::new(hf.vocab_size, hf.n_positions, hf.n_embd, hf.n_head, hf.n_layer)
            .with_layer_norm_epsilon(hf.layer_norm_epsilon)
            .with_dropout(hf.resid_pdrop)
    }
}

/// Decoder parameters read out of a safetensors file.
pub struct SafetensorsSource<'a, B: Backend> {
    tensors: SafeTensors<'a>,
    prefix:  &'static str,
    device:  &'a B::Device,
}

impl<'a, B: Backend> SafetensorsSource<'a, B> {
    pub fn new(bytes: &'a [u8], device: &'a B::Device) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid safetensors data: {e}"))?;
        let prefix = if tensors.names().iter().any(|n| n.starts_with("transformer.")) {
            "transformer."
        } else {
            ""
        };
        Ok(Self { tensors, prefix, device })
    }
}

impl<B: Backend> ParamSource<B> for SafetensorsSource<'_, B> {
    type Error = anyhow::Error;

    fn device(&self) -> &B::Device {
        self.device
    }

    fn param<const D: usize>(
        &mut self,
        name:  &str,
        shape: [usize; D],
        _init: Initializer,
    ) -> Result<Param<Tensor<B, D>>> {
        let key  = format!("{}{name}", self.prefix);
        let view = self
            .tensors
            .tensor(&key)
            .map_err(|e| anyhow::anyhow!("Pretrained tensor '{key}' is unavailable: {e}"))?;

        if view.dtype() != Dtype::F32 {
            bail!("Pretrained tensor '{key}' is {:?}, only F32 is supported", view.dtype());
        }
        ensure!(
            view.shape() == shape.as_slice(),
            "Pretrained tensor '{key}' has shape {:?}, expected {:?}",
            view.shape(),
            shape
        );

        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let tensor = Tensor::<B, D>::from_data(TensorData::new(values, shape), self.device);
        Ok(Param::from_tensor(tensor))
    }
}

/// A pretrained decoder plus its tokenizer, ready to wrap with a prompt.
pub struct Pretrained<B: Backend> {
    pub config:    Gpt2Config,
    pub decoder:   Gpt2Model<B>,
    pub tokenizer: Tokenizer,
}

pub fn load_pretrained<B: Backend>(model: &str, device: &B::Device) -> Result<Pretrained<B>> {
    let files  = PretrainedFiles::resolve(model)?;
    let config = Gpt2Config::from(HfGpt2Config::from_file(&files.config)?);
    tracing::info!(
        "GPT-2 config: {} layers, {} heads, {} dims, {} positions, vocab {}",
        config.n_layer, config.n_head, config.n_embd, config.n_positions, config.vocab_size
    );
    ensure!(
        config.n_head > 0 && config.head_dim() * config.n_head == config.n_embd,
        "'{model}': n_embd {} is not divisible into {} attention heads",
        config.n_embd,
        config.n_head
    );

    let bytes = std::fs::read(&files.weights)
        .with_context(|| format!("Cannot read weights '{}'", files.weights.display()))?;
    let decoder = config.build(&mut SafetensorsSource::<B>::new(&bytes, device)?)?;
    let tokenizer = load_tokenizer(&files.tokenizer)?;

    tracing::info!("Loaded pretrained weights from '{}'", files.weights.display());
    Ok(Pretrained { config, decoder, tokenizer })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infra::tokenizer_store::word_level_tokenizer;
    use crate::ml::gpt2::tests::{tiny_config, TestBackend};
    use safetensors::tensor::TensorView;

    /// A local model directory for `tiny_config()` whose tokenizer
    /// knows exactly `words` (there must be 8 of them).
    pub(crate) fn write_tiny_model_dir(dir: &Path, words: &[&str]) {
        let cfg  = tiny_config();
        let json = serde_json::json!({
            "vocab_size": cfg.vocab_size,
            "n_positions": cfg.n_positions,
            "n_embd": cfg.n_embd,
            "n_head": cfg.n_head,
            "n_layer": cfg.n_layer,
            "resid_pdrop": 0.0,
        });
        std::fs::write(dir.join(CONFIG_FILE), json.to_string()).unwrap();
        std::fs::write(dir.join(WEIGHTS_FILE), serialize(&tensors_for(&cfg, ""))).unwrap();
        word_level_tokenizer(words).save(dir.join(TOKENIZER_FILE), false).unwrap();
    }

    /// Every decoder tensor of `cfg`, filled with a per-tensor constant.
    fn tensors_for(cfg: &Gpt2Config, prefix: &str) -> Vec<(String, Vec<usize>, Vec<u8>)> {
        let d = cfg.n_embd;
        let mut shapes: Vec<(String, Vec<usize>)> = vec![
            ("wte.weight".into(), vec![cfg.vocab_size, d]),
            ("wpe.weight".into(), vec![cfg.n_positions, d]),
            ("ln_f.weight".into(), vec![d]),
            ("ln_f.bias".into(), vec![d]),
        ];
        for i in 0..cfg.n_layer {
            for (suffix, shape) in [
                ("ln_1.weight", vec![d]),
                ("ln_1.bias", vec![d]),
                ("attn.c_attn.weight", vec![d, 3 * d]),
                ("attn.c_attn.bias", vec![3 * d]),
                ("attn.c_proj.weight", vec![d, d]),
                ("attn.c_proj.bias", vec![d]),
                ("ln_2.weight", vec![d]),
                ("ln_2.bias", vec![d]),
                ("mlp.c_fc.weight", vec![d, 4 * d]),
                ("mlp.c_fc.bias", vec![4 * d]),
                ("mlp.c_proj.weight", vec![4 * d, d]),
                ("mlp.c_proj.bias", vec![d]),
            ] {
                shapes.push((format!("h.{i}.{suffix}"), shape));
            }
        }
        shapes
            .into_iter()
            .enumerate()
            .map(|(k, (name, shape))| {
                let n: usize = shape.iter().product();
                let bytes = (0..n).flat_map(|_| (k as f32 * 0.01).to_le_bytes()).collect();
                (format!("{prefix}{name}"), shape, bytes)
            })
            .collect()
    }

    fn serialize(tensors: &[(String, Vec<usize>, Vec<u8>)]) -> Vec<u8> {
        let views: Vec<(&str, TensorView<'_>)> = tensors
            .iter()
            .map(|(name, shape, bytes)| {
                (name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap())
            })
            .collect();
        safetensors::serialize(views, None).unwrap()
    }

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_builds_decoder_from_safetensors() {
        let cfg    = tiny_config();
        let bytes  = serialize(&tensors_for(&cfg, ""));
        let device = Default::default();
        let model  = cfg.build(&mut SafetensorsSource::<TestBackend>::new(&bytes, &device).unwrap()).unwrap();

        assert_eq!(values(model.wte.val()), vec![0.0; 8 * 8]);
        assert_eq!(values(model.wpe.val()), vec![0.01; 16 * 8]);
        assert_eq!(model.blocks[0].c_attn.weight.val().dims(), [8, 24]);
    }

    #[test]
    fn test_transformer_prefix_is_detected() {
        let cfg    = tiny_config();
        let bytes  = serialize(&tensors_for(&cfg, "transformer."));
        let device = Default::default();
        assert!(cfg.build(&mut SafetensorsSource::<TestBackend>::new(&bytes, &device).unwrap()).is_ok());
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let bytes  = serialize(&tensors_for(&tiny_config(), ""));
        let device = Default::default();
        // Same file, but a config expecting a wider model
        let wider  = Gpt2Config::new(8, 16, 16, 2, 1);
        let err    = wider
            .build(&mut SafetensorsSource::<TestBackend>::new(&bytes, &device).unwrap())
            .err()
            .unwrap();
        assert!(err.to_string().contains("wte.weight"));
    }

    #[test]
    fn test_hf_config_conversion() {
        let json = r#"{"vocab_size": 50257, "n_positions": 1024, "n_embd": 768,
                       "n_head": 12, "n_layer": 12, "n_ctx": 1024, "model_type": "gpt2"}"#;
        let hf: HfGpt2Config = serde_json::from_str(json).unwrap();
        let cfg = Gpt2Config::from(hf);
        assert_eq!(cfg.n_positions, 1024);
        assert_eq!(cfg.head_dim(), 64);
        assert_eq!(cfg.layer_norm_epsilon, 1e-5);
    }

    #[test]
    fn test_load_pretrained_from_local_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_model_dir(dir.path(), &["A", "B", "C", "<|endoftext|>", "D", "F", "G", "H"]);

        let device = Default::default();
        let dir_str = dir.path().to_str().unwrap();
        let loaded = load_pretrained::<TestBackend>(dir_str, &device).unwrap();
        assert_eq!(loaded.config.n_embd, 8);
        assert_eq!(loaded.config.dropout, 0.0);
        assert_eq!(loaded.tokenizer.token_to_id("C"), Some(2));
        assert_eq!(loaded.decoder.blocks.len(), 1);
    }

    #[test]
    fn test_indivisible_head_count_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_model_dir(dir.path(), &["A", "B", "C", "<|endoftext|>", "D", "F", "G", "H"]);
        let json = serde_json::json!({
            "vocab_size": 8, "n_positions": 16, "n_embd": 8, "n_head": 3, "n_layer": 1,
        });
        std::fs::write(dir.path().join(CONFIG_FILE), json.to_string()).unwrap();

        let err = load_pretrained::<TestBackend>(dir.path().to_str().unwrap(), &Default::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("attention heads"));
    }

    #[test]
    fn test_local_dir_requires_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        assert!(PretrainedFiles::from_dir(dir.path()).is_err());
    }
}
