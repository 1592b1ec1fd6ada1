// ============================================================
// Layer 2: InferUseCase
// ============================================================
// Loads a trained checkpoint once and turns raw text into the
// model's argmax pseudo-summary.

use anyhow::Result;
use burn::prelude::*;

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    inferencer::{Inferencer, Prediction},
    InferBackend,
};

pub struct InferUseCase<B: Backend = InferBackend> {
    inferencer: Inferencer<B>,
}

impl InferUseCase<InferBackend> {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        Self::with_device(checkpoint_dir, burn::backend::wgpu::WgpuDevice::default())
    }
}

impl<B: Backend> InferUseCase<B> {
    pub fn with_device(checkpoint_dir: &str, device: B::Device) -> Result<Self> {
        let ckpt       = CheckpointManager::open(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt, device)?;
        Ok(Self { inferencer })
    }

    pub fn predict(&self, text: &str) -> Result<Prediction> {
        self.inferencer.predict(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{tests::tiny_run, TrainUseCase};
    use crate::ml::gpt2::tests::TestBackend;

    type TestAutodiffBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    #[test]
    fn test_reloaded_checkpoint_gives_identical_output() {
        let dir = tempfile::tempdir().unwrap();
        let run = tiny_run(dir.path());
        TrainUseCase::new(run.clone()).run::<TestAutodiffBackend>(&Default::default()).unwrap();

        let first  = InferUseCase::<TestBackend>::with_device(&run.checkpoint_dir, Default::default()).unwrap();
        let second = InferUseCase::<TestBackend>::with_device(&run.checkpoint_dir, Default::default()).unwrap();
        let a = first.predict("A B C D").unwrap();
        let b = second.predict("A B C D").unwrap();

        // 2 prompt tokens + 4 words
        assert_eq!(a.logits_shape, [6, 8]);
        assert_eq!(a.token_ids, b.token_ids);
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none").to_string_lossy().into_owned();
        assert!(InferUseCase::<TestBackend>::with_device(&missing, Default::default()).is_err());
    }
}
