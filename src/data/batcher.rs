// ============================================================
// Layer 4: Example Batcher
// ============================================================
// Stacks examples into two 2-D Int tensors on the loader's device:
//
//   input_ids: [batch, article_len]   → fed to the model row by row
//   labels:    [batch, summary_len]   → compared with the logits
//
// Every split is encoded with one layout, so rows never need
// padding here. The loaders run with batch size one and no
// shuffling, which keeps the CSV row order.

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::dataset::{SummaryDataset, SummaryExample};

#[derive(Debug, Clone)]
pub struct SummaryBatch<B: Backend> {
    pub input_ids: Tensor<B, 2, Int>,
    pub labels:    Tensor<B, 2, Int>,
    /// The label rows as plain ids, for the overlap metric
    pub targets:   Vec<Vec<u32>>,
}

impl<B: Backend> SummaryBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Row `i` as 1-D `(input_ids, labels)`.
    pub fn row(&self, i: usize) -> (Tensor<B, 1, Int>, Tensor<B, 1, Int>) {
        let pick = |t: &Tensor<B, 2, Int>| {
            let [_, width] = t.dims();
            t.clone().slice([i..i + 1, 0..width]).reshape([width])
        };
        (pick(&self.input_ids), pick(&self.labels))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SummaryBatcher;

impl<B: Backend> Batcher<B, SummaryExample, SummaryBatch<B>> for SummaryBatcher {
    fn batch(&self, items: Vec<SummaryExample>, device: &B::Device) -> SummaryBatch<B> {
        let article_len = items.first().map_or(0, |e| e.article_ids.len());
        let summary_len = items.first().map_or(0, |e| e.summary_ids.len());

        let stack = |rows: Vec<&[u32]>, width: usize| {
            let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().map(|&x| x as i32)).collect();
            Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), width])
        };

        SummaryBatch {
            input_ids: stack(items.iter().map(|e| e.article_ids.as_slice()).collect(), article_len),
            labels:    stack(items.iter().map(|e| e.summary_ids.as_slice()).collect(), summary_len),
            targets:   items.into_iter().map(|e| e.summary_ids).collect(),
        }
    }
}

/// An in-order, one-example-per-batch loader over `dataset`.
pub fn summary_loader<B: Backend>(
    dataset: SummaryDataset,
    device:  &B::Device,
) -> Arc<dyn DataLoader<B, SummaryBatch<B>>> {
    DataLoaderBuilder::<B, SummaryExample, SummaryBatch<B>>::new(SummaryBatcher)
        .batch_size(1)
        .set_device(device.clone())
        .build(dataset)
}

/// Any id sequence (article, summary or prompt) as a 1-D Int tensor
pub fn id_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 1, Int> {
    let flat: Vec<i32> = ids.iter().map(|&x| x as i32).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device)
}
