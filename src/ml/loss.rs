use burn::{prelude::*, tensor::activation::log_softmax};

/// Mean token cross-entropy over the positions whose target is not
/// `ignore_id`. Every ignored position contributes nothing, neither
/// to the sum nor to the count; if all positions are ignored the
/// loss is zero.
///
/// logits: [seq, vocab], targets: [seq] → [1]
pub fn masked_cross_entropy<B: Backend>(
    logits:    Tensor<B, 2>,
    targets:   Tensor<B, 1, Int>,
    ignore_id: u32,
) -> Tensor<B, 1> {
    let [seq, _] = logits.dims();

    let picked = log_softmax(logits, 1)
        .gather(1, targets.clone().reshape([seq, 1]))
        .reshape([seq]);
    let keep = targets.equal_elem(ignore_id as i64).bool_not().float();

    let count = keep.clone().sum().clamp_min(1.0);
    (picked * keep).sum().neg() / count
}
