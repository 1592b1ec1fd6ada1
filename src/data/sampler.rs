// ============================================================
// Layer 4: Fraction Sampler
// ============================================================
// The CNN/DailyMail splits are large, so each run trains on a
// random fraction of the rows.
//
//   rows = 287_113, fraction = 0.001 → 287 rows
//
// round(fraction * rows) rows are drawn without replacement and
// returned in shuffled order. A tiny dataset may yield zero rows;
// that is not an error here, consumers decide what an empty
// split means.
//
// Every split draws from its own seeded stream, so the test subset
// depends only on the seed and the test file.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
    Test,
}

/// The RNG that samples `split` for a run seeded with `seed`.
pub fn split_rng(seed: u64, split: Split) -> StdRng {
    let stream: u64 = match split {
        Split::Train      => 0,
        Split::Validation => 1,
        Split::Test       => 2,
    };
    StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Draw `round(fraction * len)` items without replacement.
pub fn sample_fraction<T, R: Rng + ?Sized>(mut items: Vec<T>, fraction: f64, rng: &mut R) -> Vec<T> {
    let total = items.len();
    let take  = ((total as f64) * fraction).round().max(0.0) as usize;
    let take  = take.min(total);

    items.shuffle(rng);
    items.truncate(take);

    tracing::debug!("Sampled {} of {} rows (fraction {})", take, total, fraction);
    items
}
