//! Uniform random selection
//!
//! Single entry point for every random choice the arbiter makes (which
//! voter becomes the advocate, which extreme they defend). Backed by
//! `rand::thread_rng`, an OS-seeded ChaCha CSPRNG that periodically
//! reseeds itself; `gen_range` rejection-samples so the result is uniform
//! over `0..n`. Determinism is not required, only uniformity.

use rand::Rng;

/// Pick a uniformly random index in `0..n`.
///
/// # Panics
///
/// Panics if `n` is zero; callers must check for an empty pool first.
pub fn uniform_random_index(n: usize) -> usize {
    assert!(n > 0, "uniform_random_index called with an empty pool");
    rand::thread_rng().gen_range(0..n)
}

/// Fair coin flip.
pub fn coin_flip() -> bool {
    uniform_random_index(2) == 0
}
