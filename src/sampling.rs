use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// A source of uniform random indices, injectable so that tests (and
/// reproducible training runs) can pin exactly which rows or entries get
/// sampled when approximating per-column averages (C1) or adaptive
/// thresholds (C3).
///
/// The core never seeds one of these itself from OS entropy: seed
/// management is the caller's responsibility, per the "process-local
/// with deterministic seed management provided by the caller" resource
/// model.
pub trait SampleSource {
  /// Returns a uniformly distributed index in `0..bound`. `bound` is
  /// always greater than zero.
  fn next_index(&mut self, bound: usize) -> usize;
}

/// The default `SampleSource`, backed by a seeded `Xoroshiro128PlusPlus`
/// generator.
pub struct Xoshiro {
  rng: Xoroshiro128PlusPlus,
}

impl Xoshiro {
  pub fn seed_from_u64(seed: u64) -> Self {
    Self {
      rng: Xoroshiro128PlusPlus::seed_from_u64(seed),
    }
  }
}

impl SampleSource for Xoshiro {
  fn next_index(&mut self, bound: usize) -> usize {
    (self.rng.next_u64() % (bound as u64)) as usize
  }
}
