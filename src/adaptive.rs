//! Adaptive (top-k) threshold selection (C3): chooses per-round cutoffs so
//! that roughly `1/p` of positive and negative entries survive, then
//! delegates the actual sparse encode/decode to [`crate::threshold`].

use crate::constants::ADAPTIVE_SAMPLE_SIZE;
use crate::errors::{GradCompError, GradCompResult};
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::sampling::SampleSource;
use crate::threshold::{self, ThreshStream};

/// Collects the magnitudes of entries split by sign, sampling with
/// replacement down to [`ADAPTIVE_SAMPLE_SIZE`] when the candidate pool is
/// larger. Negative magnitudes are stored with sign flipped so both pools
/// can be partitioned the same way.
fn collect_magnitudes(
  values: impl Iterator<Item = f32>,
  count: usize,
  mut sampler: Option<&mut dyn SampleSource>,
) -> (Vec<f32>, Vec<f32>) {
  let mut pos = Vec::new();
  let mut neg = Vec::new();

  match sampler.as_deref_mut() {
    Some(sampler) if count > ADAPTIVE_SAMPLE_SIZE => {
      let snapshot: Vec<f32> = values.collect();
      for _ in 0..ADAPTIVE_SAMPLE_SIZE {
        let idx = sampler.next_index(snapshot.len());
        push_signed(snapshot[idx], &mut pos, &mut neg);
      }
    }
    _ => {
      for v in values {
        push_signed(v, &mut pos, &mut neg);
      }
    }
  }
  (pos, neg)
}

fn push_signed(v: f32, pos: &mut Vec<f32>, neg: &mut Vec<f32>) {
  if v >= 0.0 {
    pos.push(v);
  } else {
    neg.push(-v);
  }
}

/// Partitions `magnitudes` so the top `keep` values are in the upper
/// partition, returning `(pivot, mean_of_upper_partition)`. `keep` is
/// forced to at least 1 so at least one entry survives per sign even when
/// `proportion` exceeds the pool size.
fn threshold_and_average(mut magnitudes: Vec<f32>, proportion: usize) -> (f32, f32) {
  if magnitudes.is_empty() {
    return (0.0, 0.0);
  }
  let keep = (magnitudes.len() / proportion).max(1).min(magnitudes.len());
  let split_at = magnitudes.len() - keep;
  let (_, pivot, upper) = magnitudes.select_nth_unstable_by(split_at, |a, b| a.total_cmp(b));
  let sum: f32 = upper.iter().sum::<f32>() + *pivot;
  (*pivot, sum / keep as f32)
}

/// Computes `(pos_thresh, neg_thresh, pos_avg, neg_avg)` over the whole
/// matrix so that approximately `1/proportion` of positive and negative
/// entries survive.
pub fn proportion_threshold_average(
  src: MatrixView,
  residual: &[f32],
  proportion: usize,
  sampler: Option<&mut dyn SampleSource>,
) -> GradCompResult<(f32, f32, f32, f32)> {
  if proportion == 0 {
    return Err(GradCompError::invalid_argument(
      "proportion must be at least 1",
    ));
  }
  let count = src.len();
  let values = (0..src.width()).flat_map(move |col| {
    (0..src.height()).map(move |row| src.get(row, col) + residual[src.flat_index(row, col)])
  });
  let (pos, neg) = collect_magnitudes(values, count, sampler);
  let (pos_thresh, pos_avg) = threshold_and_average(pos, proportion);
  let (neg_thresh, neg_avg) = threshold_and_average(neg, proportion);
  Ok((pos_thresh, -neg_thresh, pos_avg, -neg_avg))
}

/// Like [`proportion_threshold_average`], but restricted to a caller-
/// supplied list of flattened positions — used during all-gather to
/// compute adaptive averages over just the positions a reduce-scatter
/// step already emitted. Duplicate positions are sampled as a multiset,
/// matching the position-restricted variant's original semantics.
pub fn proportion_threshold_average_pos(
  src: MatrixView,
  residual: &[f32],
  proportion: usize,
  positions: &[u32],
  sampler: Option<&mut dyn SampleSource>,
) -> GradCompResult<(f32, f32, f32, f32)> {
  if proportion == 0 {
    return Err(GradCompError::invalid_argument(
      "proportion must be at least 1",
    ));
  }
  let values = positions.iter().map(|&pos| {
    let flat = pos as usize;
    src.get(flat % src.height(), flat / src.height()) + residual[flat]
  });
  let (pos, neg) = collect_magnitudes(values, positions.len(), sampler);
  let (pos_thresh, pos_avg) = threshold_and_average(pos, proportion);
  let (neg_thresh, neg_avg) = threshold_and_average(neg, proportion);
  Ok((pos_thresh, -neg_thresh, pos_avg, -neg_avg))
}

/// Selects adaptive thresholds, then quantizes with them, prepending the
/// reconstruction averages (bit-reinterpreted) to the returned stream.
pub fn quantize(
  src: MatrixView,
  residual: &mut [f32],
  proportion: usize,
  delta: bool,
  sampler: Option<&mut dyn SampleSource>,
) -> GradCompResult<ThreshStream> {
  let (pos_thresh, neg_thresh, pos_avg, neg_avg) =
    proportion_threshold_average(src, residual, proportion, sampler)?;
  let mut stream = vec![pos_avg.to_bits(), neg_avg.to_bits()];
  stream.extend(threshold::quantize(
    src, residual, pos_thresh, neg_thresh, delta, pos_avg, neg_avg,
  ));
  Ok(stream)
}

/// Position-restricted counterpart of [`quantize`], used to re-encode a
/// peer's already-reduced slice during all-gather.
pub fn quantize_apply(
  src: MatrixView,
  residual: &mut [f32],
  proportion: usize,
  positions: &[u32],
  delta: bool,
  sampler: Option<&mut dyn SampleSource>,
) -> GradCompResult<ThreshStream> {
  let (pos_thresh, neg_thresh, pos_avg, neg_avg) =
    proportion_threshold_average_pos(src, residual, proportion, positions, sampler)?;
  let mut stream = vec![pos_avg.to_bits(), neg_avg.to_bits()];
  stream.extend(threshold::quantize_apply(
    src, residual, pos_thresh, neg_thresh, positions, delta, pos_avg, neg_avg,
  ));
  Ok(stream)
}

/// Reads the prefixed averages, then decodes the remaining positions.
pub fn unquantize(stream: &ThreshStream, dst: &mut MatrixViewMut, delta: bool) {
  let pos_avg = f32::from_bits(stream[0]);
  let neg_avg = f32::from_bits(stream[1]);
  let rest = stream[2..].to_vec();
  threshold::unquantize(&rest, dst, pos_avg, neg_avg, delta);
}

/// `_apply` counterpart of [`unquantize`]: accumulates into `dst` and
/// records visited positions.
pub fn unquantize_apply(
  stream: &ThreshStream,
  dst: &mut MatrixViewMut,
  delta: bool,
  positions: &mut Vec<u32>,
) {
  let pos_avg = f32::from_bits(stream[0]);
  let neg_avg = f32::from_bits(stream[1]);
  let rest = stream[2..].to_vec();
  threshold::unquantize_apply(&rest, dst, pos_avg, neg_avg, delta, positions);
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};
  use std::collections::HashSet;

  #[test]
  fn test_retains_approximately_one_over_p_per_sign() {
    let mut rng = StdRng::seed_from_u64(3);
    let data: Vec<f32> = (0..10_000).map(|_| rng.sample(rand::distributions::Standard)).collect();
    // Convert to roughly N(0,1) via a crude Box-Muller-free transform: use
    // the uniform samples directly shifted, which is good enough to
    // exercise both signs without pulling in a normal distribution dep.
    let data: Vec<f32> = data.iter().map(|&u| u * 2.0 - 1.0).collect();
    let src = MatrixView::contiguous(&data, 100, 100).unwrap();
    let mut residual = vec![0.0f32; 10_000];

    let stream = quantize(src, &mut residual, 10, false, None).unwrap();
    let n_entries = stream.len() - 2;

    let mut pos_count = 0usize;
    let mut neg_count = 0usize;
    for &w in &stream[2..] {
      if (w & 1) == 1 {
        pos_count += 1;
      } else {
        neg_count += 1;
      }
    }
    assert_eq!(pos_count + neg_count, n_entries);
    // Roughly 1/10 per sign out of ~5000 entries each; allow generous
    // slack since this is a statistical property, not an exact one.
    assert!(pos_count >= 300 && pos_count <= 700, "pos_count={}", pos_count);
    assert!(neg_count >= 300 && neg_count <= 700, "neg_count={}", neg_count);
  }

  #[test]
  fn test_decoded_positions_have_two_distinct_values() {
    let mut rng = StdRng::seed_from_u64(4);
    let data: Vec<f32> = (0..400).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let src = MatrixView::contiguous(&data, 20, 20).unwrap();
    let mut residual = vec![0.0f32; 400];
    let stream = quantize(src, &mut residual, 5, false, None).unwrap();

    let mut dst_data = vec![0.0f32; 400];
    {
      let mut dst = MatrixViewMut::contiguous(&mut dst_data, 20, 20).unwrap();
      unquantize(&stream, &mut dst, false);
    }
    let distinct: HashSet<_> = dst_data
      .iter()
      .filter(|&&v| v != 0.0)
      .map(|&v| v.to_bits())
      .collect();
    assert!(distinct.len() <= 2);
  }

  #[test]
  fn test_keep_forced_to_one_when_pool_smaller_than_proportion() {
    let data = vec![0.9f32, -0.9, 0.1];
    let src = MatrixView::contiguous(&data, 3, 1).unwrap();
    let mut residual = vec![0.0f32; 3];
    let stream = quantize(src, &mut residual, 100, false, None).unwrap();
    // With only 2 positive and 1 negative candidate, proportion=100 should
    // still keep exactly one of each available sign.
    let signs: Vec<bool> = stream[2..].iter().map(|&w| (w & 1) == 1).collect();
    assert!(signs.contains(&true) || signs.contains(&false));
  }
}
