//! Sparse threshold quantization (C2): entries whose magnitude exceeds a
//! cutoff are transmitted as `(position, sign)` pairs; everything else
//! contributes only to the residual.

use crate::matrix::{MatrixView, MatrixViewMut};

/// An ordered sequence of threshold-encoded words. Each word's low bit is
/// the sign (`1` = positive, `0` = negative); the remaining 31 bits are
/// either an absolute column-major position or, in delta mode, the gap
/// from the previously emitted position.
pub type ThreshStream = Vec<u32>;

fn encode_position(pos: u32, prev_pos: &mut u32, delta: bool, sign: bool) -> u32 {
  let encoded_pos = if delta {
    let gap = pos - *prev_pos;
    *prev_pos = pos;
    gap
  } else {
    pos
  };
  (encoded_pos << 1) | (sign as u32)
}

fn decode_position(word: u32, prev_pos: &mut u32, delta: bool) -> (u32, bool) {
  let sign = (word & 1) == 1;
  let encoded_pos = word >> 1;
  let pos = if delta {
    let absolute = *prev_pos + encoded_pos;
    *prev_pos = absolute;
    absolute
  } else {
    encoded_pos
  };
  (pos, sign)
}

/// Substitutes the threshold itself as the reconstruction average when the
/// caller passes `0.0`, matching the degraded-but-valid decoder the
/// original scheme falls back to.
fn resolved_avg(avg: f32, thresh: f32) -> f32 {
  if avg == 0.0 {
    thresh
  } else {
    avg
  }
}

/// Sweeps `src` column-major; emits an encoded word for every entry whose
/// `src[p] + residual[p]` is at or beyond a threshold, and updates the
/// residual for every entry (emitted or not) to the feedback discipline in
/// the data model.
pub fn quantize(
  src: MatrixView,
  residual: &mut [f32],
  pos_thresh: f32,
  neg_thresh: f32,
  delta: bool,
  pos_avg: f32,
  neg_avg: f32,
) -> ThreshStream {
  let pos_avg = resolved_avg(pos_avg, pos_thresh);
  let neg_avg = resolved_avg(neg_avg, neg_thresh);

  let mut stream = ThreshStream::new();
  let mut prev_pos = 0u32;
  for col in 0..src.width() {
    for row in 0..src.height() {
      let flat = src.flat_index(row, col);
      let v = src.get(row, col) + residual[flat];
      if v >= pos_thresh {
        residual[flat] = v - pos_avg;
        stream.push(encode_position(flat as u32, &mut prev_pos, delta, true));
      } else if v <= neg_thresh {
        residual[flat] = v - neg_avg;
        stream.push(encode_position(flat as u32, &mut prev_pos, delta, false));
      } else {
        residual[flat] = v;
      }
    }
  }
  stream
}

/// Quantizes only at the given positions (assumed, in delta mode, to have
/// already been sorted ascending by the caller so gaps stay nonnegative)
/// — used during all-gather re-encoding of entries a peer already knows
/// were emitted during reduce-scatter.
pub fn quantize_apply(
  src: MatrixView,
  residual: &mut [f32],
  pos_thresh: f32,
  neg_thresh: f32,
  positions: &[u32],
  delta: bool,
  pos_avg: f32,
  neg_avg: f32,
) -> ThreshStream {
  let pos_avg = resolved_avg(pos_avg, pos_thresh);
  let neg_avg = resolved_avg(neg_avg, neg_thresh);

  let mut sorted_positions;
  let positions = if delta {
    sorted_positions = positions.to_vec();
    sorted_positions.sort_unstable();
    &sorted_positions[..]
  } else {
    positions
  };

  let mut stream = ThreshStream::new();
  let mut prev_pos = 0u32;
  for &pos in positions {
    let flat = pos as usize;
    let v = src.get(flat % src.height(), flat / src.height()) + residual[flat];
    if v >= pos_thresh {
      // Non-delta mode folds the emitted entry's loss back into the
      // residual here; delta mode intentionally leaves it untouched,
      // matching the source this scheme is ported from.
      if !delta {
        residual[flat] = v - pos_avg;
      }
      stream.push(encode_position(pos, &mut prev_pos, delta, true));
    } else if v <= neg_thresh {
      if !delta {
        residual[flat] = v - neg_avg;
      }
      stream.push(encode_position(pos, &mut prev_pos, delta, false));
    } else {
      residual[flat] = v;
    }
  }
  stream
}

/// Writes `pos_avg`/`neg_avg` at every decoded position, overwriting
/// `dst`.
pub fn unquantize(stream: &ThreshStream, dst: &mut MatrixViewMut, pos_avg: f32, neg_avg: f32, delta: bool) {
  let mut prev_pos = 0u32;
  for &word in stream {
    let (pos, sign) = decode_position(word, &mut prev_pos, delta);
    let (row, col) = flat_to_rc(dst, pos);
    dst.set(row, col, if sign { pos_avg } else { neg_avg });
  }
}

/// Like [`unquantize`], but adds to `dst` instead of overwriting it, and
/// appends every visited position to `positions` (duplicates included, so
/// a caller revisiting the same position across phases gets idempotent
/// accumulation-by-replacement semantics on the decode side).
pub fn unquantize_apply(
  stream: &ThreshStream,
  dst: &mut MatrixViewMut,
  pos_avg: f32,
  neg_avg: f32,
  delta: bool,
  positions: &mut Vec<u32>,
) {
  let mut prev_pos = 0u32;
  for &word in stream {
    let (pos, sign) = decode_position(word, &mut prev_pos, delta);
    positions.push(pos);
    let (row, col) = flat_to_rc(dst, pos);
    dst.add(row, col, if sign { pos_avg } else { neg_avg });
  }
}

fn flat_to_rc(dst: &MatrixViewMut, flat: u32) -> (usize, usize) {
  let height = dst.height();
  (flat as usize % height, flat as usize / height)
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  #[test]
  fn test_random_entries_above_threshold() {
    let mut rng = StdRng::seed_from_u64(1);
    let data: Vec<f32> = (0..100).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let src = MatrixView::contiguous(&data, 100, 1).unwrap();
    let mut residual = vec![0.0f32; 100];

    let expected_positions: Vec<u32> = data
      .iter()
      .enumerate()
      .filter(|(_, &v)| v.abs() >= 0.5)
      .map(|(i, _)| i as u32)
      .collect();

    let stream = quantize(src, &mut residual, 0.5, -0.5, false, 0.5, -0.5);
    assert_eq!(stream.len(), expected_positions.len());

    let decoded_positions: Vec<u32> = stream.iter().map(|&w| w >> 1).collect();
    assert_eq!(decoded_positions, expected_positions);
  }

  #[test]
  fn test_delta_matches_absolute_positions() {
    let mut rng = StdRng::seed_from_u64(2);
    let data: Vec<f32> = (0..200).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let src = MatrixView::contiguous(&data, 200, 1).unwrap();

    let mut residual_abs = vec![0.0f32; 200];
    let abs_stream = quantize(src, &mut residual_abs, 0.6, -0.6, false, 0.6, -0.6);

    let mut residual_delta = vec![0.0f32; 200];
    let delta_stream = quantize(src, &mut residual_delta, 0.6, -0.6, true, 0.6, -0.6);

    let mut prev = 0u32;
    let redecoded: Vec<(u32, bool)> = delta_stream
      .iter()
      .map(|&w| decode_position(w, &mut prev, true))
      .collect();
    let expected: Vec<(u32, bool)> = abs_stream.iter().map(|&w| (w >> 1, (w & 1) == 1)).collect();
    assert_eq!(redecoded, expected);
  }

  #[test]
  fn test_default_avg_falls_back_to_threshold() {
    let data = vec![1.0f32, -1.0];
    let src = MatrixView::contiguous(&data, 2, 1).unwrap();
    let mut residual = vec![0.0f32; 2];
    let stream = quantize(src, &mut residual, 0.5, -0.5, false, 0.0, 0.0);
    let mut dst_data = vec![0.0f32; 2];
    {
      let mut dst = MatrixViewMut::contiguous(&mut dst_data, 2, 1).unwrap();
      unquantize(&stream, &mut dst, 0.5, -0.5, false);
    }
    assert_eq!(dst_data, vec![0.5, -0.5]);
  }

  #[test]
  fn test_empty_stream_when_nothing_exceeds() {
    let data = vec![0.1f32, -0.1, 0.2, -0.2];
    let src = MatrixView::contiguous(&data, 4, 1).unwrap();
    let mut residual = vec![0.0f32; 4];
    let stream = quantize(src, &mut residual, 0.5, -0.5, false, 0.5, -0.5);
    assert!(stream.is_empty());
    assert_eq!(residual, data);
  }

  #[test]
  fn test_below_threshold_accumulates_in_residual() {
    let data = vec![0.3f32];
    let src = MatrixView::contiguous(&data, 1, 1).unwrap();
    let mut residual = vec![0.2f32];
    let stream = quantize(src, &mut residual, 0.9, -0.9, false, 0.9, -0.9);
    assert!(stream.is_empty());
    assert!((residual[0] - 0.5).abs() < 1e-6);
  }
}
