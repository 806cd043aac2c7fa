//! One-bit per-column quantization (C1): each column is reconstructed from
//! just two reconstruction levels, a positive and a negative average, with
//! one sign bit transmitted per entry.

use crate::constants::{ONEBIT_AVG_ROWS, ONEBIT_SAMPLE_SIZE, WORD_BITS};
use crate::errors::{GradCompError, GradCompResult};
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::sampling::SampleSource;

/// A one-bit quantized matrix: column-major `u32` words. Row 0 holds the
/// positive column average, row 1 the negative column average (both
/// bit-reinterpreted `f32`), and each subsequent row packs 32 sign bits.
#[derive(Clone, Debug)]
pub struct QuantizedMatrix {
  words: Vec<u32>,
  height: usize,
  width: usize,
}

impl QuantizedMatrix {
  fn new(height: usize, width: usize) -> Self {
    Self {
      words: vec![0; height * width],
      height,
      width,
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  #[inline]
  fn get(&self, row: usize, col: usize) -> u32 {
    self.words[row + col * self.height]
  }

  #[inline]
  fn set(&mut self, row: usize, col: usize, val: u32) {
    self.words[row + col * self.height] = val;
  }

  pub fn pos_avg(&self, col: usize) -> f32 {
    f32::from_bits(self.get(0, col))
  }

  pub fn neg_avg(&self, col: usize) -> f32 {
    f32::from_bits(self.get(1, col))
  }

  /// Borrows the encoded words, for handing to a ring transport.
  pub fn words(&self) -> &[u32] {
    &self.words
  }

  /// Reconstructs a `QuantizedMatrix` from received words of a known
  /// shape.
  pub fn from_words(words: Vec<u32>, height: usize, width: usize) -> GradCompResult<Self> {
    if words.len() != height * width {
      return Err(GradCompError::shape_mismatch(format!(
        "expected {} words for a {}x{} quantized matrix, got {}",
        height * width,
        height,
        width,
        words.len()
      )));
    }
    Ok(Self {
      words,
      height,
      width,
    })
  }
}

/// The encoded height of a one-bit quantized matrix for a source of
/// height `src_height`: two average rows plus one row per group of 32
/// source rows.
pub fn quantized_height(src_height: usize) -> usize {
  ONEBIT_AVG_ROWS + src_height.div_ceil(WORD_BITS as usize)
}

/// Quantizes `src` column-by-column, folding `residual` into the
/// pre-quantization value and updating it in place with the new residual.
///
/// When `sampler` is `Some` and a column's height exceeds
/// [`ONEBIT_SAMPLE_SIZE`], the positive/negative averages are estimated
/// from that many uniformly sampled rows (with replacement); every row
/// still receives an exact sign bit and an exact residual update
/// regardless of sampling.
pub fn quantize(
  src: MatrixView,
  residual: &mut [f32],
  mut sampler: Option<&mut dyn SampleSource>,
) -> GradCompResult<QuantizedMatrix> {
  if residual.len() != src.len() {
    return Err(GradCompError::shape_mismatch(format!(
      "residual has {} entries but source matrix has {}",
      residual.len(),
      src.len()
    )));
  }

  let mut out = QuantizedMatrix::new(quantized_height(src.height()), src.width());
  for col in 0..src.width() {
    let col_sampler = sampler.as_mut().map(|s| &mut **s as &mut dyn SampleSource);
    let (pos_avg, neg_avg) = column_averages(src, residual, col, col_sampler);
    out.set(0, col, pos_avg.to_bits());
    out.set(1, col, neg_avg.to_bits());

    let mut qrow = ONEBIT_AVG_ROWS;
    let mut row = 0;
    while row < src.height() {
      let mut word = 0u32;
      let group_end = (row + WORD_BITS as usize).min(src.height());
      for bit in 0..(group_end - row) {
        let r = row + bit;
        let flat = src.flat_index(r, col);
        let v = src.get(r, col) + residual[flat];
        if v >= 0.0 {
          word |= 1 << bit;
          residual[flat] = v - pos_avg;
        } else {
          residual[flat] = v - neg_avg;
        }
      }
      out.set(qrow, col, word);
      qrow += 1;
      row = group_end;
    }
  }
  Ok(out)
}

fn column_averages(
  src: MatrixView,
  residual: &[f32],
  col: usize,
  sampler: Option<&mut dyn SampleSource>,
) -> (f32, f32) {
  let mut pos_sum = 0.0f32;
  let mut neg_sum = 0.0f32;
  let mut pos_count = 0usize;
  let mut neg_count = 0usize;

  let visit = |row: usize, pos_sum: &mut f32, neg_sum: &mut f32, pos_count: &mut usize, neg_count: &mut usize| {
    let flat = src.flat_index(row, col);
    let v = src.get(row, col) + residual[flat];
    if v >= 0.0 {
      *pos_sum += v;
      *pos_count += 1;
    } else {
      *neg_sum += v;
      *neg_count += 1;
    }
  };

  match sampler {
    Some(sampler) if src.height() > ONEBIT_SAMPLE_SIZE => {
      for _ in 0..ONEBIT_SAMPLE_SIZE {
        let row = sampler.next_index(src.height());
        visit(row, &mut pos_sum, &mut neg_sum, &mut pos_count, &mut neg_count);
      }
    }
    _ => {
      for row in 0..src.height() {
        visit(row, &mut pos_sum, &mut neg_sum, &mut pos_count, &mut neg_count);
      }
    }
  }

  let pos_avg = if pos_count > 0 {
    pos_sum / pos_count as f32
  } else {
    0.0
  };
  let neg_avg = if neg_count > 0 {
    neg_sum / neg_count as f32
  } else {
    0.0
  };
  (pos_avg, neg_avg)
}

/// Reconstructs `dst` from a one-bit quantized matrix. When `apply` is
/// true, reconstructed values are added to `dst` rather than overwriting
/// it (used to accumulate a received slice into a running sum).
pub fn unquantize(qmat: &QuantizedMatrix, mut dst: MatrixViewMut, apply: bool) -> GradCompResult<()> {
  if qmat.width() != dst.width() {
    return Err(GradCompError::shape_mismatch(format!(
      "quantized matrix has width {} but destination has width {}",
      qmat.width(),
      dst.width()
    )));
  }
  if qmat.height() != quantized_height(dst.height()) {
    return Err(GradCompError::shape_mismatch(format!(
      "quantized matrix has height {} but destination of height {} expects {}",
      qmat.height(),
      dst.height(),
      quantized_height(dst.height())
    )));
  }

  for col in 0..dst.width() {
    let pos_avg = qmat.pos_avg(col);
    let neg_avg = qmat.neg_avg(col);
    let mut qrow = ONEBIT_AVG_ROWS;
    let mut row = 0;
    while row < dst.height() {
      let word = qmat.get(qrow, col);
      let group_end = (row + WORD_BITS as usize).min(dst.height());
      for bit in 0..(group_end - row) {
        let r = row + bit;
        let val = if (word >> bit) & 1 == 1 {
          pos_avg
        } else {
          neg_avg
        };
        if apply {
          dst.add(r, col, val);
        } else {
          dst.set(r, col, val);
        }
      }
      qrow += 1;
      row = group_end;
    }
  }
  Ok(())
}
