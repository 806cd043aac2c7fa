use crate::errors::{GradCompError, GradCompResult};

/// A borrowed, read-only view of a dense, column-major `f32` matrix.
///
/// `stride` is the leading dimension: the distance in elements between the
/// start of one column and the next, which may exceed `height` when the
/// view is a slice of a larger allocation.
#[derive(Clone, Copy, Debug)]
pub struct MatrixView<'a> {
  data: &'a [f32],
  height: usize,
  width: usize,
  stride: usize,
}

impl<'a> MatrixView<'a> {
  pub fn new(data: &'a [f32], height: usize, width: usize, stride: usize) -> GradCompResult<Self> {
    check_bounds(data.len(), height, width, stride)?;
    Ok(Self {
      data,
      height,
      width,
      stride,
    })
  }

  /// Convenience constructor for a view with `stride == height`.
  pub fn contiguous(data: &'a [f32], height: usize, width: usize) -> GradCompResult<Self> {
    Self::new(data, height, width, height)
  }

  #[inline]
  pub fn height(&self) -> usize {
    self.height
  }

  #[inline]
  pub fn width(&self) -> usize {
    self.width
  }

  #[inline]
  pub fn stride(&self) -> usize {
    self.stride
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.height * self.width
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> f32 {
    self.data[row + col * self.stride]
  }

  /// Flattened column-major index of `(row, col)`, ignoring stride padding.
  /// This is the index space used by threshold-encoded positions.
  #[inline]
  pub fn flat_index(&self, row: usize, col: usize) -> usize {
    row + col * self.height
  }

  pub fn column(&self, col: usize) -> &'a [f32] {
    let start = col * self.stride;
    &self.data[start..start + self.height]
  }

  /// A view of the sub-matrix spanning rows `[start, start + len)`, used
  /// by the ring collectives to address one row-wise slice of a larger
  /// matrix without copying.
  pub fn row_range(&self, start: usize, len: usize) -> MatrixView<'a> {
    let data = self.data;
    let end = row_range_end(start, len, self.width, self.stride);
    MatrixView {
      data: &data[start..end],
      height: len,
      width: self.width,
      stride: self.stride,
    }
  }
}

fn row_range_end(start: usize, len: usize, width: usize, stride: usize) -> usize {
  if width == 0 {
    start
  } else {
    start + (width - 1) * stride + len
  }
}

/// A borrowed, mutable view of a dense, column-major `f32` matrix.
#[derive(Debug)]
pub struct MatrixViewMut<'a> {
  data: &'a mut [f32],
  height: usize,
  width: usize,
  stride: usize,
}

impl<'a> MatrixViewMut<'a> {
  pub fn new(
    data: &'a mut [f32],
    height: usize,
    width: usize,
    stride: usize,
  ) -> GradCompResult<Self> {
    check_bounds(data.len(), height, width, stride)?;
    Ok(Self {
      data,
      height,
      width,
      stride,
    })
  }

  pub fn contiguous(data: &'a mut [f32], height: usize, width: usize) -> GradCompResult<Self> {
    Self::new(data, height, width, height)
  }

  #[inline]
  pub fn height(&self) -> usize {
    self.height
  }

  #[inline]
  pub fn width(&self) -> usize {
    self.width
  }

  #[inline]
  pub fn stride(&self) -> usize {
    self.stride
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.height * self.width
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> f32 {
    self.data[row + col * self.stride]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, val: f32) {
    self.data[row + col * self.stride] = val;
  }

  #[inline]
  pub fn add(&mut self, row: usize, col: usize, val: f32) {
    self.data[row + col * self.stride] += val;
  }

  #[inline]
  pub fn flat_index(&self, row: usize, col: usize) -> usize {
    row + col * self.height
  }

  pub fn as_view(&self) -> MatrixView<'_> {
    MatrixView {
      data: self.data,
      height: self.height,
      width: self.width,
      stride: self.stride,
    }
  }

  /// Mutable view of the sub-matrix spanning rows `[start, start + len)`,
  /// reborrowed from `self` rather than tied to the original `'a` — the
  /// ring engine only needs it to live for the current step.
  pub fn row_range_mut(&mut self, start: usize, len: usize) -> MatrixViewMut<'_> {
    let end = row_range_end(start, len, self.width, self.stride);
    MatrixViewMut {
      data: &mut self.data[start..end],
      height: len,
      width: self.width,
      stride: self.stride,
    }
  }
}

fn check_bounds(
  data_len: usize,
  height: usize,
  width: usize,
  stride: usize,
) -> GradCompResult<()> {
  if stride < height {
    return Err(GradCompError::shape_mismatch(format!(
      "stride {} is smaller than height {}",
      stride, height
    )));
  }
  if width > 0 {
    let required = (width - 1) * stride + height;
    if data_len < required {
      return Err(GradCompError::shape_mismatch(format!(
        "buffer of length {} cannot hold a {}x{} matrix with stride {}",
        data_len, height, width, stride
      )));
    }
  }
  Ok(())
}

/// Splits `height` rows into `n_slices` near-equal row ranges, the last
/// absorbing any remainder, as used by the ring collectives to partition a
/// matrix row-wise across peers.
pub fn row_slices(height: usize, n_slices: usize) -> Vec<(usize, usize)> {
  if n_slices == 0 {
    return Vec::new();
  }
  let base = height / n_slices;
  let remainder = height % n_slices;
  let mut slices = Vec::with_capacity(n_slices);
  let mut start = 0;
  for i in 0..n_slices {
    // The extra remainder rows are folded into the last slice so slicing
    // is a pure function of height and slice count, not a running total
    // the caller must track.
    let len = if i + 1 == n_slices {
      height - start
    } else {
      base
    };
    let _ = remainder;
    slices.push((start, len));
    start += len;
  }
  slices
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_contiguous_view_roundtrip() {
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let view = MatrixView::contiguous(&data, 2, 3).unwrap();
    assert_eq!(view.get(0, 0), 1.0);
    assert_eq!(view.get(1, 2), 6.0);
    assert_eq!(view.flat_index(1, 2), 5);
  }

  #[test]
  fn test_strided_view_skips_padding() {
    let data = vec![1.0, 2.0, 9.0, 3.0, 4.0, 9.0];
    let view = MatrixView::new(&data, 2, 2, 3).unwrap();
    assert_eq!(view.get(0, 1), 3.0);
    assert_eq!(view.get(1, 1), 4.0);
  }

  #[test]
  fn test_shape_mismatch_rejected() {
    let data = vec![0.0; 3];
    assert!(MatrixView::contiguous(&data, 2, 2).is_err());
  }

  #[test]
  fn test_row_range_addresses_correct_sub_matrix() {
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    let view = MatrixView::contiguous(&data, 3, 3).unwrap();
    let sub = view.row_range(1, 2);
    assert_eq!(sub.height(), 2);
    assert_eq!(sub.width(), 3);
    assert_eq!(sub.get(0, 0), 2.0);
    assert_eq!(sub.get(1, 2), 9.0);
  }

  #[test]
  fn test_row_range_mut_writes_back_to_original() {
    let mut data = vec![0.0f32; 9];
    {
      let mut view = MatrixViewMut::contiguous(&mut data, 3, 3).unwrap();
      let mut sub = view.row_range_mut(1, 2);
      sub.set(0, 0, 42.0);
    }
    assert_eq!(data[1], 42.0);
  }

  #[test]
  fn test_row_slices_absorbs_remainder() {
    assert_eq!(row_slices(10, 3), vec![(0, 3), (3, 3), (6, 4)]);
    assert_eq!(row_slices(6, 3), vec![(0, 2), (2, 2), (4, 2)]);
    assert_eq!(row_slices(0, 3), vec![(0, 0), (0, 0), (0, 0)]);
  }
}
