//! Wires the quantization schemes into [`CollectiveOps`]/[`AllgatherOps`]
//! implementations, and the `intermodel_sum_quantized` convenience
//! composition that drives a full quantized all-reduce the way the
//! original hard-codes the adaptive-threshold scheme for its ring
//! all-reduce entry point.

use crate::adaptive;
use crate::config::QuantizeConfig;
use crate::constants::ADAGRAD_EPSILON;
use crate::errors::{GradCompError, GradCompResult};
use crate::golomb_rice;
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::onebit::{self, QuantizedMatrix};
use crate::sampling::SampleSource;

use super::ops::{AllgatherOps, CollectiveOps};
use super::ring::{self, RingContext};

/// Per-entry AdaGrad accumulator applied between reduce-scatter and
/// all-gather. Callers must not read the accumulated history as
/// meaningful before [`ring::allgather`] returns, since it is only
/// updated during the all-gather's `reduced_transform` hook.
pub struct AdagradState {
  gradhist: Vec<f32>,
}

impl AdagradState {
  pub fn new(len: usize) -> Self {
    Self {
      gradhist: vec![0.0; len],
    }
  }

  fn rescale(&mut self, flat: usize, x: f32) -> f32 {
    self.gradhist[flat] += x * x;
    x / (self.gradhist[flat].sqrt() + ADAGRAD_EPSILON)
  }
}

/// `CollectiveOps`/`AllgatherOps` driving the one-bit codec (C1) over a
/// ring slice. Error feedback is threaded through the caller-owned
/// `residual` buffer exactly as the standalone codec requires.
pub struct OnebitCollective<'a> {
  residual: &'a mut [f32],
  sampler: Option<&'a mut dyn SampleSource>,
  adagrad: Option<&'a mut AdagradState>,
}

impl<'a> OnebitCollective<'a> {
  pub fn new(
    residual: &'a mut [f32],
    sampler: Option<&'a mut dyn SampleSource>,
    adagrad: Option<&'a mut AdagradState>,
  ) -> Self {
    Self {
      residual,
      sampler,
      adagrad,
    }
  }
}

impl<'a> CollectiveOps for OnebitCollective<'a> {
  fn send_transform(&mut self, slice: MatrixView) -> Vec<u32> {
    let len = slice.len();
    let residual = &mut self.residual[..len];
    let sampler = self.sampler.as_mut().map(|s| &mut **s as &mut dyn SampleSource);
    let qmat = onebit::quantize(slice, residual, sampler)
      .expect("residual length matches slice by construction");
    qmat.words().to_vec()
  }

  fn recv_buffer_len(&mut self, slice: MatrixView, _expected_count: usize) -> usize {
    onebit::quantized_height(slice.height()) * slice.width()
  }

  fn recv_transform(&mut self, buf: &[u32], dst: MatrixViewMut) -> GradCompResult<()> {
    let qmat = QuantizedMatrix::from_words(
      buf.to_vec(),
      onebit::quantized_height(dst.height()),
      dst.width(),
    )?;
    onebit::unquantize(&qmat, dst, true)
  }
}

impl<'a> AllgatherOps for OnebitCollective<'a> {
  fn reduced_transform(&mut self, slice: MatrixView) -> Vec<u32> {
    match self.adagrad.as_deref_mut() {
      Some(adagrad) => {
        let rescaled: Vec<f32> = (0..slice.width())
          .flat_map(|c| (0..slice.height()).map(move |r| (r, c)))
          .map(|(r, c)| adagrad.rescale(slice.flat_index(r, c), slice.get(r, c)))
          .collect();
        let view = MatrixView::contiguous(&rescaled, slice.height(), slice.width()).unwrap();
        self.send_transform(view)
      }
      None => self.send_transform(slice),
    }
  }

  fn recv_broadcast(&mut self, buf: &[u32], dst: MatrixViewMut) -> GradCompResult<()> {
    let qmat = QuantizedMatrix::from_words(
      buf.to_vec(),
      onebit::quantized_height(dst.height()),
      dst.width(),
    )?;
    onebit::unquantize(&qmat, dst, false)
  }
}

/// `CollectiveOps`/`AllgatherOps` driving the adaptive-threshold codec
/// (C3), used by [`intermodel_sum_quantized`]. Two independent residual
/// buffers are threaded through: `residual` for the reduce-scatter phase
/// (encoding this peer's own slice) and `im_residual` for the all-gather
/// phase (re-encoding the slice this peer just finished reducing), since
/// the two phases quantize logically distinct data and must not share
/// error-feedback state. Optionally layers the Golomb-Rice coder (C4)
/// over the threshold stream, and the AdaGrad rescale between phases.
pub struct AdaptiveCollective<'a> {
  residual: &'a mut [f32],
  im_residual: &'a mut [f32],
  sampler: Option<&'a mut dyn SampleSource>,
  adagrad: Option<&'a mut AdagradState>,
  proportion: usize,
  delta: bool,
  compress: bool,
  positions: Vec<u32>,
}

impl<'a> AdaptiveCollective<'a> {
  pub fn new(
    residual: &'a mut [f32],
    im_residual: &'a mut [f32],
    sampler: Option<&'a mut dyn SampleSource>,
    adagrad: Option<&'a mut AdagradState>,
    config: &QuantizeConfig,
  ) -> Self {
    Self {
      residual,
      im_residual,
      sampler,
      adagrad,
      proportion: config.proportion,
      delta: config.delta,
      compress: config.compress,
      positions: Vec::new(),
    }
  }

  fn maybe_compress(&self, stream: Vec<u32>) -> Vec<u32> {
    if self.compress {
      golomb_rice::compress_adaptive(&stream)
    } else {
      stream
    }
  }

  fn maybe_decompress(&self, stream: &[u32]) -> GradCompResult<Vec<u32>> {
    if self.compress {
      golomb_rice::decompress_adaptive(&stream.to_vec())
    } else {
      Ok(stream.to_vec())
    }
  }
}

impl<'a> CollectiveOps for AdaptiveCollective<'a> {
  fn send_transform(&mut self, slice: MatrixView) -> Vec<u32> {
    let len = slice.len();
    let residual = &mut self.residual[..len];
    let sampler = self.sampler.as_mut().map(|s| &mut **s as &mut dyn SampleSource);
    let stream = adaptive::quantize(slice, residual, self.proportion, self.delta, sampler)
      .expect("proportion validated before construction");
    self.maybe_compress(stream)
  }

  fn recv_buffer_len(&mut self, _slice: MatrixView, expected_count: usize) -> usize {
    expected_count
  }

  fn recv_transform(&mut self, buf: &[u32], mut dst: MatrixViewMut) -> GradCompResult<()> {
    self.positions.clear();
    let stream = self.maybe_decompress(buf)?;
    adaptive::unquantize_apply(&stream, &mut dst, self.delta, &mut self.positions);
    Ok(())
  }
}

impl<'a> AllgatherOps for AdaptiveCollective<'a> {
  fn reduced_transform(&mut self, slice: MatrixView) -> Vec<u32> {
    let len = slice.len();
    let im_residual = &mut self.im_residual[..len];
    let rescaled: Vec<f32>;
    let slice = if let Some(adagrad) = self.adagrad.as_deref_mut() {
      rescaled = (0..slice.width())
        .flat_map(|c| (0..slice.height()).map(move |r| (r, c)))
        .map(|(r, c)| adagrad.rescale(slice.flat_index(r, c), slice.get(r, c)))
        .collect();
      MatrixView::contiguous(&rescaled, slice.height(), slice.width()).unwrap()
    } else {
      slice
    };
    let sampler = self.sampler.as_mut().map(|s| &mut **s as &mut dyn SampleSource);
    let stream = adaptive::quantize_apply(
      slice,
      im_residual,
      self.proportion,
      &self.positions,
      self.delta,
      sampler,
    )
    .expect("proportion validated before construction");
    self.maybe_compress(stream)
  }

  fn recv_broadcast(&mut self, buf: &[u32], mut dst: MatrixViewMut) -> GradCompResult<()> {
    let stream = self.maybe_decompress(buf)?;
    adaptive::unquantize(&stream, &mut dst, self.delta);
    Ok(())
  }
}

/// Runs a full quantized all-reduce (reduce-scatter then all-gather)
/// using the adaptive-threshold scheme, optionally Golomb-Rice compressed
/// and AdaGrad-rescaled per `config`. `residual` and `im_residual` carry
/// independent error-feedback state across calls for the two phases.
pub fn intermodel_sum_quantized<'a>(
  ctx: &mut RingContext,
  mut mat: MatrixViewMut,
  residual: &'a mut [f32],
  im_residual: &'a mut [f32],
  config: &QuantizeConfig,
  sampler: Option<&'a mut dyn SampleSource>,
  adagrad: Option<&'a mut AdagradState>,
) -> GradCompResult<()> {
  if config.proportion == 0 {
    return Err(GradCompError::invalid_argument(
      "QuantizeConfig::proportion must be at least 1",
    ));
  }

  let mut ops = AdaptiveCollective::new(residual, im_residual, sampler, adagrad, config);
  let height = mat.height();
  ring::reduce_scatter(ctx, mat.row_range_mut(0, height), &mut ops)?;
  ring::allgather(ctx, mat.row_range_mut(0, height), &mut ops)
}
