//! The ring reduce-scatter / all-gather engine. Written once against
//! [`CollectiveOps`]/[`AllgatherOps`] so each quantization scheme in
//! [`super::quantized`] plugs in without this module knowing which scheme
//! it's driving.

use crate::errors::GradCompResult;
use crate::matrix::{row_slices, MatrixViewMut};

use super::ops::{AllgatherOps, CollectiveOps};
use super::transport::RingTransport;

/// A peer's position in the ring plus the transport it talks to its
/// neighbors through.
pub struct RingContext<'t> {
  pub rank: usize,
  pub size: usize,
  pub transport: &'t mut dyn RingTransport,
}

impl<'t> RingContext<'t> {
  pub fn new(transport: &'t mut dyn RingTransport) -> Self {
    let rank = transport.rank();
    let size = transport.size();
    Self {
      rank,
      size,
      transport,
    }
  }
}

/// `R - 1` steps: at step `k`, this peer sends the slice it is about to
/// lose ownership of and receives the slice its predecessor has already
/// reduced one step further, accumulating it in place. After the loop,
/// this peer's own slice (index `rank`) holds the fully-reduced sum
/// across all `R` peers; every other slice is partially reduced and is
/// not touched again until [`allgather`].
pub fn reduce_scatter(
  ctx: &mut RingContext,
  mut mat: MatrixViewMut,
  ops: &mut dyn CollectiveOps,
) -> GradCompResult<()> {
  let r = ctx.size;
  if r <= 1 {
    return Ok(());
  }
  let i = ctx.rank;
  let slices = row_slices(mat.height(), r);

  for k in 0..r - 1 {
    let send_idx = (i + r - k) % r;
    let recv_idx = (i + r - k - 1) % r;

    let (send_start, send_len) = slices[send_idx];
    let send_words = {
      let view = mat.as_view();
      ops.send_transform(view.row_range(send_start, send_len))
    };
    ctx.transport.send_to_next(&send_words)?;

    let (recv_start, recv_len) = slices[recv_idx];
    let recv_hint = {
      let view = mat.as_view();
      ops.recv_buffer_len(view.row_range(recv_start, recv_len), send_words.len())
    };
    let recv_words = ctx.transport.recv_from_prev(recv_hint)?;
    ops.recv_transform(&recv_words, mat.row_range_mut(recv_start, recv_len))?;

    log::debug!(
      "reduce_scatter rank={} step={} sent slice {} received slice {}",
      i,
      k,
      send_idx,
      recv_idx
    );
  }
  Ok(())
}

/// `R - 1` steps mirroring [`reduce_scatter`]'s index rotation, offset by
/// one: the slice that ends a reduce-scatter fully reduced at rank `i` is
/// index `(i + 1) mod R`, not `i` itself (the last slice `i` receives
/// into during reduce-scatter is always the one its own data merges into
/// last). All-gather starts by broadcasting that slice and walks the same
/// rotation backward by one step, so each peer overwrites every other
/// slice with the fully-reduced value as it arrives.
pub fn allgather(
  ctx: &mut RingContext,
  mut mat: MatrixViewMut,
  ops: &mut dyn AllgatherOps,
) -> GradCompResult<()> {
  let r = ctx.size;
  if r <= 1 {
    return Ok(());
  }
  let i = ctx.rank;
  let slices = row_slices(mat.height(), r);

  let own_idx = (i + 1) % r;
  let (own_start, own_len) = slices[own_idx];
  let mut send_words = {
    let view = mat.as_view();
    ops.reduced_transform(view.row_range(own_start, own_len))
  };

  for k in 0..r - 1 {
    ctx.transport.send_to_next(&send_words)?;

    let recv_idx = (i + r - k) % r;
    let (recv_start, recv_len) = slices[recv_idx];
    let recv_hint = {
      let view = mat.as_view();
      ops.recv_buffer_len(view.row_range(recv_start, recv_len), send_words.len())
    };
    let recv_words = ctx.transport.recv_from_prev(recv_hint)?;
    ops.recv_broadcast(&recv_words, mat.row_range_mut(recv_start, recv_len))?;

    log::debug!(
      "allgather rank={} step={} forwarded, received slice {}",
      i,
      k,
      recv_idx
    );
    // The slice just received is already wire-encoded; the next step
    // forwards it verbatim rather than re-deriving it from the decoded
    // matrix.
    send_words = recv_words;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matrix::{MatrixView, MatrixViewMut};
  use crate::collectives::transport::ChannelRingTransport;
  use std::thread;

  /// A minimal `CollectiveOps`/`AllgatherOps` pair that transmits raw
  /// bit-reinterpreted `f32` sums uncompressed, used to exercise the ring
  /// index rotation in isolation from any quantization scheme.
  struct SumOps;

  impl CollectiveOps for SumOps {
    fn send_transform(&mut self, slice: MatrixView) -> Vec<u32> {
      (0..slice.width())
        .flat_map(|c| (0..slice.height()).map(move |r| (r, c)))
        .map(|(r, c)| slice.get(r, c).to_bits())
        .collect()
    }

    fn recv_buffer_len(&mut self, slice: MatrixView, _expected_count: usize) -> usize {
      slice.len()
    }

    fn recv_transform(&mut self, buf: &[u32], mut slice: MatrixViewMut) -> GradCompResult<()> {
      let mut idx = 0;
      for c in 0..slice.width() {
        for r in 0..slice.height() {
          slice.add(r, c, f32::from_bits(buf[idx]));
          idx += 1;
        }
      }
      Ok(())
    }
  }

  impl AllgatherOps for SumOps {
    fn reduced_transform(&mut self, slice: MatrixView) -> Vec<u32> {
      self.send_transform(slice)
    }

    fn recv_broadcast(&mut self, buf: &[u32], mut slice: MatrixViewMut) -> GradCompResult<()> {
      let mut idx = 0;
      for c in 0..slice.width() {
        for r in 0..slice.height() {
          slice.set(r, c, f32::from_bits(buf[idx]));
          idx += 1;
        }
      }
      Ok(())
    }
  }

  #[test]
  fn test_reduce_scatter_then_allgather_sums_across_ring() {
    const R: usize = 3;
    const HEIGHT: usize = 6;
    let transports = ChannelRingTransport::ring(R);

    let handles: Vec<_> = transports
      .into_iter()
      .enumerate()
      .map(|(rank, mut transport)| {
        thread::spawn(move || {
          let mut data = vec![1.0f32; HEIGHT];
          let mut ctx = RingContext::new(&mut transport);
          reduce_scatter(
            &mut ctx,
            MatrixViewMut::contiguous(&mut data, HEIGHT, 1).unwrap(),
            &mut SumOps,
          )
          .unwrap();
          allgather(
            &mut ctx,
            MatrixViewMut::contiguous(&mut data, HEIGHT, 1).unwrap(),
            &mut SumOps,
          )
          .unwrap();
          let _ = rank;
          data
        })
      })
      .collect();

    for handle in handles {
      let data = handle.join().unwrap();
      // Every peer started with all-ones; after reduce-scatter then
      // all-gather every entry should hold the sum across all R peers.
      assert!(data.iter().all(|&v| (v - R as f32).abs() < 1e-6));
    }
  }
}
