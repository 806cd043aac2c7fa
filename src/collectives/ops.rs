//! Per-scheme callback contracts for the ring collectives.
//!
//! The reduce-scatter/all-gather engine in [`super::ring`] is written once
//! against these traits; each quantization scheme in [`super::quantized`]
//! supplies its own `CollectiveOps`/`AllgatherOps` implementation rather
//! than the engine matching on a scheme enum.

use crate::errors::GradCompResult;
use crate::matrix::{MatrixView, MatrixViewMut};

/// The three hooks a reduce-scatter step needs: encode an outgoing slice,
/// size the incoming buffer, and fold a decoded slice into the running
/// sum.
pub trait CollectiveOps {
  /// Encodes `slice` (this peer's own data, plus whatever residual state
  /// the implementation tracks) for transmission to the next peer.
  fn send_transform(&mut self, slice: MatrixView) -> Vec<u32>;

  /// The expected decoded word count for a slice of this shape, used to
  /// size a receive buffer ahead of the actual transfer. Implementations
  /// that can't predict an exact count (sparse schemes) may return an
  /// estimate; the transport is not required to honor it exactly.
  fn recv_buffer_len(&mut self, slice: MatrixView, expected_count: usize) -> usize;

  /// Decodes `buf` and accumulates it into `slice`. Fails if `buf` is not
  /// a validly encoded stream for this scheme (for example a truncated or
  /// corrupted Golomb-Rice stream) rather than panicking on peer data that
  /// merely failed to decode.
  fn recv_transform(&mut self, buf: &[u32], slice: MatrixViewMut) -> GradCompResult<()>;
}

/// All-gather additionally needs to re-encode a slice that has already
/// been fully reduced, once per ring step, as it circulates to every peer,
/// and to decode an incoming broadcast slice with overwrite rather than
/// accumulate semantics (every other slice in the destination still holds
/// a stale partial sum from reduce-scatter when all-gather starts).
pub trait AllgatherOps: CollectiveOps {
  /// Encodes a fully-reduced slice for broadcast around the ring. This is
  /// also where a quantization scheme applies an elementwise rescale (for
  /// example AdaGrad) between the reduce-scatter and all-gather phases,
  /// since it is the one hook that sees the reduced value exactly once
  /// per step before re-quantizing it.
  fn reduced_transform(&mut self, slice: MatrixView) -> Vec<u32>;

  /// Decodes a broadcast slice into `slice`, overwriting it. Distinct
  /// from [`CollectiveOps::recv_transform`] because a slice arriving
  /// during all-gather is already the final, fully-reduced value — adding
  /// it to whatever partial sum happens to sit there from reduce-scatter
  /// would double-count. Fails the same way `recv_transform` does on an
  /// invalid stream.
  fn recv_broadcast(&mut self, buf: &[u32], slice: MatrixViewMut) -> GradCompResult<()>;
}
