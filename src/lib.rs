//! Bit-packed gradient quantization and ring-collective all-reduce for
//! distributed SGD.
//!
//! The crate is organized around five pieces that compose into a
//! quantized all-reduce:
//!
//! - [`onebit`] — one-bit per-column quantization, reconstructing each
//!   column from a positive and negative average.
//! - [`threshold`] — sparse threshold quantization, transmitting only
//!   entries whose magnitude crosses a cutoff.
//! - [`adaptive`] — adaptive (top-k) threshold selection on top of
//!   [`threshold`], choosing cutoffs so a target proportion of entries
//!   survives.
//! - [`golomb_rice`] — Golomb-Rice entropy coding layered over a
//!   threshold stream.
//! - [`collectives`] — the ring reduce-scatter/all-gather engine that
//!   drives these codecs across peers, with error feedback threaded
//!   through a caller-owned residual buffer.
//!
//! None of these own the caller's data: matrices are borrowed views
//! ([`matrix::MatrixView`] / [`matrix::MatrixViewMut`]) over `&[f32]` /
//! `&mut [f32]`, and residual buffers are always explicit `&mut [f32]`
//! parameters rather than module-level state.

pub mod adaptive;
pub mod collectives;
pub mod config;
pub mod constants;
pub mod errors;
pub mod golomb_rice;
pub mod matrix;
pub mod onebit;
pub mod sampling;
pub mod threshold;

#[cfg(test)]
mod tests;

pub use config::QuantizeConfig;
pub use errors::{ErrorKind, GradCompError, GradCompResult};
pub use matrix::{MatrixView, MatrixViewMut};
pub use sampling::{SampleSource, Xoshiro};
