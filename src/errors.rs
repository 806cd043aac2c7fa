use std::error::Error;
use std::fmt::{Display, Formatter};
use std::{fmt, sync::mpsc};

/// The different kinds of errors the library can return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
  /// `ShapeMismatch` errors occur when a residual matrix or destination
  /// view does not match the shape implied by the source matrix.
  ShapeMismatch,
  /// `Transport` errors occur when a ring send or receive fails; the
  /// collective that triggered it must be treated as failed in its
  /// entirety.
  Transport,
  /// `MalformedStream` errors occur during Golomb-Rice decoding when a
  /// unary run runs past the end of the buffer without a terminating
  /// zero bit.
  MalformedStream,
  /// `InvalidArgument` errors occur when a caller-supplied parameter
  /// (e.g. a proportion of zero, or a slice too large to encode) is out
  /// of the range the core can handle.
  InvalidArgument,
}

/// The error type used in results for all `gradcomp` functionality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradCompError {
  pub kind: ErrorKind,
  pub message: String,
}

impl GradCompError {
  pub(crate) fn new<S: AsRef<str>>(kind: ErrorKind, message: S) -> Self {
    GradCompError {
      kind,
      message: message.as_ref().to_string(),
    }
  }

  pub(crate) fn shape_mismatch<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::ShapeMismatch, message)
  }

  pub(crate) fn transport<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::Transport, message)
  }

  pub(crate) fn malformed_stream<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::MalformedStream, message)
  }

  pub(crate) fn invalid_argument<S: AsRef<str>>(message: S) -> Self {
    Self::new(ErrorKind::InvalidArgument, message)
  }
}

impl Display for GradCompError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "gradcomp {:?} error: {}", self.kind, &self.message)
  }
}

impl Error for GradCompError {}

impl From<mpsc::RecvError> for GradCompError {
  fn from(err: mpsc::RecvError) -> Self {
    GradCompError::transport(format!("ring receive failed: {}", err))
  }
}

impl<T> From<mpsc::SendError<T>> for GradCompError {
  fn from(err: mpsc::SendError<T>) -> Self {
    GradCompError::transport(format!("ring send failed: {}", err))
  }
}

pub type GradCompResult<T> = Result<T, GradCompError>;
