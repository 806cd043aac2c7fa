//! The ring-facing transport abstraction. The engine in [`super::ring`]
//! only ever needs to send a message to its right neighbor and receive
//! one from its left, so the trait is narrowed to exactly that rather
//! than a general any-peer-to-any-peer send/recv.

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::errors::GradCompResult;

use super::wire;

/// A logical ring edge: send to the next rank, receive from the previous
/// one. Implementations are free to buffer, block, or fail; a failure at
/// any step is fatal to the whole collective, per the resource model.
pub trait RingTransport {
  fn rank(&self) -> usize;
  fn size(&self) -> usize;

  /// Sends `words` to `(rank() + 1) % size()`. `len_hint` is the number
  /// of words the *other* side should expect to receive next, letting a
  /// byte-stream implementation pre-size a read buffer the way the
  /// original callback contract's `get_recv_buffer` did; the in-process
  /// channel transport below ignores it.
  fn send_to_next(&mut self, words: &[u32]) -> GradCompResult<()>;

  /// Blocks until a message from `(rank() + size() - 1) % size()`
  /// arrives.
  fn recv_from_prev(&mut self, len_hint: usize) -> GradCompResult<Vec<u32>>;
}

/// An in-process `RingTransport` over byte channels, for tests and for
/// exercising the wire framing in [`super::wire`] without real sockets.
pub struct ChannelRingTransport {
  rank: usize,
  size: usize,
  tx_to_next: Sender<Vec<u8>>,
  rx_from_prev: Receiver<Vec<u8>>,
}

impl ChannelRingTransport {
  /// Builds a ring of `size` transports, one per rank, wired so rank
  /// `i`'s `send_to_next` is received by rank `(i + 1) % size`'s
  /// `recv_from_prev`.
  pub fn ring(size: usize) -> Vec<Self> {
    assert!(size > 0, "a ring must have at least one peer");
    let mut senders = Vec::with_capacity(size);
    let mut receivers: Vec<Option<Receiver<Vec<u8>>>> = Vec::with_capacity(size);
    for _ in 0..size {
      let (tx, rx) = channel();
      senders.push(tx);
      receivers.push(Some(rx));
    }
    (0..size)
      .map(|i| {
        let prev = (i + size - 1) % size;
        ChannelRingTransport {
          rank: i,
          size,
          tx_to_next: senders[i].clone(),
          rx_from_prev: receivers[prev].take().unwrap(),
        }
      })
      .collect()
  }
}

impl RingTransport for ChannelRingTransport {
  fn rank(&self) -> usize {
    self.rank
  }

  fn size(&self) -> usize {
    self.size
  }

  fn send_to_next(&mut self, words: &[u32]) -> GradCompResult<()> {
    // mpsc sends never block on an unbounded channel, so issuing the
    // send before the matching recv (as the ring engine does) cannot
    // deadlock, mirroring the "post receive, then send" ordering
    // guarantee real network transports rely on.
    Ok(self.tx_to_next.send(wire::encode_frame(words))?)
  }

  fn recv_from_prev(&mut self, _len_hint: usize) -> GradCompResult<Vec<u32>> {
    let bytes = self.rx_from_prev.recv()?;
    wire::decode_frame(&bytes)
  }
}
