//! Golomb-Rice entropy coding (C4) layered over the threshold schemes'
//! position/sign words, packed LSB-first into fixed-width 32-bit words.

use crate::constants::{GR_K, GR_M, WORD_BITS};
use crate::errors::{GradCompError, GradCompResult};
use crate::threshold::ThreshStream;

/// A Golomb-Rice-coded bitstream, packed into 32-bit words.
pub type CompressedStream = Vec<u32>;

/// Appends bits LSB-first into a growable word buffer.
struct BitWriter {
  words: Vec<u32>,
  cur: u32,
  cur_bit: u32,
}

impl BitWriter {
  fn new() -> Self {
    Self {
      words: Vec::new(),
      cur: 0,
      cur_bit: 0,
    }
  }

  fn write_ones(&mut self, mut count: u32) {
    while count > 0 {
      let bits_left = WORD_BITS - self.cur_bit;
      let take = count.min(bits_left);
      if take == WORD_BITS {
        self.cur = u32::MAX;
      } else {
        self.cur |= ((1u32 << take) - 1) << self.cur_bit;
      }
      self.cur_bit += take;
      count -= take;
      if self.cur_bit == WORD_BITS {
        self.flush_word();
      }
    }
  }

  fn write_zero(&mut self) {
    // A zero bit just advances the cursor; `cur` already has a 0 there.
    self.cur_bit += 1;
    if self.cur_bit == WORD_BITS {
      self.flush_word();
    }
  }

  fn write_bits(&mut self, value: u32, n: u32) {
    let bits_left = WORD_BITS - self.cur_bit;
    if bits_left >= n {
      self.cur |= value << self.cur_bit;
      self.cur_bit += n;
      if self.cur_bit == WORD_BITS {
        self.flush_word();
      }
    } else {
      self.cur |= (value & ((1u32 << bits_left) - 1)) << self.cur_bit;
      self.flush_word();
      self.cur = value >> bits_left;
      self.cur_bit = n - bits_left;
    }
  }

  fn flush_word(&mut self) {
    self.words.push(self.cur);
    self.cur = 0;
    self.cur_bit = 0;
  }

  /// Pads the final partial word's unused bits with ones (the
  /// end-of-stream terminator) and returns the packed words.
  fn finish(mut self) -> Vec<u32> {
    if self.cur_bit > 0 {
      let bits_left = WORD_BITS - self.cur_bit;
      self.cur |= ((1u32 << bits_left) - 1) << self.cur_bit;
      self.words.push(self.cur);
    }
    if self.words.is_empty() {
      // An entirely empty stream still needs a terminator so the reader
      // can distinguish "no entries" from "truncated".
      self.words.push(u32::MAX);
    }
    self.words
  }
}

struct BitReader<'a> {
  words: &'a [u32],
  word_idx: usize,
  cur_bit: u32,
}

impl<'a> BitReader<'a> {
  fn new(words: &'a [u32]) -> Self {
    Self {
      words,
      word_idx: 0,
      cur_bit: 0,
    }
  }

  fn at_end(&self) -> bool {
    self.word_idx >= self.words.len()
  }

  fn advance_bit(&mut self) -> GradCompResult<()> {
    self.cur_bit += 1;
    if self.cur_bit == WORD_BITS {
      self.word_idx += 1;
      self.cur_bit = 0;
    }
    Ok(())
  }

  fn peek_bit(&self) -> GradCompResult<bool> {
    if self.at_end() {
      return Err(GradCompError::malformed_stream(
        "ran out of words while decoding a unary run",
      ));
    }
    Ok((self.words[self.word_idx] >> self.cur_bit) & 1 == 1)
  }

  /// Reads a unary-coded quotient, returning `None` if the very first bit
  /// position is the all-ones terminator word (empty-stream sentinel).
  fn read_quotient(&mut self) -> GradCompResult<u32> {
    let mut quotient = 0u32;
    while self.peek_bit()? {
      quotient += 1;
      self.advance_bit()?;
    }
    self.advance_bit()?; // the terminating zero
    Ok(quotient)
  }

  fn read_bits(&mut self, n: u32) -> GradCompResult<u32> {
    let bits_left = WORD_BITS - self.cur_bit;
    if n <= bits_left {
      if self.at_end() {
        return Err(GradCompError::malformed_stream(
          "ran out of words while decoding a remainder",
        ));
      }
      let value = (self.words[self.word_idx] >> self.cur_bit) & ((1u32 << n) - 1);
      for _ in 0..n {
        self.advance_bit()?;
      }
      Ok(value)
    } else {
      let low = if self.at_end() {
        return Err(GradCompError::malformed_stream(
          "ran out of words while decoding a split remainder",
        ));
      } else {
        self.words[self.word_idx] >> self.cur_bit
      };
      for _ in 0..bits_left {
        self.advance_bit()?;
      }
      let high_n = n - bits_left;
      let high = self.read_bits(high_n)?;
      Ok(low | (high << bits_left))
    }
  }
}

/// Detects the terminator padding. `finish()` never pads more than the
/// single final word: either it tops off the real payload's trailing
/// partial word with ones from wherever the payload happened to stop
/// (not necessarily at a word boundary), or, for a totally empty stream,
/// appends one dedicated all-ones word. So the terminator is always
/// confined to the last word in the buffer; this checks that the reader
/// is in that last word and every remaining bit of it, from the current
/// position onward, is 1 — not that the position is word-aligned, and
/// not that every word to the end of the buffer is all ones (two or more
/// trailing all-ones words means an unterminated run, not padding).
fn is_terminator_position(reader: &BitReader) -> bool {
  if reader.at_end() || reader.word_idx + 1 != reader.words.len() {
    return false;
  }
  let last = reader.words[reader.word_idx];
  let mask = u32::MAX << reader.cur_bit;
  last & mask == mask
}

/// Encodes a sequence of nonnegative 31-bit words with Golomb-Rice coding
/// (`K` = [`GR_K`]).
pub fn compress(stream: &ThreshStream) -> CompressedStream {
  let mut writer = BitWriter::new();
  for &x in stream {
    let quotient = x >> GR_K;
    let remainder = x & (GR_M - 1);
    writer.write_ones(quotient);
    writer.write_zero();
    writer.write_bits(remainder, GR_K);
  }
  writer.finish()
}

/// Decodes a Golomb-Rice-coded stream back into its original words.
/// Returns a [`GradCompError::MalformedStream`](crate::errors::ErrorKind::MalformedStream)
/// error if a unary run runs off the end of the buffer without a
/// terminating zero.
pub fn decompress(cstream: &CompressedStream) -> GradCompResult<ThreshStream> {
  let mut reader = BitReader::new(cstream);
  let mut out = ThreshStream::new();
  while !reader.at_end() {
    if is_terminator_position(&reader) {
      break;
    }
    let quotient = reader.read_quotient()?;
    let remainder = reader.read_bits(GR_K)?;
    out.push(quotient * GR_M + remainder);
  }
  Ok(out)
}

/// Compresses an adaptive-threshold stream, passing its two leading
/// average-prefix words through uncoded.
pub fn compress_adaptive(stream: &ThreshStream) -> CompressedStream {
  let mut out = vec![stream[0], stream[1]];
  out.extend(compress(&stream[2..].to_vec()));
  out
}

/// Inverse of [`compress_adaptive`].
pub fn decompress_adaptive(cstream: &CompressedStream) -> GradCompResult<ThreshStream> {
  let mut out = vec![cstream[0], cstream[1]];
  out.extend(decompress(&cstream[2..].to_vec())?);
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_roundtrip_small_sequence() {
    let input: ThreshStream = vec![0, 1, 7, 8, 1023];
    let compressed = compress(&input);
    let decoded = decompress(&compressed).unwrap();
    assert_eq!(decoded, input);
  }

  #[test]
  fn test_roundtrip_empty_sequence() {
    let input: ThreshStream = vec![];
    let compressed = compress(&input);
    assert_eq!(compressed, vec![u32::MAX]);
    let decoded = decompress(&compressed).unwrap();
    assert!(decoded.is_empty());
  }

  #[test]
  fn test_roundtrip_many_values_spanning_words() {
    let input: ThreshStream = (0..5000u32).map(|i| (i * 37) % 2_000_000).collect();
    let compressed = compress(&input);
    let decoded = decompress(&compressed).unwrap();
    assert_eq!(decoded, input);
  }

  #[test]
  fn test_roundtrip_large_quotients() {
    let input: ThreshStream = vec![0, (1 << 20), (1 << 30), 5, 5, 5];
    let compressed = compress(&input);
    let decoded = decompress(&compressed).unwrap();
    assert_eq!(decoded, input);
  }

  #[test]
  fn test_roundtrip_terminator_lands_mid_word() {
    // Total payload length (57 bits) is not a multiple of 32, so the
    // padding starts partway through the final word rather than at a
    // word boundary.
    let input: ThreshStream = vec![0, 1, 7, 200, 1023, 4];
    let compressed = compress(&input);
    let decoded = decompress(&compressed).unwrap();
    assert_eq!(decoded, input);
  }

  #[test]
  fn test_malformed_stream_without_terminator_errors() {
    // A word of all ones that isn't the last word looks like a quotient
    // run with no terminating zero anywhere in the buffer.
    let cstream: CompressedStream = vec![u32::MAX, u32::MAX];
    assert!(decompress(&cstream).is_err());
  }

  #[test]
  fn test_adaptive_prefix_passes_through_uncoded() {
    let pos_avg_bits = 1.5f32.to_bits();
    let neg_avg_bits = (-0.5f32).to_bits();
    let input: ThreshStream = vec![pos_avg_bits, neg_avg_bits, 3, 9, 200];
    let compressed = compress_adaptive(&input);
    assert_eq!(&compressed[..2], &input[..2]);
    let decoded = decompress_adaptive(&compressed).unwrap();
    assert_eq!(decoded, input);
  }
}
