//! On-the-wire framing for ring messages: a 32-bit little-endian word
//! count followed by that many 32-bit little-endian payload words. Real
//! byte-oriented transports (sockets, pipes) serialize through this;
//! [`super::transport::ChannelRingTransport`] uses it over in-process byte
//! channels so the framing logic is exercised the same way a networked
//! transport would exercise it.

use crate::errors::{GradCompError, GradCompResult};

const LEN_HEADER_BYTES: usize = 4;

/// Encodes `words` as a length-prefixed frame.
pub fn encode_frame(words: &[u32]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(LEN_HEADER_BYTES + words.len() * 4);
  bytes.extend_from_slice(&(words.len() as u32).to_le_bytes());
  for &w in words {
    bytes.extend_from_slice(&w.to_le_bytes());
  }
  bytes
}

/// Decodes a length-prefixed frame, validating that the buffer holds
/// exactly the advertised number of words and nothing more.
pub fn decode_frame(bytes: &[u8]) -> GradCompResult<Vec<u32>> {
  if bytes.len() < LEN_HEADER_BYTES {
    return Err(GradCompError::transport(
      "frame shorter than the length header",
    ));
  }
  let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
  let expected_len = LEN_HEADER_BYTES + count * 4;
  if bytes.len() != expected_len {
    return Err(GradCompError::transport(format!(
      "frame declared {} words ({} bytes) but carried {} bytes",
      count, expected_len, bytes.len()
    )));
  }
  Ok(
    bytes[LEN_HEADER_BYTES..]
      .chunks_exact(4)
      .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
      .collect(),
  )
}
