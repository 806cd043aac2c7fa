//! Cross-module round trips combining the threshold codec (C2) with
//! Golomb-Rice compression (C4), the way [`crate::collectives`] layers
//! them for wire transmission.

use crate::golomb_rice;
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::threshold;

#[test]
fn test_quantize_compress_decompress_unquantize_roundtrip() {
  let data: Vec<f32> = (0..256).map(|i| (i as f32 - 128.0) / 32.0).collect();
  let src = MatrixView::contiguous(&data, 256, 1).unwrap();
  let mut residual = vec![0.0f32; 256];

  let stream = threshold::quantize(src, &mut residual, 0.75, -0.75, false, 0.75, -0.75);
  assert!(!stream.is_empty());

  let compressed = golomb_rice::compress(&stream);
  let decompressed = golomb_rice::decompress(&compressed).unwrap();
  assert_eq!(decompressed, stream);

  let mut dst_data = vec![0.0f32; 256];
  {
    let mut dst = MatrixViewMut::contiguous(&mut dst_data, 256, 1).unwrap();
    threshold::unquantize(&decompressed, &mut dst, 0.75, -0.75, false);
  }
  for (i, &v) in data.iter().enumerate() {
    if v >= 0.75 {
      assert_eq!(dst_data[i], 0.75);
    } else if v <= -0.75 {
      assert_eq!(dst_data[i], -0.75);
    } else {
      assert_eq!(dst_data[i], 0.0);
    }
  }
}

#[test]
fn test_delta_mode_roundtrips_through_compression() {
  let data: Vec<f32> = (0..500).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
  let src = MatrixView::contiguous(&data, 500, 1).unwrap();
  let mut residual = vec![0.0f32; 500];

  let stream = threshold::quantize(src, &mut residual, 4.0, -4.0, true, 4.0, -4.0);
  let compressed = golomb_rice::compress(&stream);
  let decompressed = golomb_rice::decompress(&compressed).unwrap();
  assert_eq!(decompressed, stream);
}
