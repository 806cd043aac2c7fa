// Doing bit shifts/packs with u32 matches the wire word size exactly, so
// there's no mismatch between in-memory and on-the-wire representations.
pub type Word = u32;

/// Bits packed into a single sign-bit word of a one-bit quantized matrix.
pub const WORD_BITS: u32 = 32;

/// Rows reserved at the top of a one-bit quantized matrix for the
/// per-column positive and negative averages.
pub const ONEBIT_AVG_ROWS: usize = 2;

/// Number of rows sampled (with replacement) to approximate per-column
/// averages in `onebit::quantize` when `sample` is enabled.
pub const ONEBIT_SAMPLE_SIZE: usize = 128;

/// Number of entries sampled (with replacement) to approximate the
/// adaptive-threshold cutoffs in `adaptive::proportion_threshold_average`
/// when the candidate pool is larger than this.
pub const ADAPTIVE_SAMPLE_SIZE: usize = 1024;

/// Golomb-Rice parameter K: the remainder is encoded in K raw bits.
pub const GR_K: u32 = 8;

/// Golomb-Rice modulus `M = 2^K`.
pub const GR_M: u32 = 1 << GR_K;

/// One bit of a threshold-encoded position word is stolen for the sign,
/// so positions are limited to 31 bits.
pub const MAX_POSITION_BITS: u32 = 31;
pub const MAX_ENCODABLE_ENTRIES: usize = (1_u64 << MAX_POSITION_BITS) as usize;

/// Default proportion for adaptive-threshold quantization: keep
/// approximately 1-in-4 entries per sign.
pub const DEFAULT_PROPORTION: usize = 4;

/// Epsilon used in the AdaGrad-style rescaling applied between
/// reduce-scatter and all-gather.
pub const ADAGRAD_EPSILON: f32 = 1e-8;
