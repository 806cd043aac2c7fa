//! Ring-structured collective communication (C5): reduce-scatter and
//! all-gather composed into a quantized all-reduce with error-feedback
//! discipline, driven by pluggable [`ops::CollectiveOps`]/
//! [`ops::AllgatherOps`] implementations per quantization scheme.

mod ops;
mod quantized;
mod ring;
mod transport;
mod wire;

pub use ops::{AllgatherOps, CollectiveOps};
pub use quantized::{intermodel_sum_quantized, AdagradState, AdaptiveCollective, OnebitCollective};
pub use ring::{allgather, reduce_scatter, RingContext};
pub use transport::{ChannelRingTransport, RingTransport};
