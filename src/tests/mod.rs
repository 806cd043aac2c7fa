//! Cross-module scenario and property tests, one file per theme.

mod threshold_golomb;
