use crate::constants::DEFAULT_PROPORTION;

/// All configuration recognized by the quantized collectives surface.
///
/// Mirrors the options enumerated in the external interfaces: whether to
/// approximate per-column averages by sampling, whether to delta-encode
/// threshold positions, whether to layer the Golomb-Rice coder on top of
/// a threshold scheme, the adaptive-threshold keep proportion, and
/// whether to apply the AdaGrad-style rescale between reduce-scatter and
/// all-gather.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct QuantizeConfig {
  /// Enable approximate per-column averages (C1) / adaptive thresholds
  /// (C3) via sampling instead of a full sweep.
  pub sample: bool,
  /// Use delta-position encoding in threshold schemes (C2/C3).
  pub delta: bool,
  /// Layer the Golomb-Rice coder (C4) over threshold/adaptive output.
  pub compress: bool,
  /// The `p` in "retain about 1/p of entries by magnitude" for adaptive
  /// threshold selection (C3). Must be at least 1.
  pub proportion: usize,
  /// Apply the AdaGrad-style rescale (`x / (sqrt(gradhist + x^2) + eps)`)
  /// between reduce-scatter and all-gather.
  pub do_adagrad: bool,
}

impl Default for QuantizeConfig {
  fn default() -> Self {
    Self {
      sample: false,
      delta: false,
      compress: false,
      proportion: DEFAULT_PROPORTION,
      do_adagrad: false,
    }
  }
}

impl QuantizeConfig {
  /// Sets [`sample`][QuantizeConfig::sample].
  pub fn with_sample(mut self, sample: bool) -> Self {
    self.sample = sample;
    self
  }

  /// Sets [`delta`][QuantizeConfig::delta].
  pub fn with_delta(mut self, delta: bool) -> Self {
    self.delta = delta;
    self
  }

  /// Sets [`compress`][QuantizeConfig::compress].
  pub fn with_compress(mut self, compress: bool) -> Self {
    self.compress = compress;
    self
  }

  /// Sets [`proportion`][QuantizeConfig::proportion].
  pub fn with_proportion(mut self, proportion: usize) -> Self {
    self.proportion = proportion;
    self
  }

  /// Sets [`do_adagrad`][QuantizeConfig::do_adagrad].
  pub fn with_adagrad(mut self, do_adagrad: bool) -> Self {
    self.do_adagrad = do_adagrad;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config() {
    let config = QuantizeConfig::default();
    assert!(!config.sample);
    assert!(!config.delta);
    assert!(!config.compress);
    assert_eq!(config.proportion, DEFAULT_PROPORTION);
    assert!(!config.do_adagrad);
  }

  #[test]
  fn test_builder_chains() {
    let config = QuantizeConfig::default()
      .with_sample(true)
      .with_delta(true)
      .with_compress(true)
      .with_proportion(8)
      .with_adagrad(true);
    assert!(config.sample);
    assert!(config.delta);
    assert!(config.compress);
    assert_eq!(config.proportion, 8);
    assert!(config.do_adagrad);
  }
}
