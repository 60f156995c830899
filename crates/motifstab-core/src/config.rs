//! Validated run parameters.
//!
//! Values arrive from the command line as plain numbers; everything that
//! reaches an algorithm goes through one of these constructors first.

use thiserror::Error;

use crate::cover::Cover;

/// Default number of random check-orders drawn per permutation.
pub const DEFAULT_SAMPLES: usize = 500;

/// Default Jaccard similarity needed to link two clusters.
pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.5;

/// Default fraction of member clusters a permutation must appear in.
pub const DEFAULT_CONSENSUS_FRACTION: f64 = 0.5;

/// Default exponent applied to each element's displacement.
pub const DEFAULT_DISPLACEMENT_EXPONENT: f64 = 1.2;

/// Default quadratic scale on the summed displacement.
pub const DEFAULT_DISPLACEMENT_SCALE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample count must be at least 1")]
    ZeroSamples,
    #[error("{name} must be a finite value in [0, 1], got {value}")]
    OutOfUnitInterval { name: &'static str, value: f64 },
    #[error("cover {0} appears more than once in the cover list")]
    DuplicateCover(Cover),
    #[error("cover {cover} in the {subset} subset is not part of the cover list")]
    UnknownSubsetCover { cover: Cover, subset: &'static str },
    #[error("global distortion threshold must be at least 1")]
    ZeroThreshold,
    #[error("{name} must be finite and greater than 0, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be finite and at least 0, got {value}")]
    Negative { name: &'static str, value: f64 },
}

/// Parameters of the check-order stability estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    samples: usize,
    seed: u64,
}

impl StabilityConfig {
    pub fn new(samples: usize, seed: u64) -> Result<Self, ConfigError> {
        if samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        Ok(Self { samples, seed })
    }

    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: 0,
        }
    }
}

/// Parameters of the Jaccard consensus builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusConfig {
    jaccard_threshold: f64,
    consensus_fraction: f64,
}

impl ConsensusConfig {
    /// Both values must be finite and inside `[0, 1]`.
    pub fn new(jaccard_threshold: f64, consensus_fraction: f64) -> Result<Self, ConfigError> {
        check_unit_interval("jaccard threshold", jaccard_threshold)?;
        check_unit_interval("consensus fraction", consensus_fraction)?;
        Ok(Self {
            jaccard_threshold,
            consensus_fraction,
        })
    }

    #[must_use]
    pub const fn jaccard_threshold(&self) -> f64 {
        self.jaccard_threshold
    }

    #[must_use]
    pub const fn consensus_fraction(&self) -> f64 {
        self.consensus_fraction
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
            consensus_fraction: DEFAULT_CONSENSUS_FRACTION,
        }
    }
}

/// Parameters of the permutation distance metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    displacement_exponent: f64,
    displacement_scale: f64,
}

impl MetricsConfig {
    pub fn new(displacement_exponent: f64, displacement_scale: f64) -> Result<Self, ConfigError> {
        if !(displacement_exponent.is_finite() && displacement_exponent > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "displacement exponent",
                value: displacement_exponent,
            });
        }
        if !(displacement_scale.is_finite() && displacement_scale >= 0.0) {
            return Err(ConfigError::Negative {
                name: "displacement scale",
                value: displacement_scale,
            });
        }
        Ok(Self {
            displacement_exponent,
            displacement_scale,
        })
    }

    #[must_use]
    pub const fn displacement_exponent(&self) -> f64 {
        self.displacement_exponent
    }

    #[must_use]
    pub const fn displacement_scale(&self) -> f64 {
        self.displacement_scale
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            displacement_exponent: DEFAULT_DISPLACEMENT_EXPONENT,
            displacement_scale: DEFAULT_DISPLACEMENT_SCALE,
        }
    }
}

/// Reject NaN, infinities and anything outside `[0, 1]`.
pub fn check_unit_interval(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfUnitInterval { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_samples_rejected() {
        assert_eq!(StabilityConfig::new(0, 7), Err(ConfigError::ZeroSamples));
        let cfg = StabilityConfig::new(3, 7).unwrap();
        assert_eq!(cfg.samples(), 3);
        assert_eq!(cfg.seed(), 7);
    }

    #[test]
    fn consensus_fraction_outside_unit_interval_rejected() {
        assert!(ConsensusConfig::new(0.5, 1.5).is_err());
        assert!(ConsensusConfig::new(0.5, -0.1).is_err());
        assert!(ConsensusConfig::new(f64::NAN, 0.5).is_err());
        assert!(ConsensusConfig::new(0.0, 0.0).is_ok());
        assert!(ConsensusConfig::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = StabilityConfig::default();
        assert_eq!(s.samples(), 500);
        let c = ConsensusConfig::default();
        assert_eq!(c.jaccard_threshold(), 0.5);
        assert_eq!(c.consensus_fraction(), 0.5);
        let m = MetricsConfig::default();
        assert_eq!(m.displacement_exponent(), 1.2);
        assert_eq!(m.displacement_scale(), 1e-4);
    }

    #[test]
    fn metrics_parameters_validated() {
        assert!(matches!(
            MetricsConfig::new(0.0, 0.0),
            Err(ConfigError::NotPositive { .. })
        ));
        assert!(matches!(
            MetricsConfig::new(1.0, -1.0),
            Err(ConfigError::Negative { .. })
        ));
        assert!(MetricsConfig::new(2.0, 0.0).is_ok());
    }
}
