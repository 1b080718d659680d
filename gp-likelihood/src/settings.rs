//! Numerical settings shared by every likelihood.
//!
//! The jitter constants are not unified on purpose: each one bounds a
//! different quantity away from 0 or 1 and biases results by at most its own
//! magnitude.

use candle_core::DType;

/// Floating point type of parameters and internally generated tensors
pub const FLOAT_TYPE: DType = DType::F64;

pub const DEFAULT_NUM_GAUSS_HERMITE_POINTS: usize = 20;

pub const DEFAULT_NUM_MONTE_CARLO_POINTS: usize = 100;

/// Probit outputs are squeezed into `[j, 1 - j]`
pub const INV_PROBIT_JITTER: f64 = 1e-3;

/// Gaussian CDFs inside `prob_is_largest` are squeezed into `[j, 1 - j]`
pub const PROB_IS_LARGEST_CDF_JITTER: f64 = 1e-4;

/// Added to the ordinal bin probability before taking the log
pub const ORDINAL_LOG_JITTER: f64 = 1e-6;

/// Beta observations are clipped into `[c, 1 - c]`
pub const BETA_DATA_CLIP: f64 = 1e-6;

/// Variance floor used by `RobustMax::prob_is_largest`
pub const ROBUSTMAX_VAR_FLOOR: f64 = 1e-10;

/// Lower bound of the positive parameter transform
pub const POSITIVE_LOWER: f64 = 1e-6;

/// Which integration engine a likelihood uses for its generic expectations,
/// and at what resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Integration {
    /// Gauss-Hermite quadrature with `num_points` nodes per latent element
    GaussHermite { num_points: usize },
    /// Monte Carlo with `num_samples` draws per row; a fixed `seed`
    /// makes every call draw the same samples
    MonteCarlo {
        num_samples: usize,
        seed: Option<u64>,
    },
}

impl Default for Integration {
    fn default() -> Self {
        Self::GaussHermite {
            num_points: DEFAULT_NUM_GAUSS_HERMITE_POINTS,
        }
    }
}

impl Integration {
    pub fn gauss_hermite(num_points: usize) -> Self {
        Self::GaussHermite { num_points }
    }

    pub fn monte_carlo(num_samples: usize) -> Self {
        Self::MonteCarlo {
            num_samples,
            seed: None,
        }
    }

    /// Default Monte Carlo configuration (100 samples, unseeded)
    pub fn default_monte_carlo() -> Self {
        Self::monte_carlo(DEFAULT_NUM_MONTE_CARLO_POINTS)
    }

    /// Fix the seed of a Monte Carlo configuration; no-op for quadrature.
    pub fn with_seed(self, seed: u64) -> Self {
        match self {
            Self::MonteCarlo { num_samples, .. } => Self::MonteCarlo {
                num_samples,
                seed: Some(seed),
            },
            other => other,
        }
    }

    /// Number of quadrature nodes or Monte Carlo samples
    pub fn resolution(&self) -> usize {
        match self {
            Self::GaussHermite { num_points } => *num_points,
            Self::MonteCarlo { num_samples, .. } => *num_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_twenty_point_quadrature() {
        assert_eq!(Integration::default(), Integration::gauss_hermite(20));
        assert_eq!(Integration::default().resolution(), 20);
    }

    #[test]
    fn test_seed_only_touches_monte_carlo() {
        let mc = Integration::default_monte_carlo().with_seed(7);
        assert_eq!(
            mc,
            Integration::MonteCarlo {
                num_samples: 100,
                seed: Some(7)
            }
        );
        let gh = Integration::gauss_hermite(5).with_seed(7);
        assert_eq!(gh, Integration::gauss_hermite(5));
    }
}
