//! Multi-class classification with the softmax link.

use candle_core::{bail, Result, Tensor};
use candle_nn::ops::{log_softmax, softmax};

use super::class_indices;
use crate::settings::Integration;
use crate::traits::Likelihood;

/// Softmax likelihood: `p(y = k | f) = exp(f_k) / Σ_j exp(f_j)`.
///
/// The link couples all columns of a row, so the expectations use Monte
/// Carlo integration (100 samples unless configured otherwise).
#[derive(Debug, Clone)]
pub struct SoftMax {
    num_classes: usize,
    integration: Integration,
}

impl SoftMax {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            integration: Integration::default_monte_carlo(),
        }
    }

    /// Monte Carlo configuration; quadrature would integrate each class
    /// independently and is rejected.
    pub fn with_integration(mut self, integration: Integration) -> Result<Self> {
        if let Integration::GaussHermite { .. } = integration {
            bail!("SoftMax needs Monte Carlo integration");
        }
        self.integration = integration;
        Ok(self)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Likelihood for SoftMax {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        let (n, k) = f.dims2()?;
        if k != self.num_classes {
            bail!("SoftMax: F has {} columns, expected {}", k, self.num_classes);
        }
        if y.dims() != [n, 1] {
            bail!("SoftMax: Y must be ({}, 1) labels, got {:?}", n, y.dims());
        }
        let labels = class_indices("SoftMax", y, self.num_classes)?.reshape((n, 1))?;
        log_softmax(f, 1)?.gather(&labels, 1)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        softmax(f, 1)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        let p = softmax(f, 1)?;
        &p - p.sqr()?
    }

    fn integration(&self) -> Integration {
        self.integration
    }
}
