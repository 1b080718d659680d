//! Exponential likelihood for positive data.

use candle_core::{Result, Tensor};

use crate::link::InvLink;
use crate::log_density;
use crate::settings::Integration;
use crate::traits::{generic_variational_expectations, Likelihood};

/// Exponential likelihood with mean (scale) `invlink(f)`:
///
/// ```text
/// log p(y|f) = -y / s - log s,    s = invlink(f)
/// ```
///
/// With the `exp` link the expected log-density is closed form:
/// `-exp(-μ + σ²/2) y - μ`.
#[derive(Debug, Clone)]
pub struct Exponential {
    invlink: InvLink,
    integration: Integration,
}

impl Default for Exponential {
    fn default() -> Self {
        Self {
            invlink: InvLink::Exp,
            integration: Integration::default(),
        }
    }
}

impl Exponential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invlink(mut self, invlink: InvLink) -> Self {
        self.invlink = invlink;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }
}

impl Likelihood for Exponential {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::exponential(y, &self.invlink.apply(f)?)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)?.sqr()
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        if !self.invlink.is_exp() {
            return generic_variational_expectations(self, fmu, fvar, y, None);
        }
        let inv_scale = ((fvar * 0.5)? - fmu)?.exp()?;
        (inv_scale * y)?.neg()? - fmu
    }
}
