//! Beta likelihood for data in the unit interval.

use candle_core::{Device, Result, Tensor};

use crate::link::InvLink;
use crate::log_density;
use crate::param::Parameter;
use crate::settings::Integration;
use crate::traits::Likelihood;

/// Beta likelihood in mean/precision form:
///
/// ```text
/// m = invlink(f),   α = m · scale,   β = scale - α
/// E[y|f] = m,   Var[y|f] = (m - m²) / (scale + 1)
/// ```
///
/// The default link is the jittered probit, which keeps `m` strictly
/// inside (0, 1).
#[derive(Debug, Clone)]
pub struct Beta {
    scale: Parameter,
    invlink: InvLink,
    integration: Integration,
}

impl Beta {
    pub fn new(scale: f64, device: &Device) -> Result<Self> {
        Ok(Self {
            scale: Parameter::positive(scale, device)?,
            invlink: InvLink::probit(),
            integration: Integration::default(),
        })
    }

    pub fn with_invlink(mut self, invlink: InvLink) -> Self {
        self.invlink = invlink;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    pub fn scale(&self) -> &Parameter {
        &self.scale
    }
}

impl Likelihood for Beta {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        let scale = self.scale.value()?;
        let alpha = self.invlink.apply(f)?.broadcast_mul(&scale)?;
        let beta = alpha.neg()?.broadcast_add(&scale)?;
        log_density::beta(y, &alpha, &beta)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        let mean = self.invlink.apply(f)?;
        (&mean - mean.sqr()?)?.broadcast_div(&self.scale.value()?.affine(1.0, 1.0)?)
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.scale]
    }
}
