//! Bernoulli likelihood for binary data.

use candle_core::{Result, Tensor};

use crate::link::{inv_probit, InvLink};
use crate::log_density;
use crate::settings::Integration;
use crate::traits::{generic_predict_mean_and_var, Likelihood};

/// Bernoulli likelihood, y ∈ {0, 1}, p(y = 1 | f) = invlink(f).
///
/// With the (jittered) probit link the predictive probability is exact:
///
/// ```text
/// p(y = 1) = Φ(μ / √(1 + σ²))
/// ```
///
/// and the predictive density follows from it directly.
#[derive(Debug, Clone)]
pub struct Bernoulli {
    invlink: InvLink,
    integration: Integration,
}

impl Default for Bernoulli {
    fn default() -> Self {
        Self {
            invlink: InvLink::probit(),
            integration: Integration::default(),
        }
    }
}

impl Bernoulli {
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

impl Likelihood for Bernoulli {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::bernoulli(y, &self.invlink.apply(f)?)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        let p = self.invlink.apply(f)?;
        &p - p.sqr()?
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn predict_mean_and_var(&self, fmu: &Tensor, fvar: &Tensor) -> Result<(Tensor, Tensor)> {
        match self.invlink {
            InvLink::Probit { jitter } => {
                let p = inv_probit(&(fmu / fvar.affine(1.0, 1.0)?.sqrt()?)?, jitter)?;
                let var = (&p - p.sqr()?)?;
                Ok((p, var))
            }
            _ => generic_predict_mean_and_var(self, fmu, fvar, None),
        }
    }

    fn predict_density(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        let (p, _) = self.predict_mean_and_var(fmu, fvar)?;
        log_density::bernoulli(y, &p)
    }
}
