//! Poisson likelihood for count data.

use candle_core::{Result, Tensor};

use crate::link::InvLink;
use crate::log_density::{self, lgamma};
use crate::settings::Integration;
use crate::traits::{generic_variational_expectations, Likelihood};

/// Poisson likelihood: y ~ Poisson(invlink(f) · binsize)
///
/// `binsize` is the exposure or interval width multiplying the rate. The
/// default link is `exp`, for which the expected log-density has a closed
/// form:
///
/// ```text
/// E[log p(y|f)] = y μ - exp(μ + σ²/2) b - lgamma(y + 1) + y log b
/// ```
#[derive(Debug, Clone)]
pub struct Poisson {
    invlink: InvLink,
    binsize: f64,
    integration: Integration,
}

impl Default for Poisson {
    fn default() -> Self {
        Self {
            invlink: InvLink::Exp,
            binsize: 1.0,
            integration: Integration::default(),
        }
    }
}

impl Poisson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invlink(mut self, invlink: InvLink) -> Self {
        self.invlink = invlink;
        self
    }

    pub fn with_binsize(mut self, binsize: f64) -> Self {
        self.binsize = binsize;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    pub fn binsize(&self) -> f64 {
        self.binsize
    }

    fn rate(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)? * self.binsize
    }
}

impl Likelihood for Poisson {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::poisson(y, &self.rate(f)?)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.rate(f)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        self.rate(f)
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        if !self.invlink.is_exp() {
            return generic_variational_expectations(self, fmu, fvar, y, None);
        }
        let expected_rate = (fmu + (fvar * 0.5)?)?.exp()? * self.binsize;
        let y_mu = (y * fmu)?;
        let y_log_b = (y * self.binsize.ln())?;
        ((y_mu - expected_rate?)? - lgamma(&y.affine(1.0, 1.0)?)?)? + y_log_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::test_util::{assert_non_negative, assert_tensors_close, random_marginals};
    use candle_core::Device;

    fn counts() -> Result<Tensor> {
        Tensor::new(
            &[[0.0f64, 3.0], [1.0, 0.0], [2.0, 5.0], [0.0, 1.0], [4.0, 2.0], [7.0, 0.0]],
            &Device::Cpu,
        )
    }

    #[test]
    fn test_closed_form_matches_quadrature() -> Result<()> {
        let (fmu, fvar) = random_marginals(6, 2, 7)?;
        let y = counts()?;
        for binsize in [1.0, 2.5] {
            let lik = Poisson::new().with_binsize(binsize);
            let ve = lik.variational_expectations(&fmu, &fvar, &y)?;
            let ve_quad = generic_variational_expectations(&lik, &fmu, &fvar, &y, None)?;
            assert_tensors_close(&ve, &ve_quad, 1e-6)?;
        }
        Ok(())
    }

    #[test]
    fn test_predictive_moments() -> Result<()> {
        let (fmu, fvar) = random_marginals(6, 2, 9)?;
        let lik = Poisson::new();
        let (m, v) = lik.predict_mean_and_var(&fmu, &fvar)?;

        // lognormal rate: E = exp(μ + σ²/2), Var = E + (exp(σ²) - 1) E²
        let e = (&fmu + (&fvar * 0.5)?)?.exp()?;
        let var = (&e + (fvar.exp()?.affine(1.0, -1.0)? * e.sqr()?)?)?;
        assert_tensors_close(&m, &e, 1e-6)?;
        assert_tensors_close(&v, &var, 1e-4)?;
        assert_non_negative(&v)?;
        Ok(())
    }

    #[test]
    fn test_non_exp_link_uses_quadrature() -> Result<()> {
        let (fmu, fvar) = random_marginals(6, 2, 3)?;
        let y = counts()?;
        let softplus = InvLink::custom(|f| f.exp()?.affine(1.0, 1.0)?.log());
        let lik = Poisson::new().with_invlink(softplus);
        let ve = lik.variational_expectations(&fmu, &fvar, &y)?;
        assert_eq!(ve.dims(), &[6, 2]);
        for v in ve.flatten_all()?.to_vec1::<f64>()? {
            assert!(v.is_finite() && v <= 0.0);
        }
        Ok(())
    }
}
