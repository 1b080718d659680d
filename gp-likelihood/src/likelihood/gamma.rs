//! Gamma likelihood for positive data.

use candle_core::{Device, Result, Tensor};

use crate::link::InvLink;
use crate::log_density::{self, lgamma};
use crate::param::Parameter;
use crate::settings::Integration;
use crate::traits::{generic_variational_expectations, Likelihood};

/// Gamma likelihood with learnable shape `k` and scale `invlink(f)`:
///
/// ```text
/// E[y|f] = k s,   Var[y|f] = k s²,   s = invlink(f)
/// ```
///
/// With the `exp` link
///
/// ```text
/// E[log p(y|f)] = -k μ - lgamma(k) + (k - 1) log y - y exp(-μ + σ²/2)
/// ```
#[derive(Debug, Clone)]
pub struct Gamma {
    shape: Parameter,
    invlink: InvLink,
    integration: Integration,
}

impl Gamma {
    pub fn new(shape: f64, device: &Device) -> Result<Self> {
        Ok(Self {
            shape: Parameter::positive(shape, device)?,
            invlink: InvLink::Exp,
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

    pub fn shape(&self) -> &Parameter {
        &self.shape
    }
}

impl Likelihood for Gamma {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::gamma(y, &self.shape.value()?, &self.invlink.apply(f)?)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)?.broadcast_mul(&self.shape.value()?)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        self.invlink.apply(f)?.sqr()?.broadcast_mul(&self.shape.value()?)
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.shape]
    }

    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        if !self.invlink.is_exp() {
            return generic_variational_expectations(self, fmu, fvar, y, None);
        }
        let shape = self.shape.value()?;
        let k_mu = fmu.broadcast_mul(&shape)?;
        let k_m1_log_y = y.log()?.broadcast_mul(&shape.affine(1.0, -1.0)?)?;
        let y_inv_scale = (y * ((fvar * 0.5)? - fmu)?.exp()?)?;
        (k_m1_log_y - k_mu)?
            .broadcast_sub(&lgamma(&shape)?)?
            .sub(&y_inv_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::test_util::{assert_non_negative, assert_tensors_close, random_marginals};

    #[test]
    fn test_closed_form_matches_quadrature() -> Result<()> {
        let (fmu, fvar) = random_marginals(7, 2, 31)?;
        let (y, _) = random_marginals(7, 2, 33)?;
        let y = y.exp()?;
        for shape in [0.7, 1.0, 3.5] {
            let lik = Gamma::new(shape, &Device::Cpu)?;
            let ve = lik.variational_expectations(&fmu, &fvar, &y)?;
            let ve_quad = generic_variational_expectations(&lik, &fmu, &fvar, &y, None)?;
            assert_tensors_close(&ve, &ve_quad, 1e-6)?;
        }
        Ok(())
    }

    #[test]
    fn test_moments_follow_shape() -> Result<()> {
        let lik = Gamma::new(2.0, &Device::Cpu)?;
        let f = Tensor::new(&[[0.0f64, 1.0]], &Device::Cpu)?;
        let m: Vec<f64> = lik.conditional_mean(&f)?.flatten_all()?.to_vec1()?;
        let v: Vec<f64> = lik.conditional_variance(&f)?.flatten_all()?.to_vec1()?;
        let e = std::f64::consts::E;
        assert!((m[0] - 2.0).abs() < 1e-9 && (m[1] - 2.0 * e).abs() < 1e-9);
        assert!((v[0] - 2.0).abs() < 1e-9 && (v[1] - 2.0 * e * e).abs() < 1e-9);

        lik.shape().assign(5.0)?;
        let m: Vec<f64> = lik.conditional_mean(&f)?.flatten_all()?.to_vec1()?;
        assert!((m[0] - 5.0).abs() < 1e-9);

        let (fmu, fvar) = random_marginals(4, 2, 8)?;
        let (_, pv) = lik.predict_mean_and_var(&fmu, &fvar)?;
        assert_non_negative(&pv)?;
        Ok(())
    }
}
