//! Monte Carlo variants of any likelihood.

use candle_core::{Result, Tensor};

use crate::likelihood::Gaussian;
use crate::param::Parameter;
use crate::settings::{Integration, DEFAULT_NUM_MONTE_CARLO_POINTS};
use crate::traits::{
    generic_predict_density, generic_predict_mean_and_var, generic_variational_expectations,
    Likelihood,
};

/// Wraps a likelihood so that all three expectations are estimated by
/// sampling, ignoring any closed forms of the inner likelihood.
///
/// The `*_with_epsilon` methods accept fixed `(S, N, D)` standard normal
/// draws, which makes estimates reproducible and lets two likelihoods be
/// compared on identical samples.
#[derive(Debug, Clone)]
pub struct MonteCarlo<L> {
    inner: L,
    num_samples: usize,
    seed: Option<u64>,
}

/// Gaussian likelihood with sampled expectations, mainly for testing
/// against the closed forms.
pub type GaussianMC = MonteCarlo<Gaussian>;

impl<L: Likelihood> MonteCarlo<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            num_samples: DEFAULT_NUM_MONTE_CARLO_POINTS,
            seed: None,
        }
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn predict_mean_and_var_with_epsilon(
        &self,
        fmu: &Tensor,
        fvar: &Tensor,
        epsilon: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        generic_predict_mean_and_var(self, fmu, fvar, epsilon)
    }

    pub fn predict_density_with_epsilon(
        &self,
        fmu: &Tensor,
        fvar: &Tensor,
        y: &Tensor,
        epsilon: Option<&Tensor>,
    ) -> Result<Tensor> {
        generic_predict_density(self, fmu, fvar, y, epsilon)
    }

    pub fn variational_expectations_with_epsilon(
        &self,
        fmu: &Tensor,
        fvar: &Tensor,
        y: &Tensor,
        epsilon: Option<&Tensor>,
    ) -> Result<Tensor> {
        generic_variational_expectations(self, fmu, fvar, y, epsilon)
    }
}

impl GaussianMC {
    pub fn gaussian(variance: f64, device: &candle_core::Device) -> Result<Self> {
        Ok(Self::new(Gaussian::new(variance, device)?))
    }
}

impl<L: Likelihood> Likelihood for MonteCarlo<L> {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.inner.logp(f, y)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        self.inner.conditional_mean(f)
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        self.inner.conditional_variance(f)
    }

    fn integration(&self) -> Integration {
        Integration::MonteCarlo {
            num_samples: self.num_samples,
            seed: self.seed,
        }
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.inner.parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::test_util::{assert_tensors_close, random_marginals};
    use crate::monte_carlo::standard_normal;
    use candle_core::Device;

    #[test]
    fn test_gaussian_mc_agrees_with_closed_form() -> Result<()> {
        let closed = Gaussian::new(0.7, &Device::Cpu)?;
        let mc = GaussianMC::gaussian(0.7, &Device::Cpu)?
            .with_num_samples(20_000)
            .with_seed(3);
        let (fmu, fvar) = random_marginals(4, 2, 61)?;
        let (y, _) = random_marginals(4, 2, 63)?;

        let ve = closed.variational_expectations(&fmu, &fvar, &y)?;
        let ve_mc = mc.variational_expectations(&fmu, &fvar, &y)?;
        assert_tensors_close(&ve_mc, &ve, 5e-2)?;

        let (m, v) = closed.predict_mean_and_var(&fmu, &fvar)?;
        let (m_mc, v_mc) = mc.predict_mean_and_var(&fmu, &fvar)?;
        assert_tensors_close(&m_mc, &m, 5e-2)?;
        assert_tensors_close(&v_mc, &v, 5e-2)?;
        Ok(())
    }

    #[test]
    fn test_fixed_epsilon_is_deterministic() -> Result<()> {
        let mc = GaussianMC::gaussian(1.0, &Device::Cpu)?;
        let (fmu, fvar) = random_marginals(3, 2, 71)?;
        let (y, _) = random_marginals(3, 2, 73)?;
        let eps = standard_normal((50, 3, 2), Some(9), &Device::Cpu)?;

        let a = mc.predict_density_with_epsilon(&fmu, &fvar, &y, Some(&eps))?;
        let b = mc.predict_density_with_epsilon(&fmu, &fvar, &y, Some(&eps))?;
        assert_eq!(a.flatten_all()?.to_vec1::<f64>()?, b.flatten_all()?.to_vec1::<f64>()?);

        let ve = mc.variational_expectations_with_epsilon(&fmu, &fvar, &y, Some(&eps))?;
        assert_eq!(ve.dims(), &[3, 2]);
        assert_eq!(mc.parameters().len(), 1);
        Ok(())
    }
}
