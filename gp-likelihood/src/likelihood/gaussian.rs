//! Gaussian likelihood for continuous data.

use candle_core::{Device, Result, Tensor};

use crate::log_density;
use crate::param::Parameter;
use crate::settings::Integration;
use crate::traits::Likelihood;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Gaussian likelihood: y ~ N(f, σ²)
///
/// # Model
/// ```text
/// log p(y | f) = -0.5 * [log(2π) + log σ² + (y - f)² / σ²]
/// ```
///
/// All three expectations are available in closed form.
#[derive(Debug, Clone)]
pub struct Gaussian {
    variance: Parameter,
    integration: Integration,
}

impl Gaussian {
    pub fn new(variance: f64, device: &Device) -> Result<Self> {
        Ok(Self {
            variance: Parameter::positive(variance, device)?,
            integration: Integration::default(),
        })
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    /// Noise variance σ²
    pub fn variance(&self) -> &Parameter {
        &self.variance
    }
}

impl Likelihood for Gaussian {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::gaussian(y, f, &self.variance.value()?)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        Ok(f.clone())
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        f.ones_like()?.broadcast_mul(&self.variance.value()?)
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.variance]
    }

    fn predict_mean_and_var(&self, fmu: &Tensor, fvar: &Tensor) -> Result<(Tensor, Tensor)> {
        Ok((fmu.clone(), fvar.broadcast_add(&self.variance.value()?)?))
    }

    fn predict_density(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        let var = fvar.broadcast_add(&self.variance.value()?)?;
        log_density::gaussian(y, fmu, &var)
    }

    /// ```text
    /// -0.5 log(2π) - 0.5 log σ² - 0.5 ((y - μ)² + σ²_f) / σ²
    /// ```
    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        let variance = self.variance.value()?;
        let sq = (y.broadcast_sub(fmu)?.sqr()? + fvar)?.broadcast_div(&variance)?;
        (sq.broadcast_add(&variance.log()?)? + LN_2PI)? * (-0.5)
    }
}
