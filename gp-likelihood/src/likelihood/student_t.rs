//! Student-t likelihood for heavy-tailed continuous data.

use candle_core::{Device, Result, Tensor};

use crate::log_density;
use crate::param::Parameter;
use crate::settings::Integration;
use crate::traits::Likelihood;

/// Student-t likelihood centred on `f` with learnable `scale` and fixed
/// degrees of freedom `df`.
///
/// The conditional variance `scale² · df / (df - 2)` is only meaningful
/// for `df > 2`; smaller values are not rejected and yield an infinite or
/// negative variance. Expectations are computed by quadrature.
#[derive(Debug, Clone)]
pub struct StudentT {
    scale: Parameter,
    df: f64,
    integration: Integration,
}

impl StudentT {
    pub fn new(scale: f64, df: f64, device: &Device) -> Result<Self> {
        Ok(Self {
            scale: Parameter::positive(scale, device)?,
            df,
            integration: Integration::default(),
        })
    }

    /// Unit scale, three degrees of freedom
    pub fn standard(device: &Device) -> Result<Self> {
        Self::new(1.0, 3.0, device)
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    pub fn scale(&self) -> &Parameter {
        &self.scale
    }

    pub fn df(&self) -> f64 {
        self.df
    }
}

impl Likelihood for StudentT {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        log_density::student_t(y, f, &self.scale.value()?, self.df)
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        Ok(f.clone())
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        let var = (self.scale.value()?.sqr()? * (self.df / (self.df - 2.0)))?;
        f.ones_like()?.broadcast_mul(&var)
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.scale]
    }
}
