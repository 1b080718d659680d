//! Multi-class classification with the RobustMax link.

use candle_core::{bail, Device, Result, Tensor};
use log::debug;

use super::class_indices;
use crate::link::{InvLink, RobustMax};
use crate::param::Parameter;
use crate::quadrature::hermgauss_tensors;
use crate::settings::Integration;
use crate::traits::Likelihood;

/// Multi-class likelihood. `F` is `(N, K)` latent scores, `Y` is `(N, 1)`
/// integer labels in `0..K`.
///
/// The label is the argmax of `F` with probability `1 - ε` and any other
/// class with probability `ε / (K - 1)`. All expectations reduce to
/// `p = P(f_y is the largest)`, evaluated on a Gauss-Hermite grid whose
/// size is [`Likelihood::integration`]'s resolution.
#[derive(Debug, Clone)]
pub struct MultiClass {
    num_classes: usize,
    invlink: RobustMax,
    integration: Integration,
}

impl MultiClass {
    /// RobustMax link with ε = 1e-3
    pub fn new(num_classes: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            num_classes,
            invlink: RobustMax::new(num_classes, 1e-3, device)?,
            integration: Integration::default(),
        })
    }

    /// Only the RobustMax link has the expectations below.
    pub fn with_invlink(num_classes: usize, invlink: InvLink) -> Result<Self> {
        match invlink {
            InvLink::RobustMax(robust_max) if robust_max.num_classes() == num_classes => Ok(Self {
                num_classes,
                invlink: robust_max,
                integration: Integration::default(),
            }),
            InvLink::RobustMax(robust_max) => bail!(
                "MultiClass: link has {} classes, likelihood {}",
                robust_max.num_classes(),
                num_classes
            ),
            other => bail!("MultiClass: link {:?} is not implemented", other),
        }
    }

    /// Gauss-Hermite resolution of `prob_is_largest`; sampling is only
    /// available through [`crate::MonteCarlo`].
    pub fn with_integration(mut self, integration: Integration) -> Result<Self> {
        match integration {
            Integration::GaussHermite { num_points } if num_points > 0 => {
                self.integration = integration;
                Ok(self)
            }
            Integration::GaussHermite { .. } => {
                bail!("MultiClass: need at least one quadrature point")
            }
            Integration::MonteCarlo { .. } => {
                bail!("MultiClass: use MonteCarlo<MultiClass> for sampling")
            }
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn invlink(&self) -> &RobustMax {
        &self.invlink
    }

    /// `(N, 1)` probability that the latent of the observed class is the
    /// largest
    fn prob_is_largest(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        let (_, k) = fmu.dims2()?;
        if k != self.num_classes {
            bail!("MultiClass: F has {} columns, expected {}", k, self.num_classes);
        }
        let (gh_x, gh_w) = hermgauss_tensors(self.integration.resolution(), fmu)?;
        self.invlink.prob_is_largest(y, fmu, fvar, &gh_x, &gh_w)
    }

    /// p(Y) without the log, `(N, 1)`
    fn predict_non_logged_density(
        &self,
        fmu: &Tensor,
        fvar: &Tensor,
        y: &Tensor,
    ) -> Result<Tensor> {
        let p = self.prob_is_largest(fmu, fvar, y)?;
        let eps = self.invlink.epsilon().value()?;
        let hit = p.broadcast_mul(&eps.affine(-1.0, 1.0)?)?;
        let miss = p.affine(-1.0, 1.0)?.broadcast_mul(&self.invlink.eps_k1()?)?;
        hit + miss
    }
}

impl Likelihood for MultiClass {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        let (n, _) = f.dims2()?;
        let pred = f.argmax_keepdim(1)?;
        let labels = class_indices("MultiClass", y, self.num_classes)?.reshape((n, 1))?;
        let hits = pred.eq(&labels)?.to_dtype(f.dtype())?;

        let eps = self.invlink.epsilon().value()?;
        let yes = hits.broadcast_mul(&eps.affine(-1.0, 1.0)?)?;
        let no = hits.affine(-1.0, 1.0)?.broadcast_mul(&self.invlink.eps_k1()?)?;
        (yes + no)?.log()
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

    fn parameters(&self) -> Vec<&Parameter> {
        vec![self.invlink.epsilon()]
    }

    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        let p = self.prob_is_largest(fmu, fvar, y)?;
        let eps = self.invlink.epsilon().value()?;
        let log_hit = eps.affine(-1.0, 1.0)?.log()?;
        let log_miss = self.invlink.eps_k1()?.log()?;
        p.broadcast_mul(&log_hit)? + p.affine(-1.0, 1.0)?.broadcast_mul(&log_miss)?
    }

    fn predict_density(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        self.predict_non_logged_density(fmu, fvar, y)?.log()
    }

    /// Class probabilities `(N, K)` and their Bernoulli variances
    fn predict_mean_and_var(&self, fmu: &Tensor, fvar: &Tensor) -> Result<(Tensor, Tensor)> {
        let (n, _) = fmu.dims2()?;
        debug!("MultiClass: predicting {} rows over {} classes", n, self.num_classes);
        let ps = (0..self.num_classes)
            .map(|class| {
                let y = Tensor::full(class as f64, (n, 1), fmu.device())?.to_dtype(fmu.dtype())?;
                self.predict_non_logged_density(fmu, fvar, &y)
            })
            .collect::<Result<Vec<_>>>()?;
        let ps = Tensor::cat(&ps, 1)?;
        let var = (&ps - ps.sqr()?)?;
        Ok((ps, var))
    }
}
