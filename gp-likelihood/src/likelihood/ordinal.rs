//! Ordinal likelihood for ordered categories.

use candle_core::{bail, Device, Result, Tensor};

use super::class_indices;
use crate::link::inv_probit;
use crate::param::Parameter;
use crate::settings::{Integration, INV_PROBIT_JITTER, ORDINAL_LOG_JITTER};
use crate::traits::Likelihood;

/// Ordinal likelihood over `K = bin_edges.len() + 1` ordered classes
/// labelled `0..K`.
///
/// Class `k` covers the interval `(b_{k-1}, b_k]` of the noisy latent,
/// with `b_{-1} = -∞` and `b_{K-1} = +∞`:
///
/// ```text
/// p(y = k | f) = Φ((b_k - f) / σ) - Φ((b_{k-1} - f) / σ)
/// ```
///
/// `bin_edges` must be increasing. The probabilities use the jittered
/// probit and a small additive jitter inside the log.
#[derive(Debug, Clone)]
pub struct Ordinal {
    bin_edges: Vec<f64>,
    sigma: Parameter,
    jitter: f64,
    probit_jitter: f64,
    integration: Integration,
}

impl Ordinal {
    pub fn new(bin_edges: Vec<f64>, sigma: f64, device: &Device) -> Result<Self> {
        if bin_edges.windows(2).any(|w| w[0] >= w[1]) {
            bail!("Ordinal: bin edges must be strictly increasing: {:?}", bin_edges);
        }
        Ok(Self {
            bin_edges,
            sigma: Parameter::positive(sigma, device)?,
            jitter: ORDINAL_LOG_JITTER,
            probit_jitter: INV_PROBIT_JITTER,
            integration: Integration::default(),
        })
    }

    /// Additive jitter inside the log of the class probability
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    pub fn num_bins(&self) -> usize {
        self.bin_edges.len() + 1
    }

    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    pub fn sigma(&self) -> &Parameter {
        &self.sigma
    }

    /// Scaled upper and lower class boundaries, each `(K,)`
    fn scaled_bounds(&self, like: &Tensor) -> Result<(Tensor, Tensor)> {
        let dev = like.device();
        let sigma = self.sigma.value()?;
        let edges = Tensor::from_slice(&self.bin_edges, self.bin_edges.len(), dev)?
            .to_dtype(like.dtype())?
            .broadcast_div(&sigma)?;
        let inf = Tensor::new(&[f64::INFINITY], dev)?.to_dtype(like.dtype())?;
        let upper = Tensor::cat(&[&edges, &inf], 0)?;
        let lower = Tensor::cat(&[&inf.neg()?, &edges], 0)?;
        Ok((upper, lower))
    }

    /// `(M, K)` class probabilities for every element of `f`
    fn class_probabilities(&self, f: &Tensor) -> Result<Tensor> {
        let (upper, lower) = self.scaled_bounds(f)?;
        let scaled_f = f
            .reshape((f.elem_count(), 1))?
            .broadcast_div(&self.sigma.value()?)?;
        let upper = upper.unsqueeze(0)?.broadcast_sub(&scaled_f)?;
        let lower = lower.unsqueeze(0)?.broadcast_sub(&scaled_f)?;
        inv_probit(&upper, self.probit_jitter)? - inv_probit(&lower, self.probit_jitter)?
    }

    /// `(K, 1)` class labels as floats
    fn class_labels(&self, like: &Tensor) -> Result<Tensor> {
        Tensor::arange(0u32, self.num_bins() as u32, like.device())?
            .to_dtype(like.dtype())?
            .reshape((self.num_bins(), 1))
    }
}

impl Likelihood for Ordinal {
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor> {
        if f.dims() != y.dims() {
            bail!("Ordinal: F {:?} and Y {:?} must match", f.dims(), y.dims());
        }
        let idx = class_indices("Ordinal", y, self.num_bins())?;

        let (upper, lower) = self.scaled_bounds(f)?;
        let upper = upper.index_select(&idx, 0)?.reshape(f.shape())?;
        let lower = lower.index_select(&idx, 0)?.reshape(f.shape())?;
        let scaled_f = f.broadcast_div(&self.sigma.value()?)?;

        let hi = inv_probit(&(upper - &scaled_f)?, self.probit_jitter)?;
        let lo = inv_probit(&(lower - &scaled_f)?, self.probit_jitter)?;
        ((hi - lo)? + self.jitter)?.log()
    }

    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor> {
        let phi = self.class_probabilities(f)?;
        phi.matmul(&self.class_labels(f)?)?.reshape(f.shape())
    }

    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor> {
        let phi = self.class_probabilities(f)?;
        let labels = self.class_labels(f)?;
        let e_y = phi.matmul(&labels)?;
        let e_y2 = phi.matmul(&labels.sqr()?)?;
        (e_y2 - e_y.sqr()?)?.reshape(f.shape())
    }

    fn integration(&self) -> Integration {
        self.integration
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.sigma]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::test_util::{assert_non_negative, random_marginals};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_two_classes_sum_to_one() -> Result<()> {
        let lik = Ordinal::new(vec![0.0], 1.0, &Device::Cpu)?;
        let f = Tensor::new(&[[-1.5f64], [0.0], [0.7]], &Device::Cpu)?;
        let zeros = f.zeros_like()?;
        let ones = f.ones_like()?;
        let p0: Vec<f64> = lik.logp(&f, &zeros)?.exp()?.flatten_all()?.to_vec1()?;
        let p1: Vec<f64> = lik.logp(&f, &ones)?.exp()?.flatten_all()?.to_vec1()?;
        // the jittered probit leaves 2 jitter of mass outside the classes
        let total = 1.0 - 2.0 * INV_PROBIT_JITTER + 2.0 * ORDINAL_LOG_JITTER;
        for (a, b) in p0.iter().zip(p1.iter()) {
            assert_abs_diff_eq!(a + b, total, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(p0[1], 0.5 * total, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_conditional_moments() -> Result<()> {
        let lik = Ordinal::new(vec![-1.0, 0.0, 1.0], 0.5, &Device::Cpu)?;
        let f = Tensor::new(&[[-3.0f64, 0.5], [3.0, 0.0]], &Device::Cpu)?;
        let m: Vec<f64> = lik.conditional_mean(&f)?.flatten_all()?.to_vec1()?;
        let v = lik.conditional_variance(&f)?;
        assert_eq!(v.dims(), &[2, 2]);
        assert_non_negative(&v)?;

        // far below the first edge: class 0; far above the last: class 3
        assert_abs_diff_eq!(m[0], 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(m[2], 3.0, epsilon = 1e-2);
        // centred on the middle edge: symmetric around 1.5
        assert_abs_diff_eq!(m[3], 1.5 * (1.0 - 2.0 * INV_PROBIT_JITTER), epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_expectations_and_label_checks() -> Result<()> {
        let lik = Ordinal::new(vec![-0.5, 0.5], 1.0, &Device::Cpu)?;
        let (fmu, fvar) = random_marginals(4, 1, 19)?;
        let y = Tensor::new(&[[0.0f64], [2.0], [1.0], [1.0]], &Device::Cpu)?;
        let ve: Vec<f64> = lik
            .variational_expectations(&fmu, &fvar, &y)?
            .flatten_all()?
            .to_vec1()?;
        let pd: Vec<f64> = lik.predict_density(&fmu, &fvar, &y)?.flatten_all()?.to_vec1()?;
        for (e, d) in ve.iter().zip(pd.iter()) {
            // Jensen: E[log p] ≤ log E[p]
            assert!(e.is_finite() && *e <= d + 1e-9);
        }

        let bad = Tensor::new(&[[0.0f64], [3.0], [1.0], [1.0]], &Device::Cpu)?;
        assert!(lik.logp(&fmu, &bad).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_unsorted_edges() {
        assert!(Ordinal::new(vec![1.0, 0.0], 1.0, &Device::Cpu).is_err());
    }
}
