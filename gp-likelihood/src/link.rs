//! Inverse-link functions mapping latent values into a likelihood's
//! parameter domain.

use std::fmt;
use std::sync::Arc;

use candle_core::{Device, Result, Tensor, D};
use candle_nn::encoding::one_hot;

use crate::log_density::normal_cdf;
use crate::param::{Parameter, Prior, Transform};
use crate::settings::{INV_PROBIT_JITTER, PROB_IS_LARGEST_CDF_JITTER, ROBUSTMAX_VAR_FLOOR};

/// Probit squeezed into `[jitter, 1 - jitter]`:
///
/// ```text
/// Φ(x) (1 - 2 jitter) + jitter
/// ```
pub fn inv_probit(x: &Tensor, jitter: f64) -> Result<Tensor> {
    normal_cdf(x)?.affine(1.0 - 2.0 * jitter, jitter)
}

/// User-supplied elementwise inverse link
pub type LinkFn = dyn Fn(&Tensor) -> Result<Tensor> + Send + Sync;

/// Inverse links, tagged so that likelihoods can pick a closed-form
/// expectation when one exists for the link in use.
#[derive(Clone)]
pub enum InvLink {
    Identity,
    Exp,
    Probit { jitter: f64 },
    RobustMax(RobustMax),
    Custom(Arc<LinkFn>),
}

impl fmt::Debug for InvLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::Exp => write!(f, "Exp"),
            Self::Probit { jitter } => write!(f, "Probit {{ jitter: {} }}", jitter),
            Self::RobustMax(r) => write!(f, "RobustMax({} classes)", r.num_classes()),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl InvLink {
    /// Probit with the default jitter
    pub fn probit() -> Self {
        Self::Probit {
            jitter: INV_PROBIT_JITTER,
        }
    }

    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&Tensor) -> Result<Tensor> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(func))
    }

    pub fn apply(&self, f: &Tensor) -> Result<Tensor> {
        match self {
            Self::Identity => Ok(f.clone()),
            Self::Exp => f.exp(),
            Self::Probit { jitter } => inv_probit(f, *jitter),
            Self::RobustMax(robust_max) => robust_max.apply(f),
            Self::Custom(func) => func(f),
        }
    }

    pub fn is_exp(&self) -> bool {
        matches!(self, Self::Exp)
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        match self {
            Self::RobustMax(robust_max) => vec![robust_max.epsilon()],
            _ => vec![],
        }
    }
}

/// Multi-class inverse link. For latent scores `f = [f_1, ..., f_K]`
///
/// ```text
/// y_i = 1 - ε        if i = argmax(f)
///       ε / (K - 1)  otherwise
/// ```
#[derive(Debug, Clone)]
pub struct RobustMax {
    num_classes: usize,
    epsilon: Parameter,
    cdf_jitter: f64,
}

impl RobustMax {
    /// `epsilon` is usually 1e-3 (see [`crate::MultiClass::new`]); it is held
    /// fixed (not trainable) with a Beta(0.2, 5) prior.
    pub fn new(num_classes: usize, epsilon: f64, device: &Device) -> Result<Self> {
        if num_classes < 2 {
            candle_core::bail!("RobustMax needs at least 2 classes, got {}", num_classes);
        }
        let epsilon = Parameter::new(epsilon, Transform::unit_interval(), device)?
            .with_trainable(false)
            .with_prior(Prior::Beta { a: 0.2, b: 5.0 });
        Ok(Self {
            num_classes,
            epsilon,
            cdf_jitter: PROB_IS_LARGEST_CDF_JITTER,
        })
    }

    pub fn with_cdf_jitter(mut self, jitter: f64) -> Self {
        self.cdf_jitter = jitter;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn epsilon(&self) -> &Parameter {
        &self.epsilon
    }

    /// ε / (K - 1), from the current value of ε
    pub fn eps_k1(&self) -> Result<Tensor> {
        self.epsilon.value()? / (self.num_classes as f64 - 1.0)
    }

    /// `(N, K)` one-hot of the row argmax valued `1 - ε` / `ε / (K - 1)`
    pub fn apply(&self, f: &Tensor) -> Result<Tensor> {
        let hit = self.one_hot(&f.argmax(D::Minus1)?, 1.0, 0.0)?;
        let eps = self.epsilon.value()?;
        let on = hit.broadcast_mul(&eps.affine(-1.0, 1.0)?)?;
        let off = hit.affine(-1.0, 1.0)?.broadcast_mul(&self.eps_k1()?)?;
        on + off
    }

    /// `(N, K)` one-hot encoding of integer-valued `labels` (any shape with
    /// N elements), in the float type of `like`.
    pub(crate) fn one_hot_like(&self, labels: &Tensor, like: &Tensor) -> Result<Tensor> {
        let n = labels.elem_count();
        let idx = labels.reshape(n)?.to_dtype(candle_core::DType::U32)?;
        self.one_hot(&idx, 1.0, 0.0)?.to_dtype(like.dtype())
    }

    fn one_hot(&self, idx: &Tensor, on: f64, off: f64) -> Result<Tensor> {
        let idx = idx.to_dtype(candle_core::DType::U32)?;
        one_hot(idx, self.num_classes, on, off)
    }

    /// Probability that the latent function of the observed class is the
    /// largest, under independent Gaussians `N(mu, var)` per class.
    ///
    /// The selected function is integrated on a Gauss-Hermite grid; for each
    /// grid value the probability that every other function lies below it
    /// is a product of Gaussian CDFs.
    ///
    /// # Arguments
    /// * `y` - observed labels, N elements
    /// * `mu`, `var` - `(N, K)` latent means and variances
    /// * `gh_x` - `(1, H)` Gauss-Hermite nodes
    /// * `gh_w` - `(H, 1)` Gauss-Hermite weights, normalized by √π
    ///
    /// # Returns
    /// `(N, 1)` probabilities
    pub fn prob_is_largest(
        &self,
        y: &Tensor,
        mu: &Tensor,
        var: &Tensor,
        gh_x: &Tensor,
        gh_w: &Tensor,
    ) -> Result<Tensor> {
        let oh_on = self.one_hot_like(y, mu)?;
        let oh_off = oh_on.affine(-1.0, 1.0)?;

        // mean and variance of the selected latent function: (N, 1)
        let mu_selected = (&oh_on * mu)?.sum_keepdim(1)?;
        let var_selected = (&oh_on * var)?.sum_keepdim(1)?;

        // grid over the selected function: (N, H)
        let sd_selected = (var_selected * 2.0)?
            .clamp(ROBUSTMAX_VAR_FLOOR, f64::INFINITY)?
            .sqrt()?;
        let x = gh_x
            .broadcast_mul(&sd_selected)?
            .broadcast_add(&mu_selected)?;

        // standardized distance of every latent function to the grid: (N, K, H)
        let sd = var.clamp(ROBUSTMAX_VAR_FLOOR, f64::INFINITY)?.sqrt()?;
        let dist = x
            .unsqueeze(1)?
            .broadcast_sub(&mu.unsqueeze(2)?)?
            .broadcast_div(&sd.unsqueeze(2)?)?;
        let cdfs = normal_cdf(&dist)?.affine(1.0 - 2.0 * self.cdf_jitter, self.cdf_jitter)?;

        // the selected function contributes a factor of one
        let cdfs = cdfs
            .broadcast_mul(&oh_off.unsqueeze(2)?)?
            .broadcast_add(&oh_on.unsqueeze(2)?)?;

        // product over classes (all factors ≥ jitter), then sum over the grid
        let prod = cdfs.log()?.sum(1)?.exp()?;
        prod.matmul(gh_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_inv_probit_bounds() -> Result<()> {
        let x = Tensor::new(&[-1e3f64, 0.0, 1e3], &Device::Cpu)?;
        let p: Vec<f64> = inv_probit(&x, 1e-3)?.to_vec1()?;
        assert_abs_diff_eq!(p[0], 1e-3, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p[2], 1.0 - 1e-3, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_links() -> Result<()> {
        let x = Tensor::new(&[0.0f64, 1.0], &Device::Cpu)?;
        let e: Vec<f64> = InvLink::Exp.apply(&x)?.to_vec1()?;
        assert_abs_diff_eq!(e[1], std::f64::consts::E, epsilon = 1e-12);
        let i: Vec<f64> = InvLink::Identity.apply(&x)?.to_vec1()?;
        assert_eq!(i, vec![0.0, 1.0]);
        let c: Vec<f64> = InvLink::custom(|f| f.sqr()?.affine(1.0, 1.0))
            .apply(&x)?
            .to_vec1()?;
        assert_eq!(c, vec![1.0, 2.0]);
        assert!(InvLink::Exp.is_exp());
        assert!(!InvLink::probit().is_exp());
        Ok(())
    }

    #[test]
    fn test_robustmax_rows() -> Result<()> {
        let dev = Device::Cpu;
        let k = 4;
        let eps = 0.1;
        let rm = RobustMax::new(k, eps, &dev)?;
        let f = Tensor::new(
            &[[0.1f64, 2.0, -1.0, 0.0], [3.0, 0.0, 0.0, 0.0], [-5.0, -4.0, -3.0, -2.0]],
            &dev,
        )?;
        let p: Vec<Vec<f64>> = rm.apply(&f)?.to_vec2()?;
        let argmax = [1usize, 0, 3];
        for (row, am) in p.iter().zip(argmax.iter()) {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            for (j, v) in row.iter().enumerate() {
                let want = if j == *am { 1.0 - eps } else { eps / (k as f64 - 1.0) };
                assert_abs_diff_eq!(*v, want, epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_eps_k1_tracks_assignment() -> Result<()> {
        let rm = RobustMax::new(3, 0.01, &Device::Cpu)?;
        let before: f64 = rm.eps_k1()?.to_scalar()?;
        assert_abs_diff_eq!(before, 0.005, epsilon = 1e-12);
        rm.epsilon().assign(0.2)?;
        let after: f64 = rm.eps_k1()?.to_scalar()?;
        assert_abs_diff_eq!(after, 0.1, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_prob_is_largest_symmetric_and_certain() -> Result<()> {
        let dev = Device::Cpu;
        let rm = RobustMax::new(3, 1e-3, &dev)?;
        let like = Tensor::zeros(1, candle_core::DType::F64, &dev)?;
        let (gh_x, gh_w) = crate::quadrature::hermgauss_tensors(20, &like)?;

        // identical latents: each class is largest with probability 1/3
        let mu = Tensor::zeros((2, 3), candle_core::DType::F64, &dev)?;
        let var = Tensor::ones((2, 3), candle_core::DType::F64, &dev)?;
        let y = Tensor::new(&[[0.0f64], [2.0]], &dev)?;
        let p: Vec<f64> = rm
            .prob_is_largest(&y, &mu, &var, &gh_x, &gh_w)?
            .flatten_all()?
            .to_vec1()?;
        for v in p {
            assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 2e-3);
        }

        // well-separated latent with tiny variance: almost surely the largest
        let mu = Tensor::new(&[[10.0f64, 0.0, 0.0]], &dev)?;
        let var = Tensor::new(&[[1e-4f64, 1e-4, 1e-4]], &dev)?;
        let y = Tensor::new(&[[0.0f64]], &dev)?;
        let p: f64 = rm
            .prob_is_largest(&y, &mu, &var, &gh_x, &gh_w)?
            .flatten_all()?
            .to_vec1::<f64>()?[0];
        assert_abs_diff_eq!(p, 1.0, epsilon = 1e-3);
        Ok(())
    }
}
