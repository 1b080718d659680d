//! Monte Carlo expectations under a diagonal Gaussian.
//!
//! Samples are drawn with the reparameterization `F = μ + σ ε`,
//! `ε ~ N(0, I)`, one draw per (sample, row, column). Unlike
//! [`crate::quadrature::ndiagquad`] the integrands see whole rows, so they
//! may couple the columns of `F` (e.g. a softmax over classes).

use candle_core::{bail, Device, Result, Tensor};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::quadrature::Integrand;

fn draw_normals<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<f64> {
    (0..count).map(|_| StandardNormal.sample(rng)).collect()
}

/// Standard normal samples of shape `(s, n, d)`; identical for identical
/// seeds.
pub fn standard_normal(
    (s, n, d): (usize, usize, usize),
    seed: Option<u64>,
    device: &Device,
) -> Result<Tensor> {
    let count = s * n * d;
    let values = match seed {
        Some(seed) => draw_normals(&mut StdRng::seed_from_u64(seed), count),
        None => draw_normals(&mut rand::rng(), count),
    };
    Tensor::from_vec(values, (s, n, d), device)
}

/// Average each of `funcs` over `num_samples` reparameterized draws.
///
/// # Arguments
/// * `funcs` - integrands; each receives `F` of shape `(S·N, D)` and, if
///   given, `Y` tiled to `(S·N, D_y)`; may return any number of columns
/// * `num_samples` - number of draws S (ignored when `epsilon` is given)
/// * `fmu`, `fvar` - `(N, D)` means and variances
/// * `logspace` - integrands return log-values; combine with log-mean-exp
/// * `epsilon` - optional `(S, N, D)` standard normal draws
/// * `seed` - seed for internally drawn samples
/// * `y` - `(N, D_y)` observations
///
/// # Returns
/// One `(N, ·)` tensor per integrand
#[allow(clippy::too_many_arguments)]
pub fn ndiag_mc(
    funcs: &[&Integrand],
    num_samples: usize,
    fmu: &Tensor,
    fvar: &Tensor,
    logspace: bool,
    epsilon: Option<&Tensor>,
    seed: Option<u64>,
    y: Option<&Tensor>,
) -> Result<Vec<Tensor>> {
    let (n, d) = fmu.dims2()?;
    if fvar.dims() != [n, d] {
        bail!(
            "ndiag_mc: Fmu {:?} and Fvar {:?} must have the same shape",
            fmu.dims(),
            fvar.dims()
        );
    }

    let epsilon = match epsilon {
        Some(eps) => {
            let (s, en, ed) = eps.dims3()?;
            if s == 0 || en != n || ed != d {
                bail!(
                    "ndiag_mc: epsilon {:?} does not match (S, {}, {})",
                    eps.dims(),
                    n,
                    d
                );
            }
            eps.to_dtype(fmu.dtype())?
        }
        None => {
            if num_samples == 0 {
                bail!("ndiag_mc: need at least one sample");
            }
            standard_normal((num_samples, n, d), seed, fmu.device())?.to_dtype(fmu.dtype())?
        }
    };
    let s = epsilon.dim(0)?;
    trace!("ndiag_mc: {} samples over ({}, {})", s, n, d);

    // F = μ + √σ² ε: (S, N, D) -> (S·N, D)
    let f_samples = epsilon
        .broadcast_mul(&fvar.sqrt()?.unsqueeze(0)?)?
        .broadcast_add(&fmu.unsqueeze(0)?)?
        .reshape((s * n, d))?;

    let y_samples = match y {
        Some(y) => {
            let (yn, yd) = y.dims2()?;
            if yn != n {
                bail!("ndiag_mc: Y has {} rows, Fmu has {}", yn, n);
            }
            Some(y.unsqueeze(0)?.repeat((s, 1, 1))?.reshape((s * n, yd))?)
        }
        None => None,
    };

    let log_s = (s as f64).ln();

    funcs
        .iter()
        .map(|func| {
            let feval = func(&f_samples, y_samples.as_ref())?;
            if feval.dim(0)? != s * n {
                bail!(
                    "ndiag_mc: integrand returned {:?}, expected {} rows",
                    feval.dims(),
                    s * n
                );
            }
            let feval = feval.reshape((s, n, ()))?;
            if logspace {
                (feval - log_s)?.log_sum_exp(0)
            } else {
                feval.mean(0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_seeded_draws_repeat() -> Result<()> {
        let a: Vec<f64> = standard_normal((4, 3, 2), Some(11), &Device::Cpu)?
            .flatten_all()?
            .to_vec1()?;
        let b: Vec<f64> = standard_normal((4, 3, 2), Some(11), &Device::Cpu)?
            .flatten_all()?
            .to_vec1()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_fixed_epsilon_moments() -> Result<()> {
        let dev = Device::Cpu;
        // symmetric draws ±1 reproduce mean and variance exactly
        let eps = Tensor::new(&[[[1.0f64, -1.0]], [[-1.0, 1.0]]], &dev)?;
        let fmu = Tensor::new(&[[0.5f64, -2.0]], &dev)?;
        let fvar = Tensor::new(&[[4.0f64, 0.25]], &dev)?;

        let first = |f: &Tensor, _y: Option<&Tensor>| -> Result<Tensor> { Ok(f.clone()) };
        let second = |f: &Tensor, _y: Option<&Tensor>| f.sqr();
        let out = ndiag_mc(&[&first, &second], 0, &fmu, &fvar, false, Some(&eps), None, None)?;

        let e1: Vec<f64> = out[0].flatten_all()?.to_vec1()?;
        let e2: Vec<f64> = out[1].flatten_all()?.to_vec1()?;
        assert_abs_diff_eq!(e1[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(e1[1], -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e2[0], 0.25 + 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e2[1], 4.0 + 0.25, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_row_wise_integrand_and_logspace() -> Result<()> {
        let dev = Device::Cpu;
        let fmu = Tensor::zeros((5, 3), candle_core::DType::F64, &dev)?;
        let fvar = Tensor::ones((5, 3), candle_core::DType::F64, &dev)?;
        let row_sum = |f: &Tensor, _y: Option<&Tensor>| f.sum_keepdim(1);
        let zero = |f: &Tensor, _y: Option<&Tensor>| f.narrow(1, 0, 1)?.zeros_like();

        let out = ndiag_mc(&[&row_sum], 50, &fmu, &fvar, false, None, Some(3), None)?;
        assert_eq!(out[0].dims(), &[5, 1]);

        let out = ndiag_mc(&[&zero], 50, &fmu, &fvar, true, None, Some(3), None)?;
        for v in out[0].flatten_all()?.to_vec1::<f64>()? {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_bad_epsilon_fails() -> Result<()> {
        let dev = Device::Cpu;
        let fmu = Tensor::zeros((2, 2), candle_core::DType::F64, &dev)?;
        let eps = Tensor::zeros((3, 2, 1), candle_core::DType::F64, &dev)?;
        let one = |f: &Tensor, _y: Option<&Tensor>| f.ones_like();
        assert!(ndiag_mc(&[&one], 3, &fmu, &fmu, false, Some(&eps), None, None).is_err());
        Ok(())
    }
}
