//! Elementwise log-density primitives.
//!
//! Every function broadcasts its distribution parameters against the data,
//! so scalar parameters (rank-0 tensors) and per-element parameters can be
//! mixed freely.

use candle_core::{Result, Tensor};
use special::Gamma as SpecialGamma;

use crate::settings::BETA_DATA_CLIP;

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Log-gamma of positive tensors.
///
/// ```text
/// lgamma(x) = lgamma(x + 6) - log(x (x+1) ... (x+5))
/// lgamma(z) ≈ (z - ½) log z - z + ½ log 2π
///             + 1/(12z) - 1/(360z³) + 1/(1260z⁵) - 1/(1680z⁷)
/// ```
///
/// The shift keeps the Stirling series in its accurate range (error below
/// 1e-10 for any positive argument).
pub fn lgamma(x: &Tensor) -> Result<Tensor> {
    let mut log_shift = x.log()?;
    for k in 1..6 {
        log_shift = (log_shift + x.affine(1.0, k as f64)?.log()?)?;
    }

    let z = x.affine(1.0, 6.0)?;
    let z_inv = z.recip()?;
    let z_inv2 = z_inv.sqr()?;

    // Horner form of the correction series in 1/z²
    let series = z_inv2.affine(-1.0 / 1680.0, 1.0 / 1260.0)?;
    let series = (series * &z_inv2)?.affine(-1.0, 1.0 / 360.0)?;
    let series = (series * &z_inv2)?.affine(-1.0, 1.0 / 12.0)?;
    let series = (series * &z_inv)?;

    let stirling = ((z.affine(1.0, -0.5)? * z.log()?)? - &z)?;
    let stirling = ((stirling + 0.5 * LN_2PI)? + series)?;

    stirling - log_shift
}

/// Standard normal CDF: Φ(x) = ½ (1 + erf(x / √2))
pub fn normal_cdf(x: &Tensor) -> Result<Tensor> {
    (x * std::f64::consts::FRAC_1_SQRT_2)?
        .erf()?
        .affine(0.5, 0.5)
}

/// log N(x; mu, var)
pub fn gaussian(x: &Tensor, mu: &Tensor, var: &Tensor) -> Result<Tensor> {
    let sq = x.broadcast_sub(mu)?.sqr()?.broadcast_div(var)?;
    let log_var = var.log()?;
    (sq.broadcast_add(&log_var)? + LN_2PI)? * (-0.5)
}

/// log Poisson(x; lam) = x log(lam) - lam - lgamma(x + 1)
pub fn poisson(x: &Tensor, lam: &Tensor) -> Result<Tensor> {
    let x_log_lam = x.broadcast_mul(&lam.log()?)?;
    x_log_lam
        .broadcast_sub(lam)?
        .broadcast_sub(&lgamma(&x.affine(1.0, 1.0)?)?)
}

/// log Exponential(x; scale) = -x / scale - log(scale)
pub fn exponential(x: &Tensor, scale: &Tensor) -> Result<Tensor> {
    x.broadcast_div(scale)?
        .neg()?
        .broadcast_sub(&scale.log()?)
}

/// Student-t log-density with location `mean`, scale `scale` and `df`
/// degrees of freedom.
pub fn student_t(x: &Tensor, mean: &Tensor, scale: &Tensor, df: f64) -> Result<Tensor> {
    let log_norm = SpecialGamma::ln_gamma((df + 1.0) / 2.0).0
        - SpecialGamma::ln_gamma(df / 2.0).0
        - 0.5 * (df.ln() + std::f64::consts::PI.ln());
    let z = x.broadcast_sub(mean)?.broadcast_div(scale)?;
    let log_kernel = (z.sqr()? / df)?.affine(1.0, 1.0)?.log()? * (-0.5 * (df + 1.0));
    (log_kernel? + log_norm)?.broadcast_sub(&scale.log()?)
}

/// log Bernoulli(x; p) for x ∈ {0, 1}
pub fn bernoulli(x: &Tensor, p: &Tensor) -> Result<Tensor> {
    let p = p.broadcast_as(x.shape())?.contiguous()?;
    let q = p.affine(-1.0, 1.0)?;
    x.eq(1.0)?.where_cond(&p, &q)?.log()
}

/// log Gamma(x; shape, scale)
pub fn gamma(x: &Tensor, shape: &Tensor, scale: &Tensor) -> Result<Tensor> {
    let shape_log_scale = shape.broadcast_mul(&scale.log()?)?;
    let shape_m1_log_x = shape.affine(1.0, -1.0)?.broadcast_mul(&x.log()?)?;
    shape_m1_log_x
        .broadcast_sub(&shape_log_scale)?
        .broadcast_sub(&lgamma(shape)?)?
        .broadcast_sub(&x.broadcast_div(scale)?)
}

/// log Beta(x; alpha, beta), data clipped into `[c, 1 - c]`
pub fn beta(x: &Tensor, alpha: &Tensor, beta: &Tensor) -> Result<Tensor> {
    let x = x.clamp(BETA_DATA_CLIP, 1.0 - BETA_DATA_CLIP)?;
    let a_term = alpha.affine(1.0, -1.0)?.broadcast_mul(&x.log()?)?;
    let b_term = beta
        .affine(1.0, -1.0)?
        .broadcast_mul(&x.affine(-1.0, 1.0)?.log()?)?;
    let log_norm = lgamma(&alpha.broadcast_add(beta)?)?
        .broadcast_sub(&lgamma(alpha)?)?
        .broadcast_sub(&lgamma(beta)?)?;
    a_term.broadcast_add(&b_term)?.broadcast_add(&log_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};

    fn scalar(x: f64) -> Result<Tensor> {
        Tensor::new(x, &Device::Cpu)
    }

    #[test]
    fn test_lgamma_matches_special() -> Result<()> {
        let xs = vec![1e-3, 0.2, 0.5, 1.0, 2.0, 3.7, 10.0, 123.4];
        let x = Tensor::from_vec(xs.clone(), xs.len(), &Device::Cpu)?;
        let lg: Vec<f64> = lgamma(&x)?.to_vec1()?;
        for (xi, gi) in xs.iter().zip(lg.iter()) {
            let expected = SpecialGamma::ln_gamma(*xi).0;
            assert_abs_diff_eq!(*gi, expected, epsilon = 1e-8);
        }
        Ok(())
    }

    #[test]
    fn test_gaussian_at_mean() -> Result<()> {
        let x = Tensor::zeros((2, 3), DType::F64, &Device::Cpu)?;
        let lp = gaussian(&x, &x, &scalar(1.0)?)?;
        for v in lp.flatten_all()?.to_vec1::<f64>()? {
            assert_abs_diff_eq!(v, -0.5 * LN_2PI, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_poisson_pmf_sums_to_one() -> Result<()> {
        let ys: Vec<f64> = (0..60).map(|y| y as f64).collect();
        let x = Tensor::from_vec(ys, 60, &Device::Cpu)?;
        let lp = poisson(&x, &scalar(3.5)?)?;
        let total: f64 = lp.exp()?.sum_all()?.to_scalar()?;
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
        Ok(())
    }

    #[test]
    fn test_bernoulli_picks_branch() -> Result<()> {
        let x = Tensor::new(&[1.0f64, 0.0], &Device::Cpu)?;
        let p = Tensor::new(&[0.8f64, 0.8], &Device::Cpu)?;
        let lp: Vec<f64> = bernoulli(&x, &p)?.to_vec1()?;
        assert_abs_diff_eq!(lp[0], 0.8f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(lp[1], 0.2f64.ln(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_student_t_approaches_gaussian() -> Result<()> {
        let x = Tensor::new(&[-1.0f64, 0.3, 2.0], &Device::Cpu)?;
        let zero = scalar(0.0)?;
        let one = scalar(1.0)?;
        let t: Vec<f64> = student_t(&x, &zero, &one, 1e7)?.to_vec1()?;
        let g: Vec<f64> = gaussian(&x, &zero, &one)?.to_vec1()?;
        for (a, b) in t.iter().zip(g.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_student_t_one_df_is_cauchy() -> Result<()> {
        let x = Tensor::new(&[-2.0f64, 0.0, 0.5], &Device::Cpu)?;
        let scale = 1.5;
        let t: Vec<f64> = student_t(&x, &scalar(0.0)?, &scalar(scale)?, 1.0)?.to_vec1()?;
        for (xi, ti) in [-2.0f64, 0.0, 0.5].iter().zip(t.iter()) {
            let z = xi / scale;
            let cauchy = -(std::f64::consts::PI * scale * (1.0 + z * z)).ln();
            assert_abs_diff_eq!(*ti, cauchy, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_exponential_and_gamma_agree_at_unit_shape() -> Result<()> {
        let x = Tensor::new(&[0.1f64, 1.0, 4.0], &Device::Cpu)?;
        let scale = Tensor::new(&[0.5f64, 2.0, 3.0], &Device::Cpu)?;
        let e: Vec<f64> = exponential(&x, &scale)?.to_vec1()?;
        let g: Vec<f64> = gamma(&x, &scalar(1.0)?, &scale)?.to_vec1()?;
        for (a, b) in e.iter().zip(g.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_beta_uniform() -> Result<()> {
        let x = Tensor::new(&[0.1f64, 0.5, 0.9], &Device::Cpu)?;
        let one = scalar(1.0)?;
        for v in beta(&x, &one, &one)?.to_vec1::<f64>()? {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_normal_cdf() -> Result<()> {
        let x = Tensor::new(&[0.0f64, 1.959_963_984_540_054], &Device::Cpu)?;
        let c: Vec<f64> = normal_cdf(&x)?.to_vec1()?;
        assert_abs_diff_eq!(c[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c[1], 0.975, epsilon = 1e-7);
        Ok(())
    }
}
