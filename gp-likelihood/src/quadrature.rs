//! Gauss-Hermite quadrature against independent Gaussian marginals.
//!
//! For every latent element with mean μ and variance σ² we approximate
//!
//! ```text
//! ∫ g(f) N(f; μ, σ²) df ≈ Σᵢ wᵢ/√π · g(μ + √(2σ²) xᵢ)
//! ```
//!
//! where `(xᵢ, wᵢ)` is the physicists' Gauss-Hermite rule for the weight
//! `exp(-x²)`. Rules are computed once per node count and cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use candle_core::{bail, Result, Tensor};
use log::debug;

/// A vector-valued integrand evaluated on latent samples `F`, optionally
/// together with observations `Y` laid out on the same grid.
pub type Integrand<'a> = dyn Fn(&Tensor, Option<&Tensor>) -> Result<Tensor> + 'a;

const MAX_NEWTON_ITER: usize = 100;
const NEWTON_TOL: f64 = 1e-14;
const MAX_QL_ITER: usize = 60;
/// The recurrence is rescaled whenever it grows past this magnitude
const RESCALE_THRESHOLD: f64 = 1e100;
/// π^(-1/4)
const PI_POW_NEG_QUARTER: f64 = 0.751_125_544_464_942_5;

/// Nodes and weights of the `n`-point Gauss-Hermite rule (weights sum to √π)
#[derive(Debug, Clone)]
pub struct GaussHermite {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl GaussHermite {
    /// Nodes start from the eigenvalues of the Jacobi matrix of the Hermite
    /// recurrence (Golub-Welsch) and are polished by Newton's method on the
    /// orthonormal three-term recurrence, which also yields the weights.
    /// Nodes come out in ascending order.
    pub fn compute(n: usize) -> Result<Self> {
        let mut nodes = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for z in jacobi_eigenvalues(n)? {
            let (node, log_weight) = newton_polish(n, z);
            nodes.push(node);
            weights.push(log_weight.exp());
        }
        Ok(Self { nodes, weights })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Eigenvalues of the `n × n` Jacobi matrix with zero diagonal and
/// off-diagonal `√(i/2)`, by implicit QL with Wilkinson shifts. Sorted.
fn jacobi_eigenvalues(n: usize) -> Result<Vec<f64>> {
    let mut d = vec![0.0f64; n];
    let mut e: Vec<f64> = (1..=n)
        .map(|i| if i < n { (i as f64 / 2.0).sqrt() } else { 0.0 })
        .collect();

    for l in 0..n {
        let mut iter = 0;
        loop {
            let mut m = l;
            while m + 1 < n {
                let dd = d[m].abs() + d[m + 1].abs();
                if e[m].abs() <= f64::EPSILON * dd {
                    break;
                }
                m += 1;
            }
            if m == l {
                break;
            }
            iter += 1;
            if iter > MAX_QL_ITER {
                bail!("Gauss-Hermite: eigenvalue {} of {} did not converge", l, n);
            }

            let mut g = (d[l + 1] - d[l]) / (2.0 * e[l]);
            let mut r = g.hypot(1.0);
            g = d[m] - d[l] + e[l] / (g + r.copysign(g));
            let (mut s, mut c, mut p) = (1.0, 1.0, 0.0);
            let mut deflated = false;
            for i in (l..m).rev() {
                let f = s * e[i];
                let b = c * e[i];
                r = f.hypot(g);
                e[i + 1] = r;
                if r == 0.0 {
                    d[i + 1] -= p;
                    e[m] = 0.0;
                    deflated = true;
                    break;
                }
                s = f / r;
                c = g / r;
                g = d[i + 1] - p;
                r = (d[i] - g) * s + 2.0 * c * b;
                p = s * r;
                d[i + 1] = g + p;
                g = c * r - b;
            }
            if deflated {
                continue;
            }
            d[l] -= p;
            e[l] = g;
            e[m] = 0.0;
        }
    }

    d.sort_by(|a, b| a.total_cmp(b));
    Ok(d)
}

/// Newton iteration from `z` towards a root of the orthonormal Hermite
/// polynomial of degree `n`. Returns the root and the log of its weight.
fn newton_polish(n: usize, mut z: f64) -> (f64, f64) {
    let nf = n as f64;
    let mut log_weight = 0.0;
    for _ in 0..MAX_NEWTON_ITER {
        let mut p1 = PI_POW_NEG_QUARTER;
        let mut p2 = 0.0;
        let mut log_scale = 0.0;
        for j in 1..=n {
            let jf = j as f64;
            let p3 = p2;
            p2 = p1;
            p1 = z * (2.0 / jf).sqrt() * p2 - ((jf - 1.0) / jf).sqrt() * p3;
            if p1.abs() > RESCALE_THRESHOLD {
                p1 /= RESCALE_THRESHOLD;
                p2 /= RESCALE_THRESHOLD;
                log_scale += RESCALE_THRESHOLD.ln();
            }
        }
        let pp = (2.0 * nf).sqrt() * p2;
        // w = 2 / pp², with pp carrying the accumulated scale
        log_weight = std::f64::consts::LN_2 - 2.0 * (log_scale + pp.abs().ln());
        let z_prev = z;
        z = z_prev - p1 / pp;
        if (z - z_prev).abs() <= NEWTON_TOL * z_prev.abs().max(1.0) {
            break;
        }
    }
    (z, log_weight)
}

fn rule_cache() -> &'static Mutex<HashMap<usize, Arc<GaussHermite>>> {
    static CACHE: OnceLock<Mutex<HashMap<usize, Arc<GaussHermite>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Cached `n`-point Gauss-Hermite rule
pub fn hermgauss(n: usize) -> Result<Arc<GaussHermite>> {
    let mut cache = rule_cache().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(rule) = cache.get(&n) {
        return Ok(rule.clone());
    }
    debug!("building {}-point Gauss-Hermite rule", n);
    let rule = Arc::new(GaussHermite::compute(n)?);
    cache.insert(n, rule.clone());
    Ok(rule)
}

/// Gauss-Hermite nodes `(1, n)` and normalized weights `(n, 1)` as tensors
/// on the device/dtype of `like`.
pub fn hermgauss_tensors(n: usize, like: &Tensor) -> Result<(Tensor, Tensor)> {
    if n == 0 {
        bail!("Gauss-Hermite: need at least one node");
    }
    let rule = hermgauss(n)?;
    let dev = like.device();
    let norm = std::f64::consts::PI.sqrt().recip();
    let w: Vec<f64> = rule.weights.iter().map(|w| w * norm).collect();
    let gh_x = Tensor::from_slice(&rule.nodes, (1, n), dev)?.to_dtype(like.dtype())?;
    let gh_w = Tensor::from_vec(w, (n, 1), dev)?.to_dtype(like.dtype())?;
    Ok((gh_x, gh_w))
}

/// Integrate each of `funcs` against N(fmu, fvar), elementwise.
///
/// # Arguments
/// * `funcs` - integrands; each receives `F` of shape `(M, n)` with
///   `M = fmu.elem_count()` and, if given, `Y` tiled to the same shape, and
///   must return `(M, n)`
/// * `num_points` - number of Gauss-Hermite nodes
/// * `fmu`, `fvar` - marginal means and variances, any (equal) shape
/// * `logspace` - integrands return log-values; combine with log-sum-exp
/// * `y` - observations with exactly `M` elements
///
/// # Returns
/// One tensor per integrand, shaped like `fmu`
pub fn ndiagquad(
    funcs: &[&Integrand],
    num_points: usize,
    fmu: &Tensor,
    fvar: &Tensor,
    logspace: bool,
    y: Option<&Tensor>,
) -> Result<Vec<Tensor>> {
    if fmu.shape() != fvar.shape() {
        bail!(
            "ndiagquad: Fmu {:?} and Fvar {:?} must have the same shape",
            fmu.dims(),
            fvar.dims()
        );
    }
    if num_points == 0 {
        bail!("ndiagquad: need at least one quadrature point");
    }

    let dims = fmu.dims().to_vec();
    let m = fmu.elem_count();
    let (gh_x, gh_w) = hermgauss_tensors(num_points, fmu)?;

    // F = μ + √(2σ²) x: (M, n)
    let mu = fmu.reshape((m, 1))?;
    let sd = fvar.reshape((m, 1))?.affine(2.0, 0.0)?.sqrt()?;
    let f_grid = gh_x.broadcast_mul(&sd)?.broadcast_add(&mu)?;

    let y_grid = match y {
        Some(y) => {
            if y.elem_count() != m {
                bail!(
                    "ndiagquad: Y {:?} does not match Fmu {:?}",
                    y.dims(),
                    fmu.dims()
                );
            }
            Some(
                y.reshape((m, 1))?
                    .broadcast_as((m, num_points))?
                    .contiguous()?,
            )
        }
        None => None,
    };

    let log_w = if logspace { Some(gh_w.log()?.t()?) } else { None };

    funcs
        .iter()
        .map(|func| {
            let feval = func(&f_grid, y_grid.as_ref())?;
            if feval.dims() != [m, num_points] {
                bail!(
                    "ndiagquad: integrand returned {:?}, expected {:?}",
                    feval.dims(),
                    [m, num_points]
                );
            }
            let out = match &log_w {
                Some(log_w) => feval.broadcast_add(log_w)?.log_sum_exp(1)?,
                None => feval.matmul(&gh_w)?,
            };
            out.reshape(dims.as_slice())
        })
        .collect()
}
