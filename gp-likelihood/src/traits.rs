use candle_core::{Result, Tensor, Var};

use crate::monte_carlo::ndiag_mc;
use crate::param::Parameter;
use crate::quadrature::{ndiagquad, Integrand};
use crate::settings::Integration;

/// Observation model p(Y|F).
///
/// Implementors provide the log-density and the first two conditional
/// moments. The three expectations under q(F) = N(Fmu, Fvar) default to
/// numerical integration with the engine named by [`Likelihood::integration`]
/// and can be overridden with closed forms.
///
/// Shapes: `F`, `Fmu`, `Fvar` are `(N, P)`, `Y` is `(N, P)` (or `(N, 1)`
/// labels for multi-class likelihoods).
pub trait Likelihood {
    /// log p(Y|F), elementwise
    fn logp(&self, f: &Tensor, y: &Tensor) -> Result<Tensor>;

    /// E[Y|F]
    fn conditional_mean(&self, f: &Tensor) -> Result<Tensor>;

    /// Var[Y|F], non-negative
    fn conditional_variance(&self, f: &Tensor) -> Result<Tensor>;

    /// Engine and resolution used by the generic expectations
    fn integration(&self) -> Integration;

    /// Learnable parameters of this likelihood
    fn parameters(&self) -> Vec<&Parameter> {
        vec![]
    }

    /// Predictive mean and variance of Y:
    ///
    /// ```text
    /// E[Y]   = ∫ E[Y|F] q(F) dF
    /// Var[Y] = ∫ (Var[Y|F] + E[Y|F]²) q(F) dF - E[Y]²
    /// ```
    fn predict_mean_and_var(&self, fmu: &Tensor, fvar: &Tensor) -> Result<(Tensor, Tensor)> {
        generic_predict_mean_and_var(self, fmu, fvar, None)
    }

    /// Log predictive density: log ∫ p(Y|F) q(F) dF
    fn predict_density(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        generic_predict_density(self, fmu, fvar, y, None)
    }

    /// Expected log-density: ∫ log p(Y|F) q(F) dF
    fn variational_expectations(&self, fmu: &Tensor, fvar: &Tensor, y: &Tensor) -> Result<Tensor> {
        generic_variational_expectations(self, fmu, fvar, y, None)
    }
}

/// Dispatch integrands to the engine selected by `integration`.
///
/// `epsilon` only applies to Monte Carlo integration.
pub fn integrate(
    integration: Integration,
    funcs: &[&Integrand],
    fmu: &Tensor,
    fvar: &Tensor,
    logspace: bool,
    epsilon: Option<&Tensor>,
    y: Option<&Tensor>,
) -> Result<Vec<Tensor>> {
    match integration {
        Integration::GaussHermite { num_points } => {
            ndiagquad(funcs, num_points, fmu, fvar, logspace, y)
        }
        Integration::MonteCarlo { num_samples, seed } => {
            ndiag_mc(funcs, num_samples, fmu, fvar, logspace, epsilon, seed, y)
        }
    }
}

/// Engine-based predictive moments; both integrands share one set of
/// nodes or samples.
pub fn generic_predict_mean_and_var<L: Likelihood + ?Sized>(
    lik: &L,
    fmu: &Tensor,
    fvar: &Tensor,
    epsilon: Option<&Tensor>,
) -> Result<(Tensor, Tensor)> {
    let mean = |f: &Tensor, _y: Option<&Tensor>| lik.conditional_mean(f);
    let second_moment = |f: &Tensor, _y: Option<&Tensor>| -> Result<Tensor> {
        lik.conditional_variance(f)? + lik.conditional_mean(f)?.sqr()?
    };
    let mut moments = integrate(
        lik.integration(),
        &[&mean, &second_moment],
        fmu,
        fvar,
        false,
        epsilon,
        None,
    )?;
    let e_y2 = moments.pop();
    let e_y = moments.pop();
    match (e_y, e_y2) {
        (Some(e_y), Some(e_y2)) => {
            let v_y = (e_y2 - e_y.sqr()?)?;
            Ok((e_y, v_y))
        }
        _ => candle_core::bail!("integration returned fewer than two moments"),
    }
}

/// Engine-based log predictive density, accumulated in log-space
pub fn generic_predict_density<L: Likelihood + ?Sized>(
    lik: &L,
    fmu: &Tensor,
    fvar: &Tensor,
    y: &Tensor,
    epsilon: Option<&Tensor>,
) -> Result<Tensor> {
    single(integrate_logp(lik, fmu, fvar, y, true, epsilon)?)
}

/// Engine-based expected log-density
pub fn generic_variational_expectations<L: Likelihood + ?Sized>(
    lik: &L,
    fmu: &Tensor,
    fvar: &Tensor,
    y: &Tensor,
    epsilon: Option<&Tensor>,
) -> Result<Tensor> {
    single(integrate_logp(lik, fmu, fvar, y, false, epsilon)?)
}

fn integrate_logp<L: Likelihood + ?Sized>(
    lik: &L,
    fmu: &Tensor,
    fvar: &Tensor,
    y: &Tensor,
    logspace: bool,
    epsilon: Option<&Tensor>,
) -> Result<Vec<Tensor>> {
    let logp = |f: &Tensor, y: Option<&Tensor>| -> Result<Tensor> {
        match y {
            Some(y) => lik.logp(f, y),
            None => candle_core::bail!("logp integrand needs observations"),
        }
    };
    integrate(lik.integration(), &[&logp], fmu, fvar, logspace, epsilon, Some(y))
}

fn single(mut out: Vec<Tensor>) -> Result<Tensor> {
    match out.pop() {
        Some(t) => Ok(t),
        None => candle_core::bail!("integration returned no result"),
    }
}

/// Sum of the prior log-densities of all parameters, `None` when no
/// parameter carries a prior
pub fn log_prior<L: Likelihood + ?Sized>(lik: &L) -> Result<Option<Tensor>> {
    let mut total: Option<Tensor> = None;
    for param in lik.parameters() {
        if let Some(lp) = param.log_prior()? {
            total = Some(match total {
                Some(t) => (t + lp)?,
                None => lp,
            });
        }
    }
    Ok(total)
}

/// Unconstrained variables an optimizer should update
pub fn trainable_vars<L: Likelihood + ?Sized>(lik: &L) -> Vec<Var> {
    lik.parameters()
        .into_iter()
        .filter(|p| p.is_trainable())
        .map(|p| p.var().clone())
        .collect()
}
