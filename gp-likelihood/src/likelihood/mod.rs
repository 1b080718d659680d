//! Concrete likelihoods.
//!
//! Continuous: [`Gaussian`], [`StudentT`], [`Exponential`], [`Gamma`],
//! [`Beta`]; count: [`Poisson`]; binary and ordinal: [`Bernoulli`],
//! [`Ordinal`]; categorical: [`MultiClass`] (RobustMax), [`SoftMax`]
//! (Monte Carlo). [`MonteCarlo`] turns any of them into a sampling-based
//! likelihood.

mod bernoulli;
mod beta;
mod exponential;
mod gamma;
mod gaussian;
mod monte_carlo;
mod multiclass;
mod ordinal;
mod poisson;
mod softmax;
mod student_t;

pub use bernoulli::Bernoulli;
pub use beta::Beta;
pub use exponential::Exponential;
pub use gamma::Gamma;
pub use gaussian::Gaussian;
pub use monte_carlo::{GaussianMC, MonteCarlo};
pub use multiclass::MultiClass;
pub use ordinal::Ordinal;
pub use poisson::Poisson;
pub use softmax::SoftMax;
pub use student_t::StudentT;

use candle_core::{bail, DType, Result, Tensor};

/// Flattened `u32` class indices from float labels, which must be
/// integers in `0..num_classes`
pub(crate) fn class_indices(name: &str, y: &Tensor, num_classes: usize) -> Result<Tensor> {
    let labels = y.flatten_all()?.to_dtype(DType::F64)?.to_vec1::<f64>()?;
    if let Some(bad) = labels
        .iter()
        .find(|v| v.fract() != 0.0 || **v < 0.0 || **v >= num_classes as f64)
    {
        bail!("{}: label {} outside 0..{}", name, bad, num_classes);
    }
    let idx = labels.into_iter().map(|v| v as u32).collect::<Vec<_>>();
    Tensor::from_vec(idx, y.elem_count(), y.device())
}
