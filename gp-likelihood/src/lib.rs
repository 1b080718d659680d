//! Likelihoods for Gaussian process models.
//!
//! A [`traits::Likelihood`] relates latent function values `F` to
//! observations `Y`. Given a diagonal Gaussian `q(F) = N(Fmu, Fvar)` every
//! likelihood computes predictive moments, log predictive densities and
//! expected log-densities, either in closed form or with Gauss-Hermite
//! quadrature ([`quadrature`]) or Monte Carlo sampling ([`monte_carlo`]).

pub mod likelihood;
pub mod link;
pub mod log_density;
pub mod monte_carlo;
pub mod param;
pub mod quadrature;
pub mod settings;
pub mod switched;
pub mod traits;

pub use likelihood::{
    Bernoulli, Beta, Exponential, Gamma, Gaussian, GaussianMC, MonteCarlo, MultiClass, Ordinal,
    Poisson, SoftMax, StudentT,
};
pub use link::{InvLink, RobustMax};
pub use param::{Parameter, Prior, Transform};
pub use settings::Integration;
pub use switched::{Partition, SwitchedLikelihood};
pub use traits::Likelihood;

pub use candle_core;
pub use candle_nn;
