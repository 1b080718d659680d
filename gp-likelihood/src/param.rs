//! Learnable scalar parameters with domain-constraining transforms.
//!
//! A [`Parameter`] stores an unconstrained `Var`; the constrained value is
//! recomputed from it on every call to [`Parameter::value`], so values
//! assigned by an optimizer between evaluations are always picked up.

use candle_core::{Device, Result, Tensor, Var};
use candle_nn::ops;
use special::Gamma as SpecialGamma;

use crate::log_density;
use crate::settings::{FLOAT_TYPE, POSITIVE_LOWER};

/// Bijection from the unconstrained real line to a parameter's domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    /// softplus(x) + lower, domain `(lower, ∞)`
    Positive { lower: f64 },
    /// a + (b - a) * sigmoid(x), domain `(a, b)`
    Logistic { a: f64, b: f64 },
}

impl Transform {
    pub fn positive() -> Self {
        Self::Positive {
            lower: POSITIVE_LOWER,
        }
    }

    pub fn unit_interval() -> Self {
        Self::Logistic { a: 0.0, b: 1.0 }
    }

    /// unconstrained -> constrained
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::Identity => Ok(x.clone()),
            Self::Positive { lower } => {
                // softplus(x) = relu(x) + log(1 + exp(-|x|))
                let tail = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
                (x.relu()? + tail)? + *lower
            }
            Self::Logistic { a, b } => ops::sigmoid(x)?.affine(b - a, *a),
        }
    }

    /// constrained -> unconstrained
    pub fn backward(&self, y: f64) -> f64 {
        match self {
            Self::Identity => y,
            Self::Positive { lower } => {
                let z = y - lower;
                // log(exp(z) - 1), written to avoid overflow for large z
                z + (-(-z).exp_m1()).ln()
            }
            Self::Logistic { a, b } => {
                let u = (y - a) / (b - a);
                (u / (1.0 - u)).ln()
            }
        }
    }
}

/// Prior attached to a parameter's constrained value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    Gaussian { mean: f64, var: f64 },
    Gamma { shape: f64, scale: f64 },
    Beta { a: f64, b: f64 },
}

impl Prior {
    pub fn log_density(&self, value: &Tensor) -> Result<Tensor> {
        let dev = value.device();
        let dtype = value.dtype();
        let constant = |v: f64| Tensor::new(v, dev)?.to_dtype(dtype);
        match self {
            Self::Gaussian { mean, var } => {
                log_density::gaussian(value, &constant(*mean)?, &constant(*var)?)
            }
            Self::Gamma { shape, scale } => {
                log_density::gamma(value, &constant(*shape)?, &constant(*scale)?)
            }
            Self::Beta { a, b } => {
                // density on (0, 1), no clipping of the parameter value
                let log_norm = SpecialGamma::ln_gamma(a + b).0
                    - SpecialGamma::ln_gamma(*a).0
                    - SpecialGamma::ln_gamma(*b).0;
                let a_term = (value.log()? * (a - 1.0))?;
                let b_term = (value.affine(-1.0, 1.0)?.log()? * (b - 1.0))?;
                (a_term + b_term)? + log_norm
            }
        }
    }
}

/// A learnable scalar: current value, transform, optional prior and a
/// trainable flag that decides whether optimizers should see it.
#[derive(Debug, Clone)]
pub struct Parameter {
    raw: Var,
    transform: Transform,
    prior: Option<Prior>,
    trainable: bool,
}

impl Parameter {
    /// Create a trainable scalar parameter with constrained initial `value`.
    pub fn new(value: f64, transform: Transform, device: &Device) -> Result<Self> {
        let raw = Tensor::new(transform.backward(value), device)?.to_dtype(FLOAT_TYPE)?;
        Ok(Self {
            raw: Var::from_tensor(&raw)?,
            transform,
            prior: None,
            trainable: true,
        })
    }

    pub fn positive(value: f64, device: &Device) -> Result<Self> {
        Self::new(value, Transform::positive(), device)
    }

    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    /// Constrained value as a rank-0 tensor
    pub fn value(&self) -> Result<Tensor> {
        self.transform.forward(self.raw.as_tensor())
    }

    pub fn value_f64(&self) -> Result<f64> {
        self.value()?.to_scalar::<f64>()
    }

    /// Overwrite the constrained value in place.
    pub fn assign(&self, value: f64) -> Result<()> {
        let raw = Tensor::new(self.transform.backward(value), self.raw.device())?
            .to_dtype(self.raw.dtype())?;
        self.raw.set(&raw)
    }

    /// Prior log-density of the current value, `None` without a prior.
    pub fn log_prior(&self) -> Result<Option<Tensor>> {
        match &self.prior {
            Some(prior) => Ok(Some(prior.log_density(&self.value()?)?)),
            None => Ok(None),
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn prior(&self) -> Option<&Prior> {
        self.prior.as_ref()
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    /// The unconstrained variable an optimizer updates
    pub fn var(&self) -> &Var {
        &self.raw
    }
}
