use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use uq_core::{ErrorInfo, UqError};

/// Marginal distribution of a varied parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "lowercase")]
pub enum Marginal {
    /// Uniform on `[lower, upper]`.
    Uniform {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
    /// Gaussian with the given mean and standard deviation.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        std: f64,
    },
}

impl Marginal {
    /// Checks the distribution parameters.
    pub fn validate(&self, param: &str) -> Result<(), UqError> {
        let valid = match *self {
            Marginal::Uniform { lower, upper } => lower.is_finite() && upper.is_finite() && lower < upper,
            Marginal::Normal { mean, std } => mean.is_finite() && std.is_finite() && std > 0.0,
        };
        if valid {
            Ok(())
        } else {
            Err(UqError::Config(
                ErrorInfo::new("marginal-invalid", "distribution parameters are not usable")
                    .with_context("param", param)
                    .with_context("marginal", format!("{self:?}")),
            ))
        }
    }

    /// Draws one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, UqError> {
        self.validate("<sample>")?;
        match *self {
            Marginal::Uniform { lower, upper } => Ok(Uniform::new_inclusive(lower, upper).sample(rng)),
            Marginal::Normal { mean, std } => Normal::new(mean, std)
                .map(|normal| normal.sample(rng))
                .map_err(|err| {
                    UqError::Config(ErrorInfo::new("marginal-invalid", err.to_string()))
                }),
        }
    }
}
