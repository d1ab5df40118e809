//! Probabilistic customer models: purchase frequency/dropout and spend

pub mod frequency;
pub mod value;

use crate::optimize::NelderMead;
use crate::project::TimeUnit;

pub use frequency::{fit_beta_geo, BetaGeoModel, BetaGeoParams};
pub use value::{fit_gamma_gamma, GammaGammaModel, GammaGammaParams};

/// Settings shared by the maximum-likelihood fits
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// L2 penalty on the (positive) model parameters
    pub penalizer: f64,
    pub max_iters: usize,
    pub tolerance: f64,
}

impl FitOptions {
    pub fn with_penalizer(penalizer: f64) -> Self {
        Self {
            penalizer,
            ..Default::default()
        }
    }

    pub(crate) fn optimizer(&self) -> NelderMead {
        NelderMead {
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            ..Default::default()
        }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            penalizer: 0.0,
            max_iters: 5_000,
            tolerance: 1e-10,
        }
    }
}

/// A fitted model of when customers buy and whether they have churned.
/// Times are in the model's [`TimeUnit`].
pub trait PurchaseModel {
    /// Unit the recency / tenure inputs were expressed in when fitting
    fn unit(&self) -> TimeUnit;

    /// Expected number of transactions in the next `t` time units for a
    /// customer with the given history
    fn expected_purchases(&self, t: f64, frequency: f64, recency: f64, tenure: f64) -> f64;

    /// Probability that a customer with the given history is still active
    fn probability_alive(&self, frequency: f64, recency: f64, tenure: f64) -> f64;
}

/// Sum of squared parameters
pub(crate) fn l2_penalty(params: &[f64]) -> f64 {
    params.iter().map(|p| p * p).sum()
}
