//! BG/NBD purchase-frequency and dropout model
//!
//! Each customer buys at a Poisson rate drawn from Gamma(r, α) and, after
//! every purchase, drops out with a probability drawn from Beta(a, b).

use super::{l2_penalty, FitOptions, PurchaseModel};
use crate::aggregate::CustomerProfiles;
use crate::error::CltvError;
use crate::project::TimeUnit;
use crate::special::{expit, ln_gamma, ln_hyp2f1, log_add_exp};
use ndarray::{Array1, Zip};

/// Times are rescaled so the longest tenure equals this before fitting.
const TIME_SCALE_TARGET: f64 = 10.0;
/// The expectation has a removable singularity at a = 1.
const SINGULARITY_OFFSET: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaGeoParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

impl BetaGeoParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            r: log_params[0].exp(),
            alpha: log_params[1].exp(),
            a: log_params[2].exp(),
            b: log_params[3].exp(),
        }
    }

    fn as_array(&self) -> [f64; 4] {
        [self.r, self.alpha, self.a, self.b]
    }

    fn is_finite(&self) -> bool {
        self.as_array().iter().all(|p| p.is_finite() && *p > 0.0)
    }

    /// Log-likelihood of one customer's (frequency, recency, tenure)
    pub fn log_likelihood(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        let Self { r, alpha, a, b } = *self;
        let x = frequency;

        let a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
        let a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
        let a3 = -(r + x) * (alpha + tenure).ln();
        if x > 0.0 {
            let a4 = a.ln() - (b + x - 1.0).ln() - (r + x) * (alpha + recency).ln();
            a1 + a2 + log_add_exp(a3, a4)
        } else {
            a1 + a2 + a3
        }
    }
}

/// Fitted BG/NBD model
#[derive(Debug, Clone, PartialEq)]
pub struct BetaGeoModel {
    pub params: BetaGeoParams,
    pub unit: TimeUnit,
    pub penalizer: f64,
    /// Mean per-customer log-likelihood at the fitted parameters
    pub mean_log_likelihood: f64,
    pub iterations: usize,
}

/// Mean log-likelihood over column vectors
fn mean_log_likelihood(
    params: &BetaGeoParams,
    frequency: &Array1<f64>,
    recency: &Array1<f64>,
    tenure: &Array1<f64>,
) -> f64 {
    let total = Zip::from(frequency)
        .and(recency)
        .and(tenure)
        .fold(0.0, |acc, &x, &tx, &t| acc + params.log_likelihood(x, tx, t));
    total / frequency.len() as f64
}

/// Fit a BG/NBD model by penalised maximum likelihood.
///
/// The search runs over log-parameters so every candidate is positive; the
/// penalty applies to the parameters on the rescaled time axis.
pub fn fit_beta_geo(
    profiles: &CustomerProfiles,
    options: &FitOptions,
) -> Result<BetaGeoModel, CltvError> {
    if profiles.is_empty() {
        return Err(CltvError::EmptyProfiles);
    }
    if options.penalizer < 0.0 {
        return Err(CltvError::InvalidParameter(format!(
            "penalizer must be non-negative, got {}",
            options.penalizer
        )));
    }

    let frequency = profiles.frequency();
    let recency = profiles.recency();
    let tenure = profiles.tenure();

    let max_tenure = tenure.fold(0.0_f64, |m, &t| m.max(t));
    let scale = if max_tenure > 0.0 {
        TIME_SCALE_TARGET / max_tenure
    } else {
        1.0
    };
    let scaled_recency = &recency * scale;
    let scaled_tenure = &tenure * scale;

    let objective = |log_params: &[f64]| {
        let params = BetaGeoParams::from_log(log_params);
        -mean_log_likelihood(&params, &frequency, &scaled_recency, &scaled_tenure)
            + options.penalizer * l2_penalty(&params.as_array())
    };

    let minimum = options.optimizer().minimize(objective, &[0.0; 4]);
    let mut params = BetaGeoParams::from_log(&minimum.x);
    params.alpha /= scale;

    if !minimum.converged || !params.is_finite() {
        return Err(CltvError::FitDidNotConverge {
            model: "BG/NBD",
            penalizer: options.penalizer,
            iterations: minimum.iterations,
        });
    }

    let model = BetaGeoModel {
        params,
        unit: profiles.unit,
        penalizer: options.penalizer,
        mean_log_likelihood: mean_log_likelihood(&params, &frequency, &recency, &tenure),
        iterations: minimum.iterations,
    };
    log::debug!(
        "BG/NBD fitted in {} iterations: {:?}",
        model.iterations,
        model.params
    );
    Ok(model)
}

impl PurchaseModel for BetaGeoModel {
    fn unit(&self) -> TimeUnit {
        self.unit
    }

    fn expected_purchases(&self, t: f64, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let BetaGeoParams { r, alpha, b, .. } = self.params;
        let a = if (self.params.a - 1.0).abs() < SINGULARITY_OFFSET {
            1.0 + SINGULARITY_OFFSET
        } else {
            self.params.a
        };
        let x = frequency;

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + tenure + t);
        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);

        let first_term = (a + b + x - 1.0) / (a - 1.0);
        let second_term = 1.0 - (ln_hyp + (r + x) * ((alpha + tenure) / (alpha + t + tenure)).ln()).exp();
        let numerator = first_term * second_term;

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + tenure) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };

        (numerator / denominator).max(0.0)
    }

    fn probability_alive(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if frequency <= 0.0 {
            return 1.0;
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let log_odds_dead = (r + frequency) * ((alpha + tenure) / (alpha + recency)).ln()
            + (a / (b + frequency.max(1.0) - 1.0)).ln();
        expit(-log_odds_dead)
    }
}
