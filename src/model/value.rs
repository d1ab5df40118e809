//! Gamma-Gamma model of average transaction value
//!
//! Individual transaction values are Gamma(p, ν) with ν itself drawn from
//! Gamma(q, γ) across customers. Only valid when spend is independent of
//! purchase frequency.

use super::{l2_penalty, FitOptions};
use crate::aggregate::CustomerProfiles;
use crate::error::CltvError;
use crate::special::ln_gamma;
use ndarray::{Array1, Zip};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            p: log_params[0].exp(),
            q: log_params[1].exp(),
            v: log_params[2].exp(),
        }
    }

    fn as_array(&self) -> [f64; 3] {
        [self.p, self.q, self.v]
    }

    /// Log-likelihood of one customer's observed average spend
    pub fn log_likelihood(&self, frequency: f64, monetary: f64) -> f64 {
        let Self { p, q, v } = *self;
        let px = p * frequency;
        ln_gamma(px + q) - ln_gamma(px) - ln_gamma(q) + q * v.ln() + (px - 1.0) * monetary.ln()
            + px * frequency.ln()
            - (px + q) * (frequency * monetary + v).ln()
    }
}

/// Fitted Gamma-Gamma model
#[derive(Debug, Clone, PartialEq)]
pub struct GammaGammaModel {
    pub params: GammaGammaParams,
    pub penalizer: f64,
    pub mean_log_likelihood: f64,
    pub iterations: usize,
}

impl GammaGammaModel {
    /// Posterior mean of a customer's spend per transaction.
    ///
    /// Shrinks the observed average towards the population mean, less so
    /// the more transactions back it. If the posterior is improper the
    /// observed average is returned unchanged.
    pub fn expected_average_value(&self, frequency: f64, monetary: f64) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        let denominator = p * frequency + q - 1.0;
        if denominator <= 0.0 {
            return monetary;
        }
        p * (v + frequency * monetary) / denominator
    }

    /// Mean spend across the population, defined only for q > 1
    pub fn population_average(&self) -> Option<f64> {
        let GammaGammaParams { p, q, v } = self.params;
        (q > 1.0).then(|| v * p / (q - 1.0))
    }
}

fn mean_log_likelihood(params: &GammaGammaParams, frequency: &Array1<f64>, monetary: &Array1<f64>) -> f64 {
    let total = Zip::from(frequency)
        .and(monetary)
        .fold(0.0, |acc, &x, &m| acc + params.log_likelihood(x, m));
    total / frequency.len() as f64
}

/// Fit a Gamma-Gamma model by penalised maximum likelihood.
pub fn fit_gamma_gamma(
    profiles: &CustomerProfiles,
    options: &FitOptions,
) -> Result<GammaGammaModel, CltvError> {
    if profiles.is_empty() {
        return Err(CltvError::EmptyProfiles);
    }
    if options.penalizer < 0.0 {
        return Err(CltvError::InvalidParameter(format!(
            "penalizer must be non-negative, got {}",
            options.penalizer
        )));
    }
    if let Some(bad) = profiles
        .rows
        .iter()
        .find(|p| p.frequency < 1 || p.monetary <= 0.0 || !p.monetary.is_finite())
    {
        return Err(CltvError::InvalidParameter(format!(
            "customer {} has frequency {} and monetary {}; both must be positive",
            bad.customer_id, bad.frequency, bad.monetary
        )));
    }

    let frequency = profiles.frequency();
    let monetary = profiles.monetary();

    let objective = |log_params: &[f64]| {
        let params = GammaGammaParams::from_log(log_params);
        -mean_log_likelihood(&params, &frequency, &monetary)
            + options.penalizer * l2_penalty(&params.as_array())
    };

    let minimum = options.optimizer().minimize(objective, &[0.0; 3]);
    let params = GammaGammaParams::from_log(&minimum.x);
    let finite = params.as_array().iter().all(|p| p.is_finite() && *p > 0.0);
    if !minimum.converged || !finite {
        return Err(CltvError::FitDidNotConverge {
            model: "Gamma-Gamma",
            penalizer: options.penalizer,
            iterations: minimum.iterations,
        });
    }

    let model = GammaGammaModel {
        params,
        penalizer: options.penalizer,
        mean_log_likelihood: mean_log_likelihood(&params, &frequency, &monetary),
        iterations: minimum.iterations,
    };
    log::debug!(
        "Gamma-Gamma fitted in {} iterations: {:?}",
        model.iterations,
        model.params
    );
    Ok(model)
}
