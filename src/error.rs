//! Typed failures raised by the CLTV pipeline stages

use crate::project::TimeUnit;

/// Errors the pipeline surfaces instead of producing a degenerate result.
#[derive(Debug, thiserror::Error)]
pub enum CltvError {
    #[error("no transactions left after cleaning")]
    NoTransactions,

    #[error("no customers with more than one purchase; nothing to fit")]
    EmptyProfiles,

    #[error("cutoff {cutoff} is earlier than the last transaction at {last}")]
    CutoffBeforeLastTransaction {
        cutoff: chrono::NaiveDateTime,
        last: chrono::NaiveDateTime,
    },

    #[error("{model} fit did not converge after {iterations} iterations (penalizer {penalizer})")]
    FitDidNotConverge {
        model: &'static str,
        penalizer: f64,
        iterations: usize,
    },

    #[error("model was fitted in {fitted} but projection requested {requested}")]
    TimeUnitMismatch { fitted: TimeUnit, requested: TimeUnit },

    #[error("customer id {0} appears more than once")]
    DuplicateCustomer(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("input is missing required column {0}")]
    MissingColumn(String),
}
