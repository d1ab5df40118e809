//! Discounted CLTV projection from a fitted purchase model and spend model

use crate::aggregate::CustomerProfiles;
use crate::error::CltvError;
use crate::model::{GammaGammaModel, PurchaseModel};
use std::fmt;

/// Time unit of recency / tenure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    /// Length of one unit in days
    pub fn days(self) -> f64 {
        match self {
            TimeUnit::Hour => 1.0 / 24.0,
            TimeUnit::Day => 1.0,
            TimeUnit::Week => 7.0,
            TimeUnit::Month => 30.0,
        }
    }

    /// How many of this unit make up one projection month
    pub fn periods_per_month(self) -> f64 {
        match self {
            TimeUnit::Hour => 720.0,
            TimeUnit::Day => 30.0,
            TimeUnit::Week => 4.345,
            TimeUnit::Month => 1.0,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Hour => "hours",
            TimeUnit::Day => "days",
            TimeUnit::Week => "weeks",
            TimeUnit::Month => "months",
        };
        f.write_str(name)
    }
}

/// One projection: how far ahead, in what unit the history is expressed,
/// and the monthly discount rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionRequest {
    pub horizon_months: u32,
    pub unit: TimeUnit,
    pub discount_rate: f64,
}

/// Column name of a horizon's projection in reports and exports
pub fn clv_column(horizon_months: u32) -> String {
    format!("clv_{horizon_months}m")
}

/// Projected value of one customer for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionResult {
    pub customer_id: String,
    pub value: f64,
}

/// Project discounted lifetime value over the requested horizon.
///
/// Each month's expected purchases come from the difference of the
/// cumulative expectation at consecutive month ends, valued at the
/// customer's expected spend and discounted by `(1 + rate)^month`.
pub fn project_clv<M: PurchaseModel>(
    purchase_model: &M,
    value_model: &GammaGammaModel,
    profiles: &CustomerProfiles,
    request: &ProjectionRequest,
) -> Result<Vec<ProjectionResult>, CltvError> {
    if purchase_model.unit() != request.unit {
        return Err(CltvError::TimeUnitMismatch {
            fitted: purchase_model.unit(),
            requested: request.unit,
        });
    }
    if profiles.unit != request.unit {
        return Err(CltvError::TimeUnitMismatch {
            fitted: profiles.unit,
            requested: request.unit,
        });
    }
    if request.horizon_months == 0 {
        return Err(CltvError::InvalidParameter(
            "projection horizon must be at least one month".to_string(),
        ));
    }
    if !(request.discount_rate >= 0.0 && request.discount_rate.is_finite()) {
        return Err(CltvError::InvalidParameter(format!(
            "discount rate must be non-negative, got {}",
            request.discount_rate
        )));
    }

    let step = request.unit.periods_per_month();
    let results = profiles
        .rows
        .iter()
        .map(|profile| {
            let frequency = profile.frequency as f64;
            let spend = value_model.expected_average_value(frequency, profile.monetary);

            let mut clv = 0.0;
            let mut cumulative_before = 0.0;
            for month in 1..=request.horizon_months {
                let cumulative = purchase_model.expected_purchases(
                    month as f64 * step,
                    frequency,
                    profile.recency,
                    profile.tenure,
                );
                let purchases = (cumulative - cumulative_before).max(0.0);
                cumulative_before = cumulative_before.max(cumulative);
                clv += spend * purchases / (1.0 + request.discount_rate).powi(month as i32);
            }

            ProjectionResult {
                customer_id: profile.customer_id.clone(),
                value: clv,
            }
        })
        .collect();

    Ok(results)
}
