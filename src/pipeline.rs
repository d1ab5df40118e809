//! End-to-end CLTV pipeline: clean, aggregate, fit, project, join, segment

use crate::aggregate::{aggregate_customers, CustomerProfile, CustomerProfiles};
use crate::clean::{clean_transactions, CleaningSummary};
use crate::data::CltvColumns;
use crate::error::CltvError;
use crate::model::{
    fit_beta_geo, fit_gamma_gamma, BetaGeoModel, FitOptions, GammaGammaModel, PurchaseModel,
};
use crate::project::{clv_column, project_clv, ProjectionRequest, ProjectionResult, TimeUnit};
use crate::segment::{assign_segments, summarize, Segment, SegmentSummary};
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use std::collections::{HashMap, HashSet};

/// Penalty used for a retry when the configured penalty was zero
const RETRY_BASE_PENALTY: f64 = 1e-3;
const RETRY_PENALTY_FACTOR: f64 = 10.0;

/// Everything the pipeline needs besides the transactions themselves
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cutoff: NaiveDateTime,
    pub unit: TimeUnit,
    /// Projection horizons in months
    pub horizons: Vec<u32>,
    /// Horizon whose projected value drives segmentation
    pub segment_horizon: u32,
    pub discount_rate: f64,
    pub frequency_options: FitOptions,
    pub value_options: FitOptions,
    /// Retries with a larger penalty after a fit fails to converge
    pub penalty_retries: u32,
    pub segments: usize,
    /// Only segment customers from this country
    pub country: Option<String>,
}

/// One customer's row of the final table
#[derive(Debug, Clone, PartialEq)]
pub struct CltvRow {
    pub profile: CustomerProfile,
    pub p_alive: f64,
    pub expected_average_value: f64,
    /// Projected value per horizon, in the table's horizon order
    pub clv: Vec<f64>,
    /// `None` when the customer was excluded from segmentation
    pub segment: Option<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CltvTable {
    pub horizons: Vec<u32>,
    pub rows: Vec<CltvRow>,
}

impl CltvTable {
    /// Index of a horizon's projection within each row's `clv`
    pub fn horizon_index(&self, horizon_months: u32) -> Option<usize> {
        self.horizons.iter().position(|&h| h == horizon_months)
    }

    /// Rows sorted by one horizon's projected value, highest first
    pub fn top_by_horizon(&self, horizon_months: u32, n: usize) -> Vec<&CltvRow> {
        let Some(column) = self.horizon_index(horizon_months) else {
            return Vec::new();
        };
        let mut rows: Vec<&CltvRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.clv[column].total_cmp(&a.clv[column]));
        rows.truncate(n);
        rows
    }

    pub fn to_columns(&self) -> CltvColumns {
        let mut columns = CltvColumns {
            projections: self
                .horizons
                .iter()
                .map(|&h| (clv_column(h), Vec::with_capacity(self.rows.len())))
                .collect(),
            ..Default::default()
        };
        for row in &self.rows {
            let p = &row.profile;
            columns.customer_id.push(p.customer_id.clone());
            columns.country.push(p.country.clone());
            columns.recency.push(p.recency);
            columns.tenure.push(p.tenure);
            columns.frequency.push(p.frequency);
            columns.monetary.push(p.monetary);
            columns.p_alive.push(row.p_alive);
            columns.expected_average_value.push(row.expected_average_value);
            for ((_, values), &value) in columns.projections.iter_mut().zip(&row.clv) {
                values.push(value);
            }
            columns.segment.push(row.segment.map(|s| s.to_string()));
        }
        columns
    }
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct CltvReport {
    pub cleaning: CleaningSummary,
    pub frequency_model: BetaGeoModel,
    pub value_model: GammaGammaModel,
    pub table: CltvTable,
    pub segment_horizon: u32,
    pub segment_summary: Vec<SegmentSummary>,
}

/// Run a fit, raising its penalty after each non-convergence.
pub fn fit_with_retry<T, F>(
    name: &str,
    options: &FitOptions,
    retries: u32,
    fit: F,
) -> Result<T, CltvError>
where
    F: Fn(&FitOptions) -> Result<T, CltvError>,
{
    let mut options = *options;
    let mut attempt = 0;
    loop {
        match fit(&options) {
            Err(CltvError::FitDidNotConverge { penalizer, .. }) if attempt < retries => {
                attempt += 1;
                options.penalizer = if penalizer > 0.0 {
                    penalizer * RETRY_PENALTY_FACTOR
                } else {
                    RETRY_BASE_PENALTY
                };
                log::warn!(
                    "{} fit did not converge with penalizer {}; retrying with {}",
                    name,
                    penalizer,
                    options.penalizer
                );
            }
            result => return result,
        }
    }
}

/// Attach every horizon's projections to the profiles by customer id.
///
/// Duplicate ids on either side are rejected, since the merge would be
/// ambiguous.
pub fn join_projections(
    profiles: &CustomerProfiles,
    projections: &[Vec<ProjectionResult>],
) -> Result<Vec<Vec<f64>>, CltvError> {
    let mut seen = HashSet::with_capacity(profiles.len());
    for p in &profiles.rows {
        if !seen.insert(p.customer_id.as_str()) {
            return Err(CltvError::DuplicateCustomer(p.customer_id.clone()));
        }
    }

    let mut indexes: Vec<HashMap<&str, f64>> = Vec::with_capacity(projections.len());
    for horizon in projections {
        let mut index = HashMap::with_capacity(horizon.len());
        for result in horizon {
            if index.insert(result.customer_id.as_str(), result.value).is_some() {
                return Err(CltvError::DuplicateCustomer(result.customer_id.clone()));
            }
        }
        indexes.push(index);
    }

    profiles
        .rows
        .iter()
        .map(|p| {
            indexes
                .iter()
                .map(|index| {
                    index.get(p.customer_id.as_str()).copied().ok_or_else(|| {
                        CltvError::InvalidParameter(format!(
                            "no projection for customer {}",
                            p.customer_id
                        ))
                    })
                })
                .collect::<Result<Vec<f64>, CltvError>>()
        })
        .collect()
}

fn validate(config: &PipelineConfig) -> Result<(), CltvError> {
    if config.horizons.is_empty() {
        return Err(CltvError::InvalidParameter(
            "at least one projection horizon is required".to_string(),
        ));
    }
    if !config.horizons.contains(&config.segment_horizon) {
        return Err(CltvError::InvalidParameter(format!(
            "segment horizon {} is not among the projected horizons {:?}",
            config.segment_horizon, config.horizons
        )));
    }
    Ok(())
}

/// Run the whole pipeline over a loaded transaction frame
///
/// # Arguments
/// * `transactions` - Frame produced by `load_transactions`
/// * `config` - Cutoff, horizons, fit options and segmentation settings
///
/// # Returns
/// * `CltvReport` with the cleaning summary, both fitted models, the
///   per-customer table and the segment summary
pub fn run_pipeline(transactions: DataFrame, config: &PipelineConfig) -> crate::Result<CltvReport> {
    validate(config)?;

    let (transactions, cleaning) = clean_transactions(transactions)?;
    log::info!(
        "Cleaning kept {} of {} rows ({} incomplete, {} cancelled, {} non-positive)",
        cleaning.kept_rows(),
        cleaning.input_rows,
        cleaning.dropped_incomplete,
        cleaning.dropped_cancelled,
        cleaning.dropped_non_positive
    );
    if transactions.height() == 0 {
        return Err(CltvError::NoTransactions.into());
    }

    let profiles = aggregate_customers(&transactions, config.cutoff, config.unit)?;

    let frequency_model = fit_with_retry(
        "BG/NBD",
        &config.frequency_options,
        config.penalty_retries,
        |options| fit_beta_geo(&profiles, options),
    )?;
    let value_model = fit_with_retry(
        "Gamma-Gamma",
        &config.value_options,
        config.penalty_retries,
        |options| fit_gamma_gamma(&profiles, options),
    )?;
    log::info!(
        "Fitted models: {:?} / {:?}",
        frequency_model.params,
        value_model.params
    );

    let projections = config
        .horizons
        .iter()
        .map(|&horizon_months| {
            let request = ProjectionRequest {
                horizon_months,
                unit: config.unit,
                discount_rate: config.discount_rate,
            };
            project_clv(&frequency_model, &value_model, &profiles, &request)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let joined = join_projections(&profiles, &projections)?;

    let mut rows: Vec<CltvRow> = profiles
        .rows
        .iter()
        .zip(joined)
        .map(|(profile, clv)| {
            let frequency = profile.frequency as f64;
            CltvRow {
                p_alive: frequency_model.probability_alive(frequency, profile.recency, profile.tenure),
                expected_average_value: value_model.expected_average_value(frequency, profile.monetary),
                profile: profile.clone(),
                clv,
                segment: None,
            }
        })
        .collect();

    let column = config
        .horizons
        .iter()
        .position(|&h| h == config.segment_horizon)
        .unwrap_or_default();
    let eligible: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            config
                .country
                .as_deref()
                .map_or(true, |country| row.profile.country == country)
        })
        .map(|(i, _)| i)
        .collect();
    let values: Vec<f64> = eligible.iter().map(|&i| rows[i].clv[column]).collect();
    let segments = assign_segments(&values, config.segments)?;
    for (&i, &segment) in eligible.iter().zip(&segments) {
        rows[i].segment = Some(segment);
    }
    if eligible.len() < config.segments {
        log::warn!(
            "Only {} customers to split into {} segments",
            eligible.len(),
            config.segments
        );
    }
    let segment_summary = summarize(&values, &segments);

    Ok(CltvReport {
        cleaning,
        frequency_model,
        value_model,
        table: CltvTable {
            horizons: config.horizons.clone(),
            rows,
        },
        segment_horizon: config.segment_horizon,
        segment_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles(ids: &[&str]) -> CustomerProfiles {
        let rows = ids
            .iter()
            .map(|id| CustomerProfile {
                customer_id: id.to_string(),
                country: "United Kingdom".to_string(),
                recency: 1.0,
                tenure: 2.0,
                frequency: 2,
                monetary_total: 20.0,
                monetary: 10.0,
            })
            .collect();
        CustomerProfiles::new(TimeUnit::Week, rows)
    }

    fn results(pairs: &[(&str, f64)]) -> Vec<ProjectionResult> {
        pairs
            .iter()
            .map(|&(id, value)| ProjectionResult {
                customer_id: id.to_string(),
                value,
            })
            .collect()
    }

    #[test]
    fn test_join_by_customer_id() {
        let joined = join_projections(
            &profiles(&["a", "b"]),
            &[
                results(&[("b", 2.0), ("a", 1.0)]),
                results(&[("a", 10.0), ("b", 20.0)]),
            ],
        )
        .unwrap();
        assert_eq!(joined, vec![vec![1.0, 10.0], vec![2.0, 20.0]]);
    }

    #[test]
    fn test_join_rejects_duplicates() {
        let err = join_projections(&profiles(&["a", "a"]), &[]).unwrap_err();
        assert!(matches!(err, CltvError::DuplicateCustomer(id) if id == "a"));

        let err = join_projections(&profiles(&["a"]), &[results(&[("a", 1.0), ("a", 2.0)])])
            .unwrap_err();
        assert!(matches!(err, CltvError::DuplicateCustomer(_)));
    }

    #[test]
    fn test_join_rejects_missing_projection() {
        let err = join_projections(&profiles(&["a", "b"]), &[results(&[("a", 1.0)])]).unwrap_err();
        assert!(matches!(err, CltvError::InvalidParameter(_)));
    }

    #[test]
    fn test_retry_raises_penalty() {
        use std::cell::RefCell;
        let attempts = RefCell::new(Vec::new());
        let result = fit_with_retry("test", &FitOptions::with_penalizer(0.001), 2, |options| {
            attempts.borrow_mut().push(options.penalizer);
            if options.penalizer < 0.05 {
                Err(CltvError::FitDidNotConverge {
                    model: "test",
                    penalizer: options.penalizer,
                    iterations: 1,
                })
            } else {
                Ok(options.penalizer)
            }
        });
        assert!(result.is_ok());
        let attempts = attempts.into_inner();
        assert_eq!(attempts.len(), 3);
        assert!((attempts[2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_retry_gives_up() {
        let result: Result<(), _> = fit_with_retry("test", &FitOptions::default(), 1, |options| {
            Err(CltvError::FitDidNotConverge {
                model: "test",
                penalizer: options.penalizer,
                iterations: 1,
            })
        });
        assert!(matches!(result, Err(CltvError::FitDidNotConverge { .. })));
    }
}
