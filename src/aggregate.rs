//! Per-customer recency / tenure / frequency / monetary summaries

use crate::data::{COUNTRY, CUSTOMER_ID, INVOICE, INVOICE_DATE, TOTAL};
use crate::error::CltvError;
use crate::project::TimeUnit;
use chrono::{DateTime, NaiveDateTime};
use ndarray::Array1;
use polars::prelude::*;

/// Behavioural summary of one repeat customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub country: String,
    /// Time between first and last purchase
    pub recency: f64,
    /// Time between first purchase and the cutoff
    pub tenure: f64,
    /// Distinct invoices
    pub frequency: u32,
    /// Sum of line totals across all invoices
    pub monetary_total: f64,
    /// Average value per invoice
    pub monetary: f64,
}

/// Profiles of all modelled customers, sorted by customer id, with the time
/// unit `recency` and `tenure` are expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfiles {
    pub unit: TimeUnit,
    pub rows: Vec<CustomerProfile>,
}

impl CustomerProfiles {
    pub fn new(unit: TimeUnit, rows: Vec<CustomerProfile>) -> Self {
        Self { unit, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn frequency(&self) -> Array1<f64> {
        self.rows.iter().map(|p| p.frequency as f64).collect()
    }

    pub fn recency(&self) -> Array1<f64> {
        self.rows.iter().map(|p| p.recency).collect()
    }

    pub fn tenure(&self) -> Array1<f64> {
        self.rows.iter().map(|p| p.tenure).collect()
    }

    pub fn monetary(&self) -> Array1<f64> {
        self.rows.iter().map(|p| p.monetary).collect()
    }
}

/// Collapse cleaned transactions into one profile per repeat customer
///
/// # Arguments
/// * `transactions` - Cleaned frame from `clean_transactions`
/// * `cutoff` - End of the observation window, on or after the last purchase
/// * `unit` - Time unit for recency and tenure
///
/// # Returns
/// * `CustomerProfiles` sorted by customer id
///
/// Day counts are whole elapsed days, converted into `unit` afterwards.
/// Customers with a single invoice are dropped: they carry no repeat
/// signal and the frequency model cannot use them.
pub fn aggregate_customers(
    transactions: &DataFrame,
    cutoff: NaiveDateTime,
    unit: TimeUnit,
) -> crate::Result<CustomerProfiles> {
    let last_seen = transactions
        .column(INVOICE_DATE)?
        .datetime()?
        .max()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or(CltvError::NoTransactions)?
        .naive_utc();
    if cutoff < last_seen {
        return Err(CltvError::CutoffBeforeLastTransaction {
            cutoff,
            last: last_seen,
        }
        .into());
    }

    let days_per_unit = unit.days();
    let customers = transactions
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_DATE).min().alias("first_purchase"),
            col(INVOICE_DATE).max().alias("last_purchase"),
            // Frequency: number of unique invoices
            col(INVOICE).n_unique().alias("frequency"),
            col(TOTAL).sum().alias("monetary_total"),
            col(COUNTRY)
                .sort_by(
                    [col(INVOICE_DATE)],
                    SortMultipleOptions::default().with_maintain_order(true),
                )
                .first()
                .alias(COUNTRY),
        ])
        .with_columns([
            ((col("last_purchase") - col("first_purchase")).dt().total_days().cast(DataType::Float64)
                / lit(days_per_unit))
            .alias("recency"),
            ((lit(cutoff) - col("first_purchase")).dt().total_days().cast(DataType::Float64)
                / lit(days_per_unit))
            .alias("T"),
            (col("monetary_total") / col("frequency").cast(DataType::Float64)).alias("monetary"),
        ])
        .filter(col("frequency").gt(lit(1)))
        .sort([CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;

    log::info!(
        "Aggregated {} customers, {} with repeat purchases",
        transactions.column(CUSTOMER_ID)?.n_unique()?,
        customers.height()
    );

    if customers.height() == 0 {
        return Err(CltvError::EmptyProfiles.into());
    }
    Ok(CustomerProfiles::new(unit, profiles_from_frame(&customers)?))
}

/// Convert the aggregated frame into profile rows at the model boundary
fn profiles_from_frame(df: &DataFrame) -> crate::Result<Vec<CustomerProfile>> {
    let customer_ids: Vec<String> = df
        .column(CUSTOMER_ID)?
        .str()?
        .into_no_null_iter()
        .map(str::to_string)
        .collect();
    let countries: Vec<String> = df
        .column(COUNTRY)?
        .str()?
        .into_no_null_iter()
        .map(str::to_string)
        .collect();
    let recency: Vec<f64> = df.column("recency")?.f64()?.into_no_null_iter().collect();
    let tenure: Vec<f64> = df.column("T")?.f64()?.into_no_null_iter().collect();
    let frequency: Vec<u32> = df
        .column("frequency")?
        .cast(&DataType::UInt32)?
        .u32()?
        .into_no_null_iter()
        .collect();
    let monetary_total: Vec<f64> = df
        .column("monetary_total")?
        .f64()?
        .into_no_null_iter()
        .collect();
    let monetary: Vec<f64> = df.column("monetary")?.f64()?.into_no_null_iter().collect();

    let rows = customer_ids
        .into_iter()
        .zip(countries)
        .enumerate()
        .map(|(i, (customer_id, country))| CustomerProfile {
            customer_id,
            country,
            recency: recency[i],
            tenure: tenure[i],
            frequency: frequency[i],
            monetary_total: monetary_total[i],
            monetary: monetary[i],
        })
        .collect();
    Ok(rows)
}
