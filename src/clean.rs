//! Transaction cleaning: invalid rows out, upper-tail outliers capped

use crate::data::{COUNTRY, CUSTOMER_ID, INVOICE, QUANTITY, TOTAL, UNIT_PRICE};
use polars::prelude::*;

/// Percentiles used in place of the quartiles of a classic IQR fence.
/// Wholesale orders are heavy-tailed, so the fence sits far out.
const LOWER_PERCENTILE: f64 = 0.01;
const UPPER_PERCENTILE: f64 = 0.99;
const FENCE_MULTIPLIER: f64 = 1.5;

/// Outlier fences for one numeric field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierThresholds {
    pub low: f64,
    pub up: f64,
}

impl OutlierThresholds {
    /// Fences from the lower and upper percentile of a field
    pub fn from_quantiles(q1: f64, q3: f64) -> Self {
        let range = q3 - q1;
        Self {
            low: q1 - FENCE_MULTIPLIER * range,
            up: q3 + FENCE_MULTIPLIER * range,
        }
    }

    /// Compute fences for one column from its 1st/99th percentiles, with
    /// linear interpolation between order statistics. `None` when the
    /// column is empty.
    pub fn from_column(df: &DataFrame, column: &str) -> crate::Result<Option<Self>> {
        let quantiles = df
            .clone()
            .lazy()
            .select([
                col(column)
                    .quantile(lit(LOWER_PERCENTILE), QuantileInterpolOptions::Linear)
                    .alias("q1"),
                col(column)
                    .quantile(lit(UPPER_PERCENTILE), QuantileInterpolOptions::Linear)
                    .alias("q3"),
            ])
            .collect()?;

        let q1 = quantiles.column("q1")?.f64()?.get(0);
        let q3 = quantiles.column("q3")?.f64()?.get(0);
        Ok(q1.zip(q3).map(|(q1, q3)| Self::from_quantiles(q1, q3)))
    }

    /// Cap a value at the upper fence. The lower fence is never applied.
    pub fn cap(&self, value: f64) -> f64 {
        if value > self.up {
            self.up
        } else {
            value
        }
    }

    /// The same capping as [`cap`](Self::cap), as a column expression
    fn cap_expr(&self, column: &str) -> Expr {
        when(col(column).gt(lit(self.up)))
            .then(lit(self.up))
            .otherwise(col(column))
            .alias(column)
    }
}

/// What the cleaner removed and capped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningSummary {
    pub input_rows: usize,
    pub dropped_incomplete: usize,
    pub dropped_cancelled: usize,
    pub dropped_non_positive: usize,
    pub capped_quantity: usize,
    pub capped_price: usize,
    pub quantity_thresholds: Option<OutlierThresholds>,
    pub price_thresholds: Option<OutlierThresholds>,
}

impl CleaningSummary {
    pub fn kept_rows(&self) -> usize {
        self.input_rows - self.dropped_incomplete - self.dropped_cancelled - self.dropped_non_positive
    }
}

/// Invoice numbers containing `C` are cancellations.
pub fn is_cancellation(invoice: &str) -> bool {
    invoice.contains('C')
}

/// Clean a loaded transaction frame
///
/// # Arguments
/// * `transactions` - Frame produced by `load_transactions`
///
/// # Returns
/// * The kept rows with quantity and price capped at their upper outlier
///   fence, each independently, and a `TotalAmount` line total derived
///   from the capped values
/// * A `CleaningSummary` of what was dropped and capped
///
/// Rows are dropped in order: any null field, cancelled invoices, then
/// non-positive quantity or price.
pub fn clean_transactions(transactions: DataFrame) -> crate::Result<(DataFrame, CleaningSummary)> {
    let mut summary = CleaningSummary {
        input_rows: transactions.height(),
        ..Default::default()
    };

    // Every input column must be present on a kept row
    let complete = transactions.drop_nulls::<String>(None)?;
    summary.dropped_incomplete = summary.input_rows - complete.height();

    let cancelled: BooleanChunked = complete
        .column(INVOICE)?
        .str()?
        .into_iter()
        .map(|invoice| invoice.is_some_and(is_cancellation))
        .collect();
    let active = complete.filter(&!cancelled)?;
    summary.dropped_cancelled = complete.height() - active.height();

    let valid = active
        .clone()
        .lazy()
        .filter(col(QUANTITY).gt(lit(0.0)).and(col(UNIT_PRICE).gt(lit(0.0))))
        .collect()?;
    summary.dropped_non_positive = active.height() - valid.height();

    summary.quantity_thresholds = OutlierThresholds::from_column(&valid, QUANTITY)?;
    summary.price_thresholds = OutlierThresholds::from_column(&valid, UNIT_PRICE)?;
    summary.capped_quantity = count_above(&valid, QUANTITY, summary.quantity_thresholds)?;
    summary.capped_price = count_above(&valid, UNIT_PRICE, summary.price_thresholds)?;

    let caps: Vec<Expr> = [
        (QUANTITY, summary.quantity_thresholds),
        (UNIT_PRICE, summary.price_thresholds),
    ]
    .into_iter()
    .filter_map(|(column, fence)| fence.map(|f| f.cap_expr(column)))
    .collect();

    let cleaned = valid
        .lazy()
        .with_columns(caps)
        .with_column((col(QUANTITY) * col(UNIT_PRICE)).alias(TOTAL))
        .collect()?;

    log::debug!(
        "Cleaned frame has {} rows over {} customers in {} countries",
        cleaned.height(),
        cleaned.column(CUSTOMER_ID)?.n_unique()?,
        cleaned.column(COUNTRY)?.n_unique()?
    );
    Ok((cleaned, summary))
}

/// Rows whose value lies above the upper fence
fn count_above(df: &DataFrame, column: &str, fence: Option<OutlierThresholds>) -> crate::Result<usize> {
    let Some(fence) = fence else {
        return Ok(0);
    };
    let above = df
        .clone()
        .lazy()
        .filter(col(column).gt(lit(fence.up)))
        .collect()?;
    Ok(above.height())
}
