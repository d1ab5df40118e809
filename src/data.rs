//! Transaction loading and CLTV table export using Polars

use crate::error::CltvError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Canonical column names of a loaded transaction frame
pub const INVOICE: &str = "InvoiceNo";
pub const STOCK_CODE: &str = "StockCode";
pub const DESCRIPTION: &str = "Description";
pub const QUANTITY: &str = "Quantity";
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const UNIT_PRICE: &str = "UnitPrice";
pub const CUSTOMER_ID: &str = "CustomerID";
pub const COUNTRY: &str = "Country";
/// Line total added by the cleaner
pub const TOTAL: &str = "TotalAmount";

/// Accepted header spellings per canonical column
const COLUMN_ALIASES: [(&str, &[&str]); 8] = [
    (INVOICE, &["InvoiceNo", "Invoice"]),
    (STOCK_CODE, &["StockCode"]),
    (DESCRIPTION, &["Description"]),
    (QUANTITY, &["Quantity"]),
    (INVOICE_DATE, &["InvoiceDate"]),
    (UNIT_PRICE, &["UnitPrice", "Price"]),
    (CUSTOMER_ID, &["CustomerID", "Customer ID"]),
    (COUNTRY, &["Country"]),
];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Load a transaction CSV into a typed frame
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * A `DataFrame` with the canonical columns. Cells that are blank or fail
///   to parse are null, so the cleaner can drop the affected rows.
pub fn load_transactions(file_path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let path = file_path.as_ref();
    // Everything is read as text: a malformed cell must not fail inference
    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let df = parse_transactions(&raw)?;
    log::info!("Loaded {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Type a frame of text columns: resolve header aliases, parse numbers and
/// timestamps, normalise customer ids.
pub fn parse_transactions(raw: &DataFrame) -> crate::Result<DataFrame> {
    let text = |canonical: &str| -> crate::Result<StringChunked> {
        let aliases = COLUMN_ALIASES
            .iter()
            .find(|(name, _)| *name == canonical)
            .map_or(&[][..], |(_, aliases)| *aliases);
        let series = aliases
            .iter()
            .find_map(|name| raw.column(name).ok())
            .ok_or_else(|| CltvError::MissingColumn(canonical.to_string()))?;
        let trimmed = series
            .str()?
            .into_iter()
            .map(|cell| cell.map(str::trim).filter(|s| !s.is_empty()));
        Ok(StringChunked::from_iter_options(canonical, trimmed))
    };

    let invoice = text(INVOICE)?;
    let stock_code = text(STOCK_CODE)?;
    let description = text(DESCRIPTION)?;
    let quantity = number_column(QUANTITY, &text(QUANTITY)?);
    let timestamps = text(INVOICE_DATE)?;
    let invoice_date = DatetimeChunked::from_naive_datetime_options(
        INVOICE_DATE,
        timestamps.into_iter().map(|cell| cell.and_then(parse_timestamp)),
        TimeUnit::Milliseconds,
    );
    let unit_price = number_column(UNIT_PRICE, &text(UNIT_PRICE)?);
    let customer_ids = text(CUSTOMER_ID)?;
    let customer_id = StringChunked::from_iter_options(
        CUSTOMER_ID,
        customer_ids
            .into_iter()
            .map(|cell| cell.and_then(normalize_customer_id)),
    );
    let country = text(COUNTRY)?;

    let df = DataFrame::new(vec![
        invoice.into_series(),
        stock_code.into_series(),
        description.into_series(),
        quantity.into_series(),
        invoice_date.into_series(),
        unit_price.into_series(),
        customer_id.into_series(),
        country.into_series(),
    ])?;
    Ok(df)
}

fn number_column(name: &str, text: &StringChunked) -> Float64Chunked {
    Float64Chunked::from_iter_options(name, text.into_iter().map(|cell| cell.and_then(parse_number)))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the timestamp layouts seen in exports of the retail dataset.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    let trimmed = raw.trim_end_matches('Z');
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Spreadsheet exports write ids as floats (`17850.0`); strip that suffix.
fn normalize_customer_id(raw: &str) -> Option<&str> {
    let id = raw.strip_suffix(".0").unwrap_or(raw);
    (!id.is_empty()).then_some(id)
}

/// Column-oriented view of the final CLTV table, ready for export.
#[derive(Debug, Clone, Default)]
pub struct CltvColumns {
    pub customer_id: Vec<String>,
    pub country: Vec<String>,
    pub recency: Vec<f64>,
    pub tenure: Vec<f64>,
    pub frequency: Vec<u32>,
    pub monetary: Vec<f64>,
    pub p_alive: Vec<f64>,
    pub expected_average_value: Vec<f64>,
    /// (column name, values) per projected horizon
    pub projections: Vec<(String, Vec<f64>)>,
    pub segment: Vec<Option<String>>,
}

/// Write the CLTV table as CSV. Floats are rounded to four decimals here
/// and nowhere else.
pub fn write_cltv_csv(columns: &CltvColumns, output_path: impl AsRef<Path>) -> crate::Result<()> {
    let mut series = vec![
        Series::new("customer_id", &columns.customer_id),
        Series::new("country", &columns.country),
        Series::new("recency", &columns.recency),
        Series::new("T", &columns.tenure),
        Series::new("frequency", &columns.frequency),
        Series::new("monetary", &columns.monetary),
        Series::new("p_alive", &columns.p_alive),
        Series::new("expected_average_value", &columns.expected_average_value),
    ];
    for (name, values) in &columns.projections {
        series.push(Series::new(name, values));
    }
    series.push(Series::new("segment", &columns.segment));

    let mut df = DataFrame::new(series)?;
    let mut file = File::create(output_path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_float_precision(Some(4))
        .finish(&mut df)?;

    log::info!(
        "Wrote {} customers to {}",
        df.height(),
        output_path.as_ref().display()
    );
    Ok(())
}
