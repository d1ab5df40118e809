//! CltvForge: customer lifetime value estimation for retail transaction logs
//!
//! Transactions are cleaned and collapsed into per-customer recency,
//! tenure, frequency and monetary summaries. A BG/NBD model of purchase
//! timing and dropout and a Gamma-Gamma model of spend are fitted on them,
//! combined into discounted value projections over several horizons, and
//! customers are bucketed into equal-population value segments.

pub mod aggregate;
pub mod clean;
pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod optimize;
pub mod pipeline;
pub mod project;
pub mod report;
pub mod segment;
pub mod special;

// Re-export public items for easier access
pub use aggregate::{aggregate_customers, CustomerProfile, CustomerProfiles};
pub use clean::{clean_transactions, CleaningSummary, OutlierThresholds};
pub use cli::Args;
pub use data::{load_transactions, parse_transactions, write_cltv_csv};
pub use error::CltvError;
pub use model::{fit_beta_geo, fit_gamma_gamma, BetaGeoModel, FitOptions, GammaGammaModel, PurchaseModel};
pub use pipeline::{join_projections, run_pipeline, CltvReport, CltvTable, PipelineConfig};
pub use project::{project_clv, ProjectionRequest, ProjectionResult, TimeUnit};
pub use segment::{assign_segments, Segment};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
