//! Command-line interface definitions and argument parsing

use crate::data::parse_timestamp;
use crate::model::FitOptions;
use crate::pipeline::PipelineConfig;
use crate::project::TimeUnit;
use chrono::NaiveDateTime;
use clap::Parser;

/// Customer lifetime value estimation with BG/NBD and Gamma-Gamma models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transaction CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Analysis cutoff date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[arg(short, long, default_value = "2011-12-11")]
    pub cutoff: String,

    /// Projection horizons in months, comma-separated
    /// Example: --horizons "1,6,12"
    #[arg(long, default_value = "1,6,12")]
    pub horizons: String,

    /// Horizon (months) whose projected value is used for segmentation
    #[arg(long, default_value = "6")]
    pub segment_horizon: u32,

    /// Monthly discount rate applied to projected revenue
    #[arg(long, default_value = "0.01")]
    pub discount_rate: f64,

    /// L2 penalty for the BG/NBD fit
    #[arg(long, default_value = "0.001")]
    pub frequency_penalty: f64,

    /// L2 penalty for the Gamma-Gamma fit
    #[arg(long, default_value = "0.01")]
    pub value_penalty: f64,

    /// Retries with a tenfold penalty when a fit does not converge
    #[arg(long, default_value = "2")]
    pub penalty_retries: u32,

    /// Maximum optimiser iterations per fit
    #[arg(long, default_value = "5000")]
    pub max_iters: usize,

    /// Number of value segments
    #[arg(short = 'k', long, default_value = "4")]
    pub segments: usize,

    /// Only segment customers from this country
    #[arg(long)]
    pub country: Option<String>,

    /// Customers listed per horizon in the report
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Output path for the CLTV table
    #[arg(short, long, default_value = "cltv.csv")]
    pub output: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the horizon list
    /// Expected format: "1,6,12"
    pub fn parse_horizons(&self) -> crate::Result<Vec<u32>> {
        let horizons = self
            .horizons
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|&h| h > 0)
                    .ok_or_else(|| anyhow::anyhow!("Invalid horizon: {}", part))
            })
            .collect::<crate::Result<Vec<u32>>>()?;

        let mut unique = horizons.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != horizons.len() {
            anyhow::bail!("Horizons must not repeat: {}", self.horizons);
        }
        Ok(horizons)
    }

    pub fn parse_cutoff(&self) -> crate::Result<NaiveDateTime> {
        parse_timestamp(self.cutoff.trim())
            .ok_or_else(|| anyhow::anyhow!("Invalid cutoff date: {}", self.cutoff))
    }

    /// Validate arguments and build the pipeline configuration
    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        if self.discount_rate.is_nan() || self.discount_rate < 0.0 {
            anyhow::bail!("Discount rate must be non-negative: {}", self.discount_rate);
        }
        for penalty in [self.frequency_penalty, self.value_penalty] {
            if penalty.is_nan() || penalty < 0.0 {
                anyhow::bail!("Penalties must be non-negative: {}", penalty);
            }
        }

        let fit_options = |penalizer| FitOptions {
            penalizer,
            max_iters: self.max_iters,
            ..Default::default()
        };

        Ok(PipelineConfig {
            cutoff: self.parse_cutoff()?,
            unit: TimeUnit::Week,
            horizons: self.parse_horizons()?,
            segment_horizon: self.segment_horizon,
            discount_rate: self.discount_rate,
            frequency_options: fit_options(self.frequency_penalty),
            value_options: fit_options(self.value_penalty),
            penalty_retries: self.penalty_retries,
            segments: self.segments,
            country: self.country.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["cltvforge"])
    }

    #[test]
    fn test_defaults() {
        let args = args();
        assert_eq!(args.input, "data.csv");
        assert_eq!(args.segments, 4);
        assert_eq!(args.segment_horizon, 6);

        let config = args.pipeline_config().unwrap();
        assert_eq!(config.horizons, vec![1, 6, 12]);
        assert_eq!(config.unit, TimeUnit::Week);
        assert_eq!(config.frequency_options.penalizer, 0.001);
        assert_eq!(config.value_options.penalizer, 0.01);
        assert_eq!(config.cutoff.to_string(), "2011-12-11 00:00:00");
    }

    #[test]
    fn test_parse_horizons() {
        let mut args = args();
        args.horizons = "1, 2,6".to_string();
        assert_eq!(args.parse_horizons().unwrap(), vec![1, 2, 6]);

        args.horizons = "1,x".to_string();
        assert!(args.parse_horizons().is_err());

        args.horizons = "0".to_string();
        assert!(args.parse_horizons().is_err());

        args.horizons = "6,6".to_string();
        assert!(args.parse_horizons().is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut args = args();
        args.cutoff = "soon".to_string();
        assert!(args.pipeline_config().is_err());

        let mut args = Args::parse_from(["cltvforge", "--discount-rate=-0.5"]);
        assert!(args.pipeline_config().is_err());
        args.discount_rate = 0.01;
        args.value_penalty = -1.0;
        assert!(args.pipeline_config().is_err());
    }

    #[test]
    fn test_country_flag() {
        let args = Args::parse_from(["cltvforge", "--country", "United Kingdom", "-k", "3"]);
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.country.as_deref(), Some("United Kingdom"));
        assert_eq!(config.segments, 3);
    }
}
