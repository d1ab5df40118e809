//! CltvForge: BG/NBD + Gamma-Gamma customer lifetime value CLI
//!
//! This is the main entrypoint that orchestrates data loading, cleaning,
//! model fitting, projection, segmentation and export.

use anyhow::{Context, Result};
use clap::Parser;
use cltvforge::{load_transactions, report, run_pipeline, write_cltv_csv, Args};
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.pipeline_config()?;
    let start_time = Instant::now();

    // Step 1: Load raw rows
    let raw = load_transactions(&args.input)
        .with_context(|| format!("Failed to read transactions from {}", args.input))?;
    log::debug!("Loading took {:.2}s", start_time.elapsed().as_secs_f64());

    // Step 2: Clean, aggregate, fit, project and segment
    let model_start = Instant::now();
    let cltv = run_pipeline(raw, &config)?;
    log::debug!("Modelling took {:.2}s", model_start.elapsed().as_secs_f64());

    // Step 3: Report and export
    report::print_report(&cltv, args.top);
    write_cltv_csv(&cltv.table.to_columns(), &args.output)
        .with_context(|| format!("Failed to write {}", args.output))?;

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    println!("CLTV table saved to: {}", args.output);

    Ok(())
}
