//! Console report. All display rounding happens here.

use crate::clean::CleaningSummary;
use crate::pipeline::CltvReport;
use crate::project::clv_column;

/// Print the cleaning summary, fitted parameters, per-horizon leaders and
/// the segment table.
pub fn print_report(report: &CltvReport, top: usize) {
    print_cleaning_summary(&report.cleaning);

    let bg = report.frequency_model.params;
    let gg = report.value_model.params;
    println!("\n=== Fitted Models ===");
    println!(
        "BG/NBD      r={:.4} alpha={:.4} a={:.4} b={:.4} (penalizer {}, {} iterations)",
        bg.r, bg.alpha, bg.a, bg.b, report.frequency_model.penalizer, report.frequency_model.iterations
    );
    println!(
        "Gamma-Gamma p={:.4} q={:.4} v={:.4} (penalizer {}, {} iterations)",
        gg.p, gg.q, gg.v, report.value_model.penalizer, report.value_model.iterations
    );
    match report.value_model.population_average() {
        Some(mean) => println!("Population average spend per transaction: {:.4}", mean),
        None => println!("Population average spend per transaction: undefined (q <= 1)"),
    }

    let table = &report.table;
    println!("\n=== Projected CLTV ({} customers) ===", table.rows.len());
    for (column, &horizon) in table.horizons.iter().enumerate() {
        let total: f64 = table.rows.iter().map(|r| r.clv[column]).sum();
        println!("\n{}: total {:.4}", clv_column(horizon), total);
        println!("  Customer   | Country              | Freq | P(alive) | CLTV");
        println!("  -----------|----------------------|------|----------|-------------");
        for row in table.top_by_horizon(horizon, top) {
            println!(
                "  {:10} | {:20} | {:4} | {:8.4} | {:12.4}",
                row.profile.customer_id,
                truncate(&row.profile.country, 20),
                row.profile.frequency,
                row.p_alive,
                row.clv[column]
            );
        }
    }

    println!(
        "\n=== Segments by {} ===",
        clv_column(report.segment_horizon)
    );
    println!("  Segment | Count | Mean         | Sum            | Min          | Max");
    println!("  --------|-------|--------------|----------------|--------------|-------------");
    for s in &report.segment_summary {
        println!(
            "  {:7} | {:5} | {:12.4} | {:14.4} | {:12.4} | {:12.4}",
            s.segment.label(), s.count, s.mean, s.sum, s.min, s.max
        );
    }
}

fn print_cleaning_summary(summary: &CleaningSummary) {
    println!("=== Cleaning ===");
    println!("Rows read: {}", summary.input_rows);
    println!("  dropped incomplete:   {}", summary.dropped_incomplete);
    println!("  dropped cancelled:    {}", summary.dropped_cancelled);
    println!("  dropped non-positive: {}", summary.dropped_non_positive);
    println!("Rows kept: {}", summary.kept_rows());
    if let Some(q) = summary.quantity_thresholds {
        println!(
            "Quantity fences [{:.4}, {:.4}], capped {} rows",
            q.low, q.up, summary.capped_quantity
        );
    }
    if let Some(p) = summary.price_thresholds {
        println!(
            "Price fences [{:.4}, {:.4}], capped {} rows",
            p.low, p.up, summary.capped_price
        );
    }
}

fn truncate(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
