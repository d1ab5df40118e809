//! Integration tests for CltvForge

use cltvforge::pipeline::fit_with_retry;
use cltvforge::{
    aggregate_customers, clean_transactions, fit_beta_geo, fit_gamma_gamma, load_transactions,
    project_clv, run_pipeline, write_cltv_csv, Args, CltvError, CustomerProfile, CustomerProfiles,
    FitOptions, PipelineConfig, ProjectionRequest, TimeUnit,
};
use clap::Parser;
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

/// (customer, country, invoice dates, (quantity, price) lines per invoice)
type CustomerFixture = (&'static str, &'static str, &'static [&'static str], &'static [(u32, f64)]);

const CUSTOMERS: [CustomerFixture; 8] = [
    ("12346", "United Kingdom", &["2011-01-10", "2011-03-14", "2011-06-20", "2011-09-05", "2011-11-28"], &[(12, 2.1), (6, 4.25)]),
    ("12347", "Iceland", &["2010-12-07", "2011-01-26", "2011-04-07", "2011-06-09", "2011-08-02", "2011-10-31", "2011-12-07"], &[(24, 1.65), (12, 3.75)]),
    ("12348", "Finland", &["2010-12-16", "2011-01-25"], &[(72, 0.55)]),
    ("12349", "United Kingdom", &["2011-02-01", "2011-02-15", "2011-03-01"], &[(4, 8.5)]),
    ("12350", "United Kingdom", &["2011-05-02"], &[(10, 1.25)]),
    ("12352", "United Kingdom", &["2011-02-16", "2011-09-28", "2011-11-22"], &[(2, 12.75), (3, 4.95)]),
    ("12353", "United Kingdom", &["2011-05-19", "2011-10-10"], &[(8, 2.95)]),
    ("12354", "France", &["2011-04-21", "2011-07-15", "2011-10-19", "2011-12-01"], &[(6, 6.35), (18, 0.85)]),
];

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();

    let mut invoice = 540_000;
    for (customer, country, dates, lines) in CUSTOMERS {
        for date in dates {
            invoice += 1;
            for (j, (quantity, price)) in lines.iter().enumerate() {
                writeln!(
                    file,
                    "{invoice},2{j}{:03},GIFT ITEM,{quantity},{date} 10:30:00,{price},{customer},{country}",
                    invoice % 1000
                )
                .unwrap();
            }
        }
    }

    // Rows the cleaner must drop
    writeln!(file, "C540999,22633,HAND WARMER UNION JACK,-6,2011-06-01 09:00:00,1.85,12346,United Kingdom").unwrap();
    writeln!(file, "541000,22633,HAND WARMER UNION JACK,6,2011-06-01 09:00:00,1.85,,United Kingdom").unwrap();
    writeln!(file, "541001,22633,HAND WARMER UNION JACK,0,2011-06-01 09:00:00,1.85,12353,United Kingdom").unwrap();

    file
}

fn config(country: Option<&str>) -> PipelineConfig {
    let mut args = Args::parse_from(["cltvforge"]);
    args.country = country.map(str::to_string);
    args.pipeline_config().unwrap()
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let raw = load_transactions(test_file.path()).unwrap();
    assert_eq!(raw.height(), 49);

    let report = run_pipeline(raw, &config(None)).unwrap();

    assert_eq!(report.cleaning.dropped_incomplete, 1);
    assert_eq!(report.cleaning.dropped_cancelled, 1);
    assert_eq!(report.cleaning.dropped_non_positive, 1);

    // 12350 bought once and is not modelled
    let table = &report.table;
    assert_eq!(table.rows.len(), 7);
    assert!(table.rows.iter().all(|r| r.profile.customer_id != "12350"));
    assert!(table.rows.iter().all(|r| r.profile.frequency >= 2));

    for row in &table.rows {
        assert!(row.clv.iter().all(|v| *v >= 0.0 && v.is_finite()));
        assert!(row.clv.windows(2).all(|w| w[0] <= w[1]));
        assert!((0.0..=1.0).contains(&row.p_alive));
        assert!(row.segment.is_some());
    }

    let leader = table.top_by_horizon(6, 1);
    assert_eq!(leader[0].profile.customer_id, "12347");
    assert_eq!(leader[0].segment.unwrap().label(), 'A');

    let counts: Vec<usize> = report.segment_summary.iter().map(|s| s.count).collect();
    assert_eq!(counts.len(), 4);
    assert_eq!(counts.iter().sum::<usize>(), 7);
}

#[test]
fn test_country_segmentation() {
    let test_file = create_test_csv();
    let raw = load_transactions(test_file.path()).unwrap();
    let report = run_pipeline(raw, &config(Some("United Kingdom"))).unwrap();

    for row in &report.table.rows {
        let is_uk = row.profile.country == "United Kingdom";
        assert_eq!(row.segment.is_some(), is_uk, "customer {}", row.profile.customer_id);
    }

    // one UK customer per segment
    assert_eq!(report.segment_summary.len(), 4);
    assert!(report.segment_summary.iter().all(|s| s.count == 1));
    let lapsed = report
        .table
        .rows
        .iter()
        .find(|r| r.profile.customer_id == "12349")
        .unwrap();
    assert_eq!(lapsed.segment.unwrap().label(), 'D');
}

#[test]
fn test_export_table() {
    let test_file = create_test_csv();
    let raw = load_transactions(test_file.path()).unwrap();
    let report = run_pipeline(raw, &config(None)).unwrap();

    let out = NamedTempFile::new().unwrap();
    write_cltv_csv(&report.table.to_columns(), out.path()).unwrap();

    let written = std::fs::read_to_string(out.path()).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(
        lines[0],
        "customer_id,country,recency,T,frequency,monetary,p_alive,expected_average_value,clv_1m,clv_6m,clv_12m,segment"
    );
}

#[test]
fn test_three_customer_projection_ranking() {
    let rows = [(5, 10.0, 20.0, 50.0), (2, 1.0, 15.0, 20.0), (8, 18.0, 19.0, 100.0)]
        .iter()
        .enumerate()
        .map(|(i, &(frequency, recency, tenure, monetary))| CustomerProfile {
            customer_id: format!("c{}", i + 1),
            country: "United Kingdom".to_string(),
            recency,
            tenure,
            frequency,
            monetary_total: monetary * frequency as f64,
            monetary,
        })
        .collect();
    let profiles = CustomerProfiles::new(TimeUnit::Week, rows);

    let bgf = fit_with_retry("BG/NBD", &FitOptions::with_penalizer(0.001), 2, |o| {
        fit_beta_geo(&profiles, o)
    })
    .unwrap();
    let ggf = fit_with_retry("Gamma-Gamma", &FitOptions::with_penalizer(0.01), 2, |o| {
        fit_gamma_gamma(&profiles, o)
    })
    .unwrap();

    let request = ProjectionRequest {
        horizon_months: 6,
        unit: TimeUnit::Week,
        discount_rate: 0.01,
    };
    let results = project_clv(&bgf, &ggf, &profiles, &request).unwrap();

    let best = results
        .iter()
        .max_by(|a, b| a.value.total_cmp(&b.value))
        .unwrap();
    assert_eq!(best.customer_id, "c3");
    assert!(results.iter().all(|r| r.value >= 0.0));
}

#[test]
fn test_single_customer_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536366,22633,HAND WARMER UNION JACK,6,2010-12-08 08:28:00,1.85,17850,United Kingdom").unwrap();

    let raw = load_transactions(file.path()).unwrap();
    let (transactions, _) = clean_transactions(raw).unwrap();
    let cutoff = cltvforge::data::parse_timestamp("2010-12-15 09:00:00").unwrap();
    let profiles = aggregate_customers(&transactions, cutoff, TimeUnit::Week).unwrap();

    assert_eq!(profiles.len(), 1);
    let customer = &profiles.rows[0];
    assert_eq!(customer.customer_id, "17850");
    assert_eq!(customer.frequency, 2);
    assert!((customer.recency - 1.0).abs() < 1e-12);
    assert!((customer.tenure - 2.0).abs() < 1e-12);
}

#[test]
fn test_no_repeat_customers_is_fatal() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34:00,2.75,13047,United Kingdom").unwrap();

    let raw = load_transactions(file.path()).unwrap();
    let err = run_pipeline(raw, &config(None)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CltvError>(),
        Some(CltvError::EmptyProfiles)
    ));
}

#[test]
fn test_cutoff_before_data_is_rejected() {
    let test_file = create_test_csv();
    let raw = load_transactions(test_file.path()).unwrap();

    let mut config = config(None);
    config.cutoff = cltvforge::data::parse_timestamp("2011-06-01").unwrap();
    let err = run_pipeline(raw, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CltvError>(),
        Some(CltvError::CutoffBeforeLastTransaction { .. })
    ));
}
