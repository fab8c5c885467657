//! End-to-end runs of the standard analysis pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use phenostats::analysis::outliers::IqrParams;
use phenostats::analysis::stats::AggregateParams;
use phenostats::analysis::steps::{AggregationStep, GroupingStep, OutlierFilterStep};
use phenostats::config::MalformedPolicy;
use phenostats::{analyze, build_standard_pipeline, CancelFlag, PipelineContext, PipelineStep};

mod common;
use common::*;

#[test]
fn test_two_plot_example_with_lower_quartiles() -> anyhow::Result<()> {
    let data = analyze(two_plot_example(), &lower_quartile_config())?;

    // Plot "1" loses 200 (Q1 = 10, Q3 = 12, upper fence 15)
    let plot1 = data.statistics_for("1").expect("plot 1 aggregated");
    assert_eq!(plot1.count, 3);
    assert_eq!(plot1.retained, 2);
    assert_close(plot1.mean, 11.0);
    assert_close(plot1.std_dev, 2f64.sqrt());
    assert_close(plot1.cv, 2f64.sqrt() / 11.0);
    assert_close(plot1.entropy, 1.0);
    assert_eq!(data.outliers_removed, 1);

    let plot2 = data.statistics_for("2").expect("plot 2 aggregated");
    assert_close(plot2.mean, 8.0);
    assert_close(plot2.std_dev, 0.0);
    assert!(data
        .diagnostics_of(DiagnosticKind::LowSampleSize)
        .any(|d| d.plot_id.as_deref() == Some("2")));

    let cleaned: Vec<&str> = data.cleaned_measurements().map(|m| m.image_id.as_str()).collect();
    assert_eq!(cleaned, vec!["1-a.jpg", "1-b.jpg", "2-a.jpg"]);

    // Two plots, every column has spread: plot 1 is the max everywhere
    assert_eq!(data.normalized.len(), 2);
    assert_eq!(data.normalized[0].plot_id, "1");
    assert_eq!(data.normalized[0].mean, 1.0);
    assert_eq!(data.normalized[0].entropy, 1.0);
    assert_eq!(data.normalized[1].std_dev, 0.0);

    Ok(())
}

#[test]
fn test_two_plot_example_with_defaults() -> anyhow::Result<()> {
    let data = analyze(two_plot_example(), &AnalysisConfig::default())?;

    // Three values are too few for quartiles, so 200 stays
    let plot1 = data.statistics_for("1").unwrap();
    assert_eq!(plot1.retained, 3);
    assert_close(plot1.mean, 74.0);
    assert_eq!(data.outliers_removed, 0);
    assert_eq!(data.diagnostics_of(DiagnosticKind::LowSampleSize).count(), 3);

    Ok(())
}

#[test]
fn test_malformed_identifier_dropped() -> anyhow::Result<()> {
    let mut rows = two_plot_example();
    rows.push(record("IMG_0042.jpg", 11.0));

    let data = analyze(rows, &AnalysisConfig::default())?;

    assert_eq!(data.rows_dropped, 1);
    assert_eq!(data.groups.len(), 2);
    let diagnostic = data
        .diagnostics_of(DiagnosticKind::MalformedIdentifier)
        .next()
        .expect("malformed id reported");
    assert_eq!(diagnostic.image_id.as_deref(), Some("IMG_0042.jpg"));
    assert!(data.cleaned_measurements().all(|m| m.image_id != "IMG_0042.jpg"));

    Ok(())
}

#[test]
fn test_malformed_identifier_bucketed() -> anyhow::Result<()> {
    let mut rows = two_plot_example();
    rows.push(record("IMG_0042.jpg", 11.0));
    let config = AnalysisConfig {
        on_malformed: MalformedPolicy::Bucket,
        ..AnalysisConfig::default()
    };

    let data = analyze(rows, &config)?;

    assert_eq!(data.rows_dropped, 0);
    let ids: Vec<&str> = data.groups.iter().map(|g| g.plot_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "unknown"]);
    assert!(data.statistics_for("unknown").is_some());
    assert_eq!(data.diagnostics_of(DiagnosticKind::MalformedIdentifier).count(), 1);

    Ok(())
}

#[test]
fn test_malformed_identifier_rejected() {
    let mut rows = two_plot_example();
    rows.push(record("IMG_0042.jpg", 11.0));
    let config = AnalysisConfig {
        on_malformed: MalformedPolicy::Reject,
        ..AnalysisConfig::default()
    };

    let err = analyze(rows, &config).unwrap_err();
    assert!(matches!(
        analysis_error(&err),
        Some(AnalysisError::MalformedIdentifier { .. })
    ));
}

#[test]
fn test_plots_in_natural_order() -> anyhow::Result<()> {
    let rows = records(&[
        ("10-a.jpg", 1.0),
        ("b-a.jpg", 1.0),
        ("2-a.jpg", 1.0),
        ("1-a.jpg", 1.0),
        ("2-b.jpg", 2.0),
    ]);
    let data = analyze(rows, &AnalysisConfig::default())?;

    let ids: Vec<&str> = data.statistics.iter().map(|s| s.plot_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "10", "b"]);
    let normalized: Vec<&str> = data.normalized.iter().map(|s| s.plot_id.as_str()).collect();
    assert_eq!(normalized, ids);

    Ok(())
}

#[test]
fn test_zero_counts_give_nan_cv() -> anyhow::Result<()> {
    let rows = records(&[("5-a.jpg", 0.0), ("5-b.jpg", 0.0), ("6-a.jpg", 3.0), ("6-b.jpg", 5.0)]);
    let data = analyze(rows, &AnalysisConfig::default())?;

    let plot5 = data.statistics_for("5").unwrap();
    assert_close(plot5.mean, 0.0);
    assert!(plot5.cv.is_nan());
    assert!(data
        .diagnostics_of(DiagnosticKind::DegenerateMetric)
        .any(|d| d.plot_id.as_deref() == Some("5")));

    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let config = AnalysisConfig {
        iqr_k: -1.0,
        ..AnalysisConfig::default()
    };
    let err = analyze(two_plot_example(), &config).unwrap_err();
    assert!(matches!(analysis_error(&err), Some(AnalysisError::InvalidConfig(_))));
}

#[test]
fn test_cancelled_before_start() {
    let cancel = CancelFlag::new();
    let pipeline = build_standard_pipeline(&AnalysisConfig::default(), false)
        .with_cancel_flag(cancel.clone());
    cancel.cancel();

    let err = pipeline.run(two_plot_example()).unwrap_err();
    assert!(matches!(analysis_error(&err), Some(AnalysisError::Cancelled)));
}

/// Flips the run's cancel flag, as a caller on another thread would
struct CancelDuringRun;

impl PipelineStep for CancelDuringRun {
    fn process(&self, data: AnalysisData, context: &PipelineContext) -> anyhow::Result<AnalysisData> {
        context.cancel.cancel();
        Ok(data)
    }

    fn name(&self) -> &str {
        "Cancel During Run"
    }
}

/// Counts how often it runs
struct CountingStep(Arc<AtomicUsize>);

impl PipelineStep for CountingStep {
    fn process(&self, data: AnalysisData, _context: &PipelineContext) -> anyhow::Result<AnalysisData> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn name(&self) -> &str {
        "Counting"
    }
}

#[test]
fn test_cancelled_during_run_skips_later_steps() {
    let runs = Arc::new(AtomicUsize::new(0));
    let pipeline = build_standard_pipeline(&AnalysisConfig::default(), false)
        .add_step(Arc::new(CancelDuringRun))
        .add_step(Arc::new(CountingStep(runs.clone())));

    let err = pipeline.run(two_plot_example()).unwrap_err();

    assert!(matches!(analysis_error(&err), Some(AnalysisError::Cancelled)));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(pipeline.cancel_flag().is_cancelled());
}

fn grouped_example() -> anyhow::Result<AnalysisData> {
    let grouping = GroupingStep {
        delimiter: '-',
        on_malformed: MalformedPolicy::Drop,
        unknown_plot: "unknown".to_string(),
    };
    grouping.process(AnalysisData::from_records(two_plot_example()), &PipelineContext::default())
}

#[test]
fn test_outlier_filtering_stops_between_plots() -> anyhow::Result<()> {
    let data = grouped_example()?;
    let context = PipelineContext::default();
    context.cancel.cancel();

    let step = OutlierFilterStep {
        params: IqrParams::default(),
    };
    let err = step.process(data, &context).unwrap_err();

    assert!(matches!(analysis_error(&err), Some(AnalysisError::Cancelled)));
    Ok(())
}

#[test]
fn test_aggregation_stops_between_plots() -> anyhow::Result<()> {
    let mut data = grouped_example()?;
    data.cleaned = data.groups.clone();
    let context = PipelineContext::default();
    context.cancel.cancel();

    let step = AggregationStep {
        params: AggregateParams::default(),
    };
    let err = step.process(data, &context).unwrap_err();

    assert!(matches!(analysis_error(&err), Some(AnalysisError::Cancelled)));
    Ok(())
}

#[test]
fn test_partial_run_stops_after_filtering() -> anyhow::Result<()> {
    let pipeline = build_standard_pipeline(&lower_quartile_config(), false);
    assert_eq!(
        pipeline.step_names(),
        vec!["Plot Grouping", "Outlier Filtering", "Aggregation", "Normalization"]
    );

    let data = pipeline.run_partial(AnalysisData::from_records(two_plot_example()), 2)?;
    assert_eq!(data.cleaned.len(), 2);
    assert!(data.statistics.is_empty());
    assert!(data.normalized.is_empty());

    Ok(())
}

#[test]
fn test_debug_output_per_step() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");

    let pipeline = build_standard_pipeline(&AnalysisConfig::default(), true).with_debug(debug_dir.clone())?;
    pipeline.run(two_plot_example())?;

    assert!(debug_dir.join("00_input").join("1_raw_measurements.csv").exists());
    assert!(debug_dir.join("01_plot_grouping").join("diagnostics.csv").exists());
    assert!(debug_dir.join("03_aggregation").join("3_plot_statistics.csv").exists());
    assert!(debug_dir.join("04_normalization").join("4_normalized_statistics.csv").exists());

    // Reusing a non-empty directory is refused
    let again = build_standard_pipeline(&AnalysisConfig::default(), false).with_debug(debug_dir);
    assert!(again.is_err());

    Ok(())
}

#[test]
fn test_empty_input() -> anyhow::Result<()> {
    let data = analyze(Vec::new(), &AnalysisConfig::default())?;
    assert!(data.groups.is_empty());
    assert!(data.statistics.is_empty());
    assert!(data.normalized.is_empty());
    Ok(())
}
