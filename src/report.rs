//! Report tables.
//!
//! Every table is written with an explicit header, even when empty, and rows
//! come out in the order the pipeline keeps them (plots already sorted), so
//! the same input always yields the same bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::models::DiagnosticKind;
use crate::pipeline::AnalysisData;

pub const RAW_FILE: &str = "1_raw_measurements.csv";
pub const CLEANED_FILE: &str = "2_cleaned_measurements.csv";
pub const STATISTICS_FILE: &str = "3_plot_statistics.csv";
pub const NORMALIZED_FILE: &str = "4_normalized_statistics.csv";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.csv";
pub const SUMMARY_FILE: &str = "summary.json";

const RAW_HEADER: &[&str] = &["image_id", "value"];
const CLEANED_HEADER: &[&str] = &["plot_id", "image_id", "value"];
const STATISTICS_HEADER: &[&str] = &["plot_id", "count", "retained", "mean", "std_dev", "cv", "entropy"];
const NORMALIZED_HEADER: &[&str] = &["plot_id", "mean", "std_dev", "cv", "entropy"];
const DIAGNOSTICS_HEADER: &[&str] = &["kind", "plot_id", "image_id", "message"];

/// Run-level counts written next to the tables
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: String,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub zero_values_skipped: usize,
    pub plots: usize,
    pub plots_aggregated: usize,
    pub outliers_removed: usize,
    pub diagnostics: BTreeMap<String, usize>,
    pub config: AnalysisConfig,
}

impl RunSummary {
    pub fn new(input: &Path, data: &AnalysisData, config: &AnalysisConfig) -> Self {
        let mut diagnostics = BTreeMap::new();
        for diagnostic in &data.diagnostics {
            *diagnostics.entry(diagnostic.kind.to_string()).or_insert(0) += 1;
        }

        Self {
            input: input.display().to_string(),
            rows_read: data.raw.len() + data.zero_values_skipped + ingestion_drops(data),
            rows_dropped: data.rows_dropped,
            zero_values_skipped: data.zero_values_skipped,
            plots: data.groups.len(),
            plots_aggregated: data.statistics.len(),
            outliers_removed: data.outliers_removed,
            diagnostics,
            config: config.clone(),
        }
    }
}

/// Rows dropped before they became raw records (bad values)
fn ingestion_drops(data: &AnalysisData) -> usize {
    data.diagnostics_of(DiagnosticKind::MalformedValue).count()
}

/// Write `header` then one row per item
pub fn write_table<W: Write, T: Serialize>(
    writer: W,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_file<T: Serialize>(
    dir: &Path,
    name: &str,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<PathBuf, AnalysisError> {
    let path = dir.join(name);
    let report_error = |message: String| AnalysisError::Report {
        path: path.clone(),
        message,
    };

    let file = File::create(&path).map_err(|e| report_error(e.to_string()))?;
    write_table(BufWriter::new(file), header, rows).map_err(|e| report_error(e.to_string()))?;
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<(), AnalysisError> {
    std::fs::create_dir_all(dir).map_err(|e| AnalysisError::Report {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write the four data views and the diagnostics table into `dir`
pub fn write_tables(dir: &Path, data: &AnalysisData) -> Result<Vec<PathBuf>, AnalysisError> {
    ensure_dir(dir)?;

    Ok(vec![
        write_file(dir, RAW_FILE, RAW_HEADER, &data.raw)?,
        write_file(dir, CLEANED_FILE, CLEANED_HEADER, data.cleaned_measurements())?,
        write_file(dir, STATISTICS_FILE, STATISTICS_HEADER, &data.statistics)?,
        write_file(dir, NORMALIZED_FILE, NORMALIZED_HEADER, &data.normalized)?,
        write_file(dir, DIAGNOSTICS_FILE, DIAGNOSTICS_HEADER, &data.diagnostics)?,
    ])
}

/// Write all tables plus `summary.json`; returns the paths written
pub fn write_report(
    dir: &Path,
    input: &Path,
    data: &AnalysisData,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>, AnalysisError> {
    let mut written = write_tables(dir, data)?;

    let path = dir.join(SUMMARY_FILE);
    let summary = RunSummary::new(input, data, config);
    let mut json = serde_json::to_string_pretty(&summary).map_err(|e| AnalysisError::Report {
        path: path.clone(),
        message: e.to_string(),
    })?;
    json.push('\n');
    std::fs::write(&path, json).map_err(|e| AnalysisError::Report {
        path: path.clone(),
        message: e.to_string(),
    })?;
    written.push(path);

    Ok(written)
}
