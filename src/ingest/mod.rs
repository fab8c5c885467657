//! Reading the upstream measurement table.
//!
//! The table comes from the detection/segmentation stage: one row per image
//! (detection counts) or one row per object (mask areas), as CSV/TSV text or
//! as a spreadsheet workbook. Only the identifier and value columns are used;
//! everything else is ignored.

pub mod masks;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::config::{AnalysisConfig, MeasurementMode};
use crate::error::AnalysisError;
use crate::models::{Diagnostic, DiagnosticKind, RawRecord};
use crate::pipeline::AnalysisData;

/// Header names accepted for the identifier column, lowercase
pub const ID_COLUMN_CANDIDATES: &[&str] = &["image_id", "filename", "image name", "image"];

/// Rows read from one input, plus what was skipped on the way
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub records: Vec<RawRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Rows dropped for a malformed value
    pub rows_dropped: usize,
    /// Rows dropped because their value was zero
    pub zero_values_skipped: usize,
}

impl IngestOutcome {
    /// Seed the pipeline state; diagnostics were already logged while reading
    pub fn into_analysis_data(self) -> AnalysisData {
        let mut data = AnalysisData::from_records(self.records);
        data.diagnostics = self.diagnostics;
        data.rows_dropped = self.rows_dropped;
        data.zero_values_skipped = self.zero_values_skipped;
        data
    }
}

/// Load measurements from a table file, or from a directory of mask images
/// when running in segmentation mode.
pub fn load_measurements(path: &Path, config: &AnalysisConfig) -> Result<IngestOutcome, AnalysisError> {
    if path.is_dir() {
        if config.mode != MeasurementMode::Segmentation {
            return Err(AnalysisError::Ingestion {
                path: path.to_path_buf(),
                message: "a directory of mask images can only be analyzed in segmentation mode"
                    .to_string(),
            });
        }
        let records = masks::measure_mask_dir(path, config.min_mask_area)?;
        return Ok(IngestOutcome {
            records,
            ..Default::default()
        });
    }

    read_measurement_table(path, config)
}

/// Extensions read as spreadsheet workbooks rather than delimited text
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read a measurement table: a workbook (first sheet) for spreadsheet
/// extensions, tab-separated text for `.tsv`, CSV otherwise
pub fn read_measurement_table(path: &Path, config: &AnalysisConfig) -> Result<IngestOutcome, AnalysisError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        return read_workbook(path, config);
    }

    let file = File::open(path).map_err(|e| AnalysisError::Ingestion {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let delimiter = if extension == "tsv" { b'\t' } else { b',' };

    parse_measurement_table(file, path, delimiter, config)
}

/// Parse a measurement table from any reader; `source` is only used in errors.
///
/// Only the identifier and value cells are decoded, so bytes that are not
/// UTF-8 elsewhere in a row are ignored. CSV syntax errors are fatal.
pub fn parse_measurement_table<R: Read>(
    reader: R,
    source: &Path,
    delimiter: u8,
    config: &AnalysisConfig,
) -> Result<IngestOutcome, AnalysisError> {
    let ingestion_error = |message: String| AnalysisError::Ingestion {
        path: source.to_path_buf(),
        message,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()
        .map_err(|e| ingestion_error(e.to_string()))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let columns = TableColumns::resolve(&headers, config, source)?;

    let mut outcome = IngestOutcome::default();

    for result in rdr.byte_records() {
        let record = result.map_err(|e| ingestion_error(e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let id_bytes = record.get(columns.id).unwrap_or_default();
        let value_bytes = record.get(columns.value).unwrap_or_default();

        let image_id = std::str::from_utf8(id_bytes)
            .map(str::to_string)
            .map_err(|_| String::from_utf8_lossy(id_bytes).into_owned());
        let value = match std::str::from_utf8(value_bytes) {
            Ok(text) => parse_value(text),
            Err(_) => Err(String::from_utf8_lossy(value_bytes).into_owned()),
        };

        outcome.push_row(line, image_id, value, columns.drop_zero);
    }

    outcome.log_summary(source);
    Ok(outcome)
}

/// Read the first sheet of a workbook; its first row is the header.
///
/// Numeric cells are taken as they are, text cells are parsed like CSV fields.
pub fn read_workbook(path: &Path, config: &AnalysisConfig) -> Result<IngestOutcome, AnalysisError> {
    let ingestion_error = |message: String| AnalysisError::Ingestion {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| ingestion_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ingestion_error("workbook has no sheets".to_string()))?
        .map_err(|e| ingestion_error(e.to_string()))?;

    // 1-based sheet row of the header, for diagnostics
    let header_row = range.start().map(|(row, _)| u64::from(row) + 1).unwrap_or(1);
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .unwrap_or_default();
    let columns = TableColumns::resolve(&headers, config, path)?;

    let mut outcome = IngestOutcome::default();

    for (offset, row) in rows.enumerate() {
        let line = header_row + offset as u64 + 1;
        let image_id = row.get(columns.id).map(cell_text).unwrap_or_default();
        let value = row.get(columns.value).map_or_else(|| Err(String::new()), cell_value);

        outcome.push_row(line, Ok(image_id), value, columns.drop_zero);
    }

    outcome.log_summary(path);
    Ok(outcome)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Result<f64, String> {
    match cell {
        Data::Float(v) if v.is_finite() => Ok(*v),
        Data::Int(v) => Ok(*v as f64),
        Data::String(text) => parse_value(text.trim()),
        other => Err(other.to_string()),
    }
}

/// A finite number, or the offending text
fn parse_value(text: &str) -> Result<f64, String> {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(text.to_string()),
    }
}

/// Positions of the used columns, resolved once from the header row
struct TableColumns {
    id: usize,
    value: usize,
    drop_zero: bool,
}

impl TableColumns {
    fn resolve(headers: &[String], config: &AnalysisConfig, source: &Path) -> Result<Self, AnalysisError> {
        Ok(Self {
            id: resolve_id_column(headers, config, source)?,
            value: resolve_value_column(headers, config, source)?,
            drop_zero: config.drops_zero_values(),
        })
    }
}

impl IngestOutcome {
    /// Keep one decoded row, or record why it was dropped.
    /// An `Err` identifier carries the lossily decoded text.
    fn push_row(&mut self, line: u64, image_id: Result<String, String>, value: Result<f64, String>, drop_zero: bool) {
        let image_id = match image_id {
            Ok(image_id) => image_id,
            Err(lossy) => {
                self.drop_row(
                    Diagnostic::new(
                        DiagnosticKind::MalformedIdentifier,
                        format!("line {}: identifier is not valid UTF-8, row dropped", line),
                    )
                    .for_image(lossy),
                );
                return;
            }
        };

        let value = match value {
            Ok(value) => value,
            Err(text) => {
                self.drop_row(
                    Diagnostic::new(
                        DiagnosticKind::MalformedValue,
                        format!("line {}: value '{}' is not a finite number, row dropped", line, text),
                    )
                    .for_image(image_id),
                );
                return;
            }
        };

        if value == 0.0 && drop_zero {
            self.zero_values_skipped += 1;
            return;
        }

        self.records.push(RawRecord { image_id, value });
    }

    fn drop_row(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
        self.rows_dropped += 1;
    }

    fn log_summary(&self, source: &Path) {
        tracing::info!(
            "Read {} measurements from {} ({} dropped, {} zero values skipped)",
            self.records.len(),
            source.display(),
            self.rows_dropped,
            self.zero_values_skipped
        );
    }
}

fn normalized_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn find_header(headers: &[String], name: &str) -> Option<usize> {
    let wanted = normalized_header(name);
    headers.iter().position(|h| normalized_header(h) == wanted)
}

fn resolve_id_column(
    headers: &[String],
    config: &AnalysisConfig,
    source: &Path,
) -> Result<usize, AnalysisError> {
    let candidates: Vec<&str> = match &config.id_column {
        Some(name) => vec![name.as_str()],
        None => ID_COLUMN_CANDIDATES.to_vec(),
    };

    candidates
        .iter()
        .find_map(|name| find_header(headers, name))
        .ok_or_else(|| AnalysisError::MissingColumn {
            path: source.to_path_buf(),
            role: "identifier",
            candidates: candidates.join(", "),
        })
}

fn resolve_value_column(
    headers: &[String],
    config: &AnalysisConfig,
    source: &Path,
) -> Result<usize, AnalysisError> {
    if let Some(name) = &config.value_column {
        return find_header(headers, name).ok_or_else(|| AnalysisError::MissingColumn {
            path: source.to_path_buf(),
            role: "value",
            candidates: name.clone(),
        });
    }

    let candidates = config.mode.value_column_candidates();
    if let Some(idx) = candidates.iter().find_map(|name| find_header(headers, name)) {
        return Ok(idx);
    }

    // Detection exports name the column after the class, e.g. "Class 0 Count"
    if config.mode == MeasurementMode::Detection {
        if let Some(idx) = headers
            .iter()
            .position(|h| normalized_header(h).ends_with(" count"))
        {
            return Ok(idx);
        }
    }

    let mut listed = candidates.join(", ");
    if config.mode == MeasurementMode::Detection {
        listed.push_str(", *count");
    }
    Err(AnalysisError::MissingColumn {
        path: source.to_path_buf(),
        role: "value",
        candidates: listed,
    })
}
