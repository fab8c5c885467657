//! Analysis configuration.
//!
//! Everything the pipeline needs to know is carried in [`AnalysisConfig`] and
//! handed to the pipeline at construction time. Values come from defaults, an
//! optional TOML file, and finally CLI flags (see `main.rs`).

use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Which upstream measurement schema feeds the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    /// One row per image, value is an object count
    Detection,
    /// One row per segmented object, value is its mask area in pixels
    Segmentation,
}

impl MeasurementMode {
    /// Header names accepted for the value column, lowercase
    pub fn value_column_candidates(&self) -> &'static [&'static str] {
        match self {
            MeasurementMode::Detection => &["count", "seedling_count", "seedling count"],
            MeasurementMode::Segmentation => &["area", "mask_area", "mask area"],
        }
    }
}

/// What to do with rows whose image id has no plot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Drop the row and record a diagnostic
    Drop,
    /// Keep the row under the `unknown_plot` bucket
    Bucket,
    /// Fail the whole run
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    #[value(name = "minmax")]
    MinMax,
    #[value(name = "zscore")]
    ZScore,
}

/// Percentile interpolation, named after the numpy methods of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QuantileMethod {
    Linear,
    Lower,
    Higher,
    Nearest,
    Midpoint,
}

/// How values are discretized before computing entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntropyBinning {
    /// `entropy_bins` equal-width bins over the plot's [min, max]
    Binned,
    /// One bin per distinct value
    Distinct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub mode: MeasurementMode,
    pub delimiter: char,
    pub on_malformed: MalformedPolicy,
    pub unknown_plot: String,
    pub iqr_k: f64,
    pub iqr_min_samples: usize,
    pub quantile_method: QuantileMethod,
    pub entropy: EntropyBinning,
    pub entropy_bins: usize,
    pub cv_percent: bool,
    pub normalize: NormalizationMethod,
    pub target_range: [f64; 2],
    /// `None` means "follow the mode": drop zeros for segmentation only
    pub drop_zero_values: Option<bool>,
    pub id_column: Option<String>,
    pub value_column: Option<String>,
    pub min_mask_area: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::Segmentation,
            delimiter: '-',
            on_malformed: MalformedPolicy::Drop,
            unknown_plot: "unknown".to_string(),
            iqr_k: 1.5,
            iqr_min_samples: 4,
            quantile_method: QuantileMethod::Linear,
            entropy: EntropyBinning::Binned,
            entropy_bins: 10,
            cv_percent: false,
            normalize: NormalizationMethod::MinMax,
            target_range: [0.0, 1.0],
            drop_zero_values: None,
            id_column: None,
            value_column: None,
            min_mask_area: 1,
        }
    }
}

impl AnalysisConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Whether zero-valued rows are discarded at ingestion
    pub fn drops_zero_values(&self) -> bool {
        self.drop_zero_values
            .unwrap_or(self.mode == MeasurementMode::Segmentation)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.iqr_k.is_finite() || self.iqr_k < 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "iqr_k must be a non-negative number, got {}",
                self.iqr_k
            )));
        }
        if self.iqr_min_samples == 0 {
            return Err(AnalysisError::InvalidConfig(
                "iqr_min_samples must be at least 1".to_string(),
            ));
        }
        if self.entropy_bins == 0 {
            return Err(AnalysisError::InvalidConfig(
                "entropy_bins must be at least 1".to_string(),
            ));
        }
        let [lo, hi] = self.target_range;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(AnalysisError::InvalidConfig(format!(
                "target_range must satisfy lo < hi, got [{}, {}]",
                lo, hi
            )));
        }
        if self.delimiter.is_whitespace() {
            return Err(AnalysisError::InvalidConfig(
                "delimiter must not be whitespace".to_string(),
            ));
        }
        if self.unknown_plot.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "unknown_plot must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
