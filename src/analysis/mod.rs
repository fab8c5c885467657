pub mod normalize;
pub mod outliers;
pub mod plot_id;
pub mod stats;
pub mod steps;

use std::sync::Arc;

use anyhow::Result;

use crate::config::AnalysisConfig;
use crate::models::RawRecord;
use crate::pipeline::{AnalysisData, Pipeline};

/// Build the standard grouping → filtering → aggregation → normalization pipeline
pub fn build_standard_pipeline(config: &AnalysisConfig, verbose: bool) -> Pipeline {
    use steps::*;

    Pipeline::new()
        .with_verbose(verbose)
        .add_step(Arc::new(GroupingStep {
            delimiter: config.delimiter,
            on_malformed: config.on_malformed,
            unknown_plot: config.unknown_plot.clone(),
        }))
        .add_step(Arc::new(OutlierFilterStep {
            params: config.into(),
        }))
        .add_step(Arc::new(AggregationStep {
            params: config.into(),
        }))
        .add_step(Arc::new(NormalizationStep {
            params: config.into(),
        }))
}

/// Validate `config` and run the standard pipeline on already ingested rows
pub fn analyze(records: Vec<RawRecord>, config: &AnalysisConfig) -> Result<AnalysisData> {
    config.validate()?;
    build_standard_pipeline(config, false).run(records)
}
