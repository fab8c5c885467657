pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod report;

pub use analysis::{analyze, build_standard_pipeline};
pub use config::{AnalysisConfig, MalformedPolicy, MeasurementMode, NormalizationMethod};
pub use error::AnalysisError;
pub use models::{
    Diagnostic, DiagnosticKind, Measurement, NormalizedStatistics, PlotGroup, PlotStatistics,
    RawRecord,
};
pub use pipeline::{AnalysisData, CancelFlag, Pipeline, PipelineContext, PipelineStep};
