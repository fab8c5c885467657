mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from phenostats for tests
pub use phenostats::{
    AnalysisConfig, AnalysisData, AnalysisError, DiagnosticKind, PlotStatistics, RawRecord,
};
