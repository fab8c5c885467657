use std::path::PathBuf;

/// Fatal errors raised by the analysis library.
///
/// Anything row-level (bad identifiers, bad values, tiny plots) is reported
/// as a [`crate::models::Diagnostic`] instead and never ends up here, unless
/// the caller opted into [`crate::config::MalformedPolicy::Reject`].
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Failed to read measurement table {path}: {message}")]
    Ingestion { path: PathBuf, message: String },

    #[error("Measurement table {path} has no {role} column (looked for: {candidates})")]
    MissingColumn {
        path: PathBuf,
        role: &'static str,
        candidates: String,
    },

    #[error("Image id '{image_id}' has no plot prefix before '{delimiter}'")]
    MalformedIdentifier { image_id: String, delimiter: char },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to measure mask {path}: {message}")]
    Mask { path: PathBuf, message: String },

    #[error("Failed to write report {path}: {message}")]
    Report { path: PathBuf, message: String },

    #[error("Analysis cancelled")]
    Cancelled,
}
