//! Error types for the migration pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::JobReport;

/// Errors that abort a migration job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Opening an input file failed.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A translation artifact is missing or malformed.
    #[error("invalid translation artifact {}: {message}", path.display())]
    Artifact { path: PathBuf, message: String },

    /// The destination returned an error that is not rate limiting.
    #[error("destination error: {0}")]
    Directory(#[from] ferry_workos::DirectoryError),

    /// A task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Any other unrecoverable condition.
    #[error("{0}")]
    Fatal(String),
}

/// A job that stopped on a fatal error, with the work done before it.
#[derive(Debug, Error)]
#[error("{} migration aborted after {} of {} records: {error}", partial.kind, partial.migrated, partial.records_read)]
pub struct JobFailure {
    pub error: PipelineError,
    pub partial: JobReport,
}
