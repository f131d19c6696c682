//! Error types for the import pipeline.
//!
//! [`RecordError`] is scoped to one input record and always ends as a
//! `failed` result; the batch keeps going. [`ImportError`] is raised before a
//! batch starts (bad configuration, unreadable input) and aborts the run.

use folio_client::FolioClientError;
use thiserror::Error;

/// Result alias for batch-level operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Why a single record could not be reconciled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The row is missing a required field or carries an unusable value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// More than one remote record carries the match key value.
    #[error("ambiguous match: {count} remote records have {field} == \"{value}\"")]
    AmbiguousMatch {
        field: String,
        value: String,
        count: usize,
    },

    /// 422-class rejection that retry-as-update could not resolve.
    #[error("remote conflict: {0}")]
    Conflict(String),

    /// Timeout, 5xx or 429 that survived the retry policy.
    #[error("remote unavailable: {0}")]
    Transient(String),

    /// Any other remote failure (other 4xx, malformed response).
    #[error("remote error: {0}")]
    Fatal(String),
}

impl RecordError {
    /// Classify a client error raised while performing `operation`.
    pub fn from_remote(operation: &str, err: FolioClientError) -> Self {
        match err {
            FolioClientError::Validation { detail, .. } => RecordError::Conflict(detail),
            FolioClientError::MaxRetriesExceeded { message, .. } => {
                RecordError::Transient(message)
            }
            e if e.is_retryable() || e.is_server_error() => {
                RecordError::Transient(format!("{operation}: {e}"))
            }
            e => RecordError::Fatal(format!("{operation}: {e}")),
        }
    }

    /// Short machine-readable kind, used in exports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Validation(_) => "validation",
            RecordError::AmbiguousMatch { .. } => "ambiguous_match",
            RecordError::Conflict(_) => "conflict",
            RecordError::Transient(_) => "transient",
            RecordError::Fatal(_) => "fatal",
        }
    }
}

/// Errors that stop a batch before any record is processed.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import configuration: {0}")]
    InvalidConfig(String),

    #[error("line {line}: {message}")]
    Input { line: usize, message: String },

    #[error("unsupported input format '{0}' (expected csv or jsonl)")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
