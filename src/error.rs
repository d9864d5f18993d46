//! Error types for record loading

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RawError>;

#[derive(Error, Debug)]
pub enum RawError {
    /// Revision outside every known layout threshold, or a self-described
    /// schema that cannot be right (negative field size, unknown type tag).
    #[error("Unsupported format for {record} at revision {revision}: {reason}")]
    FormatUnsupported {
        record: String,
        revision: u32,
        reason: String,
    },

    /// Backing storage missing or zero-length. Retryable while the file is
    /// still being acquired.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Truncated {record}: needed {expected} bytes at offset {offset}, only {available} available")]
    TruncatedRecord {
        record: String,
        offset: u64,
        expected: usize,
        available: usize,
    },

    #[error("Index {index} out of range for {what} (len {len})")]
    InconsistentIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RawError {
    /// Stable error code for callers that log or match on strings.
    pub fn code(&self) -> &'static str {
        match self {
            RawError::FormatUnsupported { .. } => "FORMAT_UNSUPPORTED",
            RawError::DataUnavailable(_) => "DATA_UNAVAILABLE",
            RawError::TruncatedRecord { .. } => "TRUNCATED_RECORD",
            RawError::InconsistentIndex { .. } => "INCONSISTENT_INDEX",
            RawError::TaskFailed { .. } => "TASK_FAILED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Only missing data is worth retrying (live acquisition).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RawError::DataUnavailable(_))
    }

    pub(crate) fn unsupported(record: &str, revision: u32, reason: impl Into<String>) -> Self {
        RawError::FormatUnsupported {
            record: record.to_string(),
            revision,
            reason: reason.into(),
        }
    }
}
