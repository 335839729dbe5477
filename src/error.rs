//! Report error taxonomy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// No observations anywhere, so there is no reference "current time"
    #[error("No status data found")]
    DataUnavailable,

    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Report {report_id} is {status}")]
    NotReady { report_id: String, status: String },

    #[error("Report {report_id} is in an invalid state: {reason}")]
    InvalidState { report_id: String, reason: String },

    #[error("Datastore error: {0}")]
    Datastore(String),

    #[error("Failed to encode report: {0}")]
    Encoding(String),

    #[error("Report worker panicked: {0}")]
    WorkerPanic(String),
}

impl ReportError {
    /// HTTP status code the error surfaces as
    pub fn status_code(&self) -> u16 {
        match self {
            ReportError::NotFound(_) => 404,
            ReportError::NotReady { .. } => 400,
            ReportError::DataUnavailable
            | ReportError::InvalidState { .. }
            | ReportError::Datastore(_)
            | ReportError::Encoding(_)
            | ReportError::WorkerPanic(_) => 500,
        }
    }
}
