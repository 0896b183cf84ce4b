//! Error types for the petite-souris library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Error`] — **Fatal** for one operation: a gateway request that cannot
//!   be converted (bad upload, remote job failure, timeout) or an
//!   orchestrator call that cannot proceed (unknown job id, nothing to save).
//!
//! * [`JobError`] — **Non-fatal**: one queued file failed on its way through
//!   the gateway. It is recorded on that [`crate::orchestrator::ConversionJob`]
//!   and the queue carries on with the next file.
//!
//! Remote job deletion failures are neither: they are logged with
//! `tracing::warn!` and dropped, because the conversion already succeeded.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`Error`], used for logging and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something we will never convert. Not retried.
    Validation,
    /// The remote conversion service failed or returned something unusable.
    Remote,
    /// The remote job did not finish in time.
    Timeout,
    /// A local orchestrator request referred to missing state.
    Client,
    /// Configuration, I/O or anything unexpected.
    Internal,
}

/// All fatal errors returned by the petite-souris library.
#[derive(Debug, Error)]
pub enum Error {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The multipart request had no `file` field.
    #[error("No file provided")]
    MissingFile,

    /// The upload is bigger than the configured maximum.
    #[error("File too large. Maximum size is {limit_mb}MB")]
    FileTooLarge { limit_mb: String },

    /// The file extension is not in the format table.
    #[error("Invalid file type '{extension}'. Supported formats: {supported}")]
    UnsupportedFormat { extension: String, supported: String },

    /// Input and output resolve to the same format.
    #[error("Input and output formats cannot be the same ({format})")]
    IdenticalFormats { format: String },

    /// The multipart body could not be parsed.
    #[error("Malformed upload: {0}")]
    BadRequest(String),

    // ── Remote service errors ─────────────────────────────────────────────
    /// The remote service refused to create the job.
    #[error("Failed to create conversion job: {message}")]
    JobCreationFailed { message: String },

    /// Uploading the source bytes to the remote import task failed.
    #[error("Failed to upload file for conversion: {message}")]
    UploadFailed { message: String },

    /// The remote job did not reach a terminal state in time.
    #[error("Conversion timed out after {secs}s waiting for the remote job")]
    Timeout { secs: u64 },

    /// The job finished without a downloadable export.
    ///
    /// `diagnostics` holds the raw job payload for operators; it is logged
    /// but not part of the user-facing message.
    #[error("Export task failed or file URL not found: {reason}")]
    ExportFailed { reason: String, diagnostics: String },

    /// Fetching the converted bytes returned a non-success status.
    #[error("Failed to download converted file: {status}")]
    DownloadFailed { status: String },

    /// Any other error reported by the remote API.
    #[error("Conversion service error: {message}")]
    RemoteApi { message: String },

    // ── Orchestrator errors ───────────────────────────────────────────────
    /// No queued job has this id.
    #[error("No conversion job with id '{id}'")]
    JobNotFound { id: String },

    /// The job exists but has no converted result to save.
    #[error("Conversion job '{id}' has no result to download")]
    NoResult { id: String },

    /// Writing a converted file to its destination failed.
    #[error("Failed to save '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a source file from disk failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingFile
            | Error::FileTooLarge { .. }
            | Error::UnsupportedFormat { .. }
            | Error::IdenticalFormats { .. }
            | Error::BadRequest(_) => ErrorKind::Validation,
            Error::JobCreationFailed { .. }
            | Error::UploadFailed { .. }
            | Error::ExportFailed { .. }
            | Error::DownloadFailed { .. }
            | Error::RemoteApi { .. } => ErrorKind::Remote,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::JobNotFound { .. } | Error::NoResult { .. } => ErrorKind::Client,
            Error::SaveFailed { .. }
            | Error::ReadFailed { .. }
            | Error::InvalidConfig(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status the gateway answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::JobNotFound { .. } | Error::NoResult { .. } => StatusCode::NOT_FOUND,
            _ if self.kind() == ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A non-fatal error for a single queued file.
///
/// Stored on the job (as its message) when the gateway exchange fails. The
/// rest of the queue continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The gateway answered with an error status.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never got a usable answer (connection refused, reset, …).
    #[error("Request to conversion server failed: {detail}")]
    Transport { detail: String },

    /// The gateway did not answer in time.
    #[error("Request to conversion server timed out after {secs}s")]
    Timeout { secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_display() {
        let e = Error::FileTooLarge {
            limit_mb: "10".into(),
        };
        assert_eq!(e.to_string(), "File too large. Maximum size is 10MB");
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn unsupported_format_lists_extensions() {
        let e = Error::UnsupportedFormat {
            extension: "xlsx".into(),
            supported: crate::format::supported_extensions(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pdf, docx, doc, txt, rtf, odt, html"), "got: {msg}");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        for e in [
            Error::MissingFile,
            Error::IdenticalFormats {
                format: "pdf".into(),
            },
            Error::BadRequest("truncated".into()),
        ] {
            assert_eq!(e.kind(), ErrorKind::Validation);
            assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn timeout_is_distinguishable() {
        let e = Error::Timeout { secs: 300 };
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("300s"));
    }

    #[test]
    fn export_failure_hides_diagnostics_from_message() {
        let e = Error::ExportFailed {
            reason: "task 'export-file' status error".into(),
            diagnostics: "{\"id\":\"job-1\"}".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Remote);
        assert!(!e.to_string().contains("job-1"));
    }

    #[test]
    fn download_failure_includes_status_text() {
        let e = Error::DownloadFailed {
            status: "Not Found".into(),
        };
        assert!(e.to_string().ends_with("Not Found"));
    }

    #[test]
    fn job_error_rejected_shows_server_message() {
        let e = JobError::Rejected {
            status: 400,
            message: "Input and output formats cannot be the same (pdf)".into(),
        };
        assert_eq!(
            e.to_string(),
            "Input and output formats cannot be the same (pdf)"
        );
    }
}
