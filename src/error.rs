//! Error types for archive ingestion
//!
//! Errors are classified by blast radius:
//! - Archive-fatal: this archive is aborted, other archives in the batch continue
//! - Config-fatal: the whole run is aborted before any writes
//! - Storage-fatal: the current batch rolled back; the archive is safe to retry via resume
//!
//! Record-level problems (undecodable headers, truncated messages) are never
//! errors — the record is skipped and counted in the run summary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    // Archive-fatal errors
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Unrecognized archive format: {0}")]
    UnrecognizedFormat(PathBuf),

    #[error("readpst not found on PATH. Install libpst, or provide an eml/mbox/zip export instead")]
    PstToolMissing,

    #[error("readpst failed on {path}: {detail}")]
    PstToolFailed { path: PathBuf, detail: String },

    #[error("Failed to read archive {path}: {detail}")]
    ArchiveRead { path: PathBuf, detail: String },

    // Config-fatal
    #[error("Config error: {0}")]
    Config(String),

    // Storage-fatal
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IngestError {
    /// Machine-readable reason code reported alongside the failure.
    pub fn reason_code(&self) -> &'static str {
        match self {
            IngestError::ArchiveNotFound(_) => "archive-not-found",
            IngestError::UnrecognizedFormat(_) => "archive-unrecognized",
            IngestError::PstToolMissing => "pst-tool-missing",
            IngestError::PstToolFailed { .. } => "pst-tool-failed",
            IngestError::ArchiveRead { .. } => "archive-read",
            IngestError::Config(_) => "config-invalid",
            IngestError::Storage(_) => "storage-commit",
        }
    }

    /// Returns true if this error aborts only the archive it occurred in.
    pub fn is_archive_fatal(&self) -> bool {
        !matches!(self, IngestError::Config(_))
    }

    /// Returns true if re-invoking ingestion on the same archive is expected
    /// to make progress (checkpoint + dedup make the retry safe).
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(
            IngestError::ArchiveNotFound(PathBuf::from("/tmp/x.pst")).reason_code(),
            "archive-not-found"
        );
        assert_eq!(IngestError::PstToolMissing.reason_code(), "pst-tool-missing");
        assert_eq!(
            IngestError::Config("bad yaml".to_string()).reason_code(),
            "config-invalid"
        );
        assert_eq!(
            IngestError::Storage("disk full".to_string()).reason_code(),
            "storage-commit"
        );
    }

    #[test]
    fn test_config_errors_abort_the_run() {
        assert!(!IngestError::Config("missing".to_string()).is_archive_fatal());
        assert!(IngestError::PstToolMissing.is_archive_fatal());
    }

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(IngestError::Storage("locked".to_string()).is_retryable());
        assert!(!IngestError::UnrecognizedFormat(PathBuf::from("a")).is_retryable());
    }
}
