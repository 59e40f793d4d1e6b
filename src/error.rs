//! Error types for MDS payload encoding, decoding and reconciliation.
//!
//! The I/O layer ([`crate::files`], [`crate::fetch`]) works in
//! `anyhow::Result`; everything below it returns [`MdsError`] so callers can
//! match on version problems specifically.

use std::io;
use thiserror::Error;

use crate::versions::Version;

/// Result type alias for the core modules.
pub type Result<T> = std::result::Result<T, MdsError>;

#[derive(Debug, Error)]
pub enum MdsError {
    /// Input could not be decomposed into three non-negative integers.
    #[error("Malformed version: {0:?}")]
    MalformedVersion(String),

    /// Version is older than the oldest supported format revision.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(Version),

    /// A page declared a different version than the rest of the batch.
    #[error("Unexpected version: expected {expected}, got {actual}")]
    UnexpectedVersion {
        /// First mismatching version, in input order
        actual: Version,
        /// Version of the first page in the batch
        expected: Version,
    },

    /// No encoding rule and no generic fallback for the value.
    #[error("Cannot serialize value of type {0}")]
    Serialization(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid date format pattern: {0:?}")]
    InvalidDateFormat(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown record type: {0:?}")]
    UnknownRecordType(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_version_display() {
        let err = MdsError::UnexpectedVersion {
            actual: Version::new(0, 3, 1),
            expected: Version::new(0, 4, 0),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected version: expected 0.4.0, got 0.3.1"
        );
    }

    #[test]
    fn test_malformed_version_display() {
        let err = MdsError::MalformedVersion("0.x".to_string());
        assert!(err.to_string().contains("\"0.x\""));
    }

    #[test]
    fn test_io_error_converts() {
        let err: MdsError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
