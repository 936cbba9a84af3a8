// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy for the object-storage driver.
//!
//! Local contract violations (missing source key, bad arguments, bad bucket name)
//! are raised before any request is sent. Everything the remote store reports is
//! carried as a [`RemoteError`], which keeps the HTTP status, error code and message
//! so callers (and the adapter itself) can classify it.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used as the source of a [`RemoteError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Error codes the store uses for a rejected or mismatched payload checksum.
const CHECKSUM_ERROR_CODES: &[&str] = &["BadDigest", "InvalidChecksum", "XAmzContentChecksumMismatch"];

/// Failure reported by (or while talking to) the remote object store.
#[derive(Debug, Error)]
#[error(
    "{operation} failed (status {}, code {}): {}",
    .status.map_or_else(|| "n/a".to_string(), |s| s.to_string()),
    .code.as_deref().unwrap_or("n/a"),
    .message.as_deref().unwrap_or("no message")
)]
pub struct RemoteError {
    /// Remote operation that failed, e.g. `PutObject`.
    pub operation: &'static str,
    /// HTTP status of the error response, when one was received.
    pub status: Option<u16>,
    /// Store error code, e.g. `NoSuchKey`.
    pub code: Option<String>,
    /// Human readable message from the store.
    pub message: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl RemoteError {
    pub fn new(
        operation: &'static str,
        status: Option<u16>,
        code: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        Self {
            operation,
            status,
            code: code.map(str::to_owned),
            message: message.map(str::to_owned),
            source: None,
        }
    }

    /// Error that never produced an HTTP response (connection reset, DNS, body read).
    pub fn transport(operation: &'static str, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            operation,
            status: None,
            code: None,
            message: Some(source.to_string()),
            source: Some(source),
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// True for the "object is absent" class of errors.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
            || matches!(self.code.as_deref(), Some("NoSuchKey" | "NotFound"))
    }

    /// True when the store rejected the declared checksum as malformed or mismatched.
    pub fn is_checksum_failure(&self) -> bool {
        if self.status != Some(400) {
            return false;
        }
        if let Some(code) = self.code.as_deref() {
            if CHECKSUM_ERROR_CODES.contains(&code) {
                return true;
            }
        }
        self.message
            .as_deref()
            .is_some_and(|m| m.contains("x-amz-checksum-"))
    }
}

/// Errors returned by the storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The source key of a copy, move or download does not exist.
    #[error("key does not exist: {key}")]
    KeyNotExists { key: String },

    /// The store rejected the checksum declared for an upload.
    #[error("invalid checksum for key {key}")]
    InvalidChecksum {
        key: String,
        #[source]
        source: RemoteError,
    },

    /// A response lacked a field the protocol requires.
    #[error("{operation} response is missing the {field}")]
    InvalidResponse {
        operation: &'static str,
        field: &'static str,
    },

    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    #[error("invalid byte range {start}-{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("part number {0} is outside 1..=10000")]
    InvalidPartNumber(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// An earlier part upload of this multipart session failed; it can only be cancelled.
    #[error("multipart upload {upload_id} for {key} lost a part and can only be cancelled")]
    SessionFailed { key: String, upload_id: String },

    /// The driver factory was shut down and no longer owns a client.
    #[error("driver has been shut down")]
    Shutdown,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl StorageError {
    /// Classify a remote failure of an upload-type request for `key`.
    pub(crate) fn from_upload(key: &str, err: RemoteError) -> Self {
        if err.is_checksum_failure() {
            StorageError::InvalidChecksum {
                key: key.to_owned(),
                source: err,
            }
        } else {
            StorageError::Remote(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_by_status_or_code() {
        assert!(RemoteError::new("HeadObject", Some(404), None, None).is_not_found());
        assert!(RemoteError::new("GetObject", None, Some("NoSuchKey"), None).is_not_found());
        assert!(!RemoteError::new("GetObject", Some(503), Some("SlowDown"), None).is_not_found());
        assert!(!RemoteError::transport("GetObject", "connection reset").is_not_found());
    }

    #[test]
    fn checksum_failures_need_a_bad_request() {
        let header = RemoteError::new(
            "PutObject",
            Some(400),
            Some("InvalidRequest"),
            Some("Value for x-amz-checksum-crc32 header is invalid."),
        );
        assert!(header.is_checksum_failure());

        let digest = RemoteError::new("PutObject", Some(400), Some("BadDigest"), None);
        assert!(digest.is_checksum_failure());

        let server = RemoteError::new("PutObject", Some(500), Some("BadDigest"), None);
        assert!(!server.is_checksum_failure());

        let other = RemoteError::new("PutObject", Some(400), Some("InvalidArgument"), Some("nope"));
        assert!(!other.is_checksum_failure());
    }

    #[test]
    fn upload_errors_are_classified() {
        let err = RemoteError::new("PutObject", Some(400), Some("BadDigest"), None);
        assert!(matches!(
            StorageError::from_upload("a.txt", err),
            StorageError::InvalidChecksum { ref key, .. } if key == "a.txt"
        ));

        let err = RemoteError::new("PutObject", Some(403), Some("AccessDenied"), None);
        assert!(matches!(StorageError::from_upload("a.txt", err), StorageError::Remote(_)));
    }

    #[test]
    fn display_includes_status_and_code() {
        let err = RemoteError::new("DeleteObject", Some(403), Some("AccessDenied"), Some("denied"));
        assert_eq!(
            err.to_string(),
            "DeleteObject failed (status 403, code AccessDenied): denied"
        );
    }
}
