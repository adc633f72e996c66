//! Error types for BlobPing
//!
//! This module defines the common error types used throughout the system.

use crate::types::{BucketNameError, ObjectKeyError};
use thiserror::Error;

/// Common result type for BlobPing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for BlobPing
#[derive(Debug, Error)]
pub enum Error {
    // Object storage errors
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("object store returned {status} {code}: {message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    // Network errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Codec errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),

    // Protocol errors
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Classify an error response returned by the object store
    #[must_use]
    pub fn from_backend(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        bucket: &str,
        key: Option<&str>,
    ) -> Self {
        let code = code.into();
        let message = message.into();
        match (status, code.as_str()) {
            (404, "NoSuchBucket") => Self::BucketNotFound(bucket.to_string()),
            (404, _) => Self::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.unwrap_or_default().to_string(),
            },
            (403, _) => Self::AccessDenied(if message.is_empty() { code } else { message }),
            (503, _) => Self::ServiceUnavailable(message),
            _ => Self::Backend {
                status,
                code,
                message,
            },
        }
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::ServiceUnavailable(_) | Self::ConnectionFailed(_) => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. }
        )
    }

    /// Check if this error should abort the component rather than be logged
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidBucketName(_) | Self::InvalidObjectKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::ServiceUnavailable("test".into()).is_retryable());
        assert!(
            Error::Backend {
                status: 500,
                code: "InternalError".into(),
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(!Error::AccessDenied("nope".into()).is_retryable());
        assert!(!Error::Deserialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::BucketNotFound("test".into()).is_not_found());
        assert!(
            Error::ObjectNotFound {
                bucket: "b".into(),
                key: "k".into()
            }
            .is_not_found()
        );
        assert!(!Error::Timeout.is_not_found());
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::configuration("missing endpoint").is_fatal());
        assert!(Error::InvalidBucketName(BucketNameError::TooShort).is_fatal());
        assert!(!Error::Timeout.is_fatal());
        assert!(!Error::invalid_state("no local address").is_fatal());
    }

    #[test]
    fn test_from_backend() {
        let err = Error::from_backend(404, "NoSuchKey", "", "bucket", Some("jg/demo/A"));
        assert!(matches!(err, Error::ObjectNotFound { ref key, .. } if key == "jg/demo/A"));

        let err = Error::from_backend(404, "NoSuchBucket", "", "bucket", None);
        assert!(matches!(err, Error::BucketNotFound(ref b) if b == "bucket"));

        let err = Error::from_backend(403, "SignatureDoesNotMatch", "", "bucket", None);
        assert!(matches!(err, Error::AccessDenied(ref m) if m == "SignatureDoesNotMatch"));

        let err = Error::from_backend(409, "Conflict", "busy", "bucket", None);
        assert!(matches!(err, Error::Backend { status: 409, .. }));
    }
}
