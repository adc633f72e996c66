//! Authentication error types

use thiserror::Error;

/// Request signing errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("missing required signed header: {0}")]
    MissingSignedHeader(String),

    #[error("header {0} has a value that cannot be signed")]
    InvalidHeaderValue(String),
}
