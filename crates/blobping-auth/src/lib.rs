//! BlobPing Authentication
//!
//! This crate provides AWS Signature V4 signing for requests sent to
//! S3-compatible object stores.

pub mod error;
pub mod sigv4;

pub use error::AuthError;
pub use sigv4::{Credentials, EMPTY_PAYLOAD_HASH, SigV4Signer, SigningRequest, hex_sha256, uri_encode};
