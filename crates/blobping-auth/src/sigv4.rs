//! AWS Signature V4 signing
//!
//! Implements AWS Signature Version 4 for authenticating requests to
//! S3-compatible object stores.
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-authenticating-requests.html

use crate::error::AuthError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of the empty payload
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Access key pair used to sign requests
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create credentials, rejecting empty values
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();
        if access_key_id.is_empty() {
            return Err(AuthError::MissingCredential("access key id"));
        }
        if secret_access_key.is_empty() {
            return Err(AuthError::MissingCredential("secret access key"));
        }
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }

    /// Public half of the key pair
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// The parts of an HTTP request covered by the signature
#[derive(Debug)]
pub struct SigningRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Request path, already URI-encoded
    pub path: &'a str,
    /// Decoded query parameters
    pub query: &'a [(String, String)],
    /// Headers to sign; must include `host` and `x-amz-date`
    pub headers: &'a [(String, String)],
    /// Hex SHA-256 of the body
    pub payload_hash: &'a str,
}

/// AWS Signature V4 signer
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: Credentials,
    /// Service name (usually "s3")
    service: String,
    /// Region (e.g., "us-east-1")
    region: String,
}

impl SigV4Signer {
    /// Create a new signer for the S3 service
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            service: "s3".to_string(),
            region: region.into(),
        }
    }

    /// Format a timestamp as an `x-amz-date` header value
    #[must_use]
    pub fn amz_date(at: DateTime<Utc>) -> String {
        at.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// Compute the `Authorization` header value for a request
    pub fn sign(&self, request: &SigningRequest<'_>, at: DateTime<Utc>) -> Result<String, AuthError> {
        let date_str = Self::amz_date(at);
        let date_stamp = at.format("%Y%m%d").to_string();

        let (canonical_request, signed_headers) = self.build_canonical_request(request)?;

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign =
            self.build_string_to_sign(&canonical_request, &date_str, &credential_scope);

        let signing_key = self.derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            &self.service,
        );
        let signature = self.calculate_signature(&signing_key, &string_to_sign);

        tracing::trace!(
            "SigV4 canonical request:\n{}\nString to sign:\n{}",
            canonical_request,
            string_to_sign
        );

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credentials.access_key_id, credential_scope, signed_headers, signature
        ))
    }

    /// Build the canonical request string and the signed header list
    fn build_canonical_request(
        &self,
        request: &SigningRequest<'_>,
    ) -> Result<(String, String), AuthError> {
        // Canonical headers (lowercase, sorted, trimmed values)
        let mut headers_map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in request.headers {
            if value.contains('\n') || value.contains('\r') {
                return Err(AuthError::InvalidHeaderValue(name.clone()));
            }
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            headers_map.insert(name.to_lowercase(), value);
        }
        for required in ["host", "x-amz-date"] {
            if !headers_map.contains_key(required) {
                return Err(AuthError::MissingSignedHeader(required.to_string()));
            }
        }

        let canonical_headers: String = headers_map
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers = headers_map.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_uri = if request.path.is_empty() {
            "/"
        } else {
            request.path
        };
        let canonical_query = self.build_canonical_query_string(request.query);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            canonical_uri,
            canonical_query,
            canonical_headers,
            signed_headers,
            request.payload_hash
        );

        Ok((canonical_request, signed_headers))
    }

    /// Build canonical query string (sorted, AWS-encoded parameters)
    fn build_canonical_query_string(&self, query: &[(String, String)]) -> String {
        let mut params: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
            .collect();
        params.sort();

        params
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Build the string to sign
    fn build_string_to_sign(
        &self,
        canonical_request: &str,
        date_str: &str,
        credential_scope: &str,
    ) -> String {
        let canonical_request_hash = hex_sha256(canonical_request.as_bytes());

        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, date_str, credential_scope, canonical_request_hash
        )
    }

    /// Derive the signing key
    fn derive_signing_key(
        &self,
        secret_key: &str,
        date_stamp: &str,
        region: &str,
        service: &str,
    ) -> Vec<u8> {
        let k_secret = format!("AWS4{}", secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Calculate the signature
    fn calculate_signature(&self, signing_key: &[u8], string_to_sign: &str) -> String {
        hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
    }
}

/// Calculate HMAC-SHA256
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Calculate SHA256 and return hex string
#[must_use]
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// URI-encode a string the way AWS canonicalization expects
///
/// Unreserved characters pass through; `/` passes through only when
/// `encode_slash` is false (object key paths).
#[must_use]
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
