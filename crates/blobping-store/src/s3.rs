//! S3-compatible HTTP object store
//!
//! Speaks the subset of the S3 REST API the discovery core needs:
//! ListObjects (v1, marker based), GetObject, PutObject and DeleteObjects.
//! Requests are signed with AWS Signature V4, which AWS S3, Aliyun OSS and
//! MinIO all accept.

use crate::store::{
    DeleteFailure, ListRequest, ObjectListing, ObjectStore, PutOptions, StoredObject,
};
use crate::xml::{DeleteObjectsRequest, DeleteObjectsResult, ErrorResponse, ListBucketResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use blobping_auth::{Credentials, SigV4Signer, SigningRequest, hex_sha256, uri_encode};
use blobping_common::{BucketName, Error, Result, StoreConfig};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, Response, Url};
use tracing::{debug, trace};

/// S3-compatible object store client bound to one bucket
pub struct S3ObjectStore {
    http_client: reqwest::Client,
    signer: SigV4Signer,
    scheme: String,
    /// Host (and non-default port) of the configured endpoint
    endpoint_host: String,
    bucket: BucketName,
    path_style: bool,
}

impl S3ObjectStore {
    /// Create a client from validated store configuration
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            Error::configuration(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;
        let host = endpoint.host_str().ok_or_else(|| {
            Error::configuration(format!("endpoint '{}' has no host", config.endpoint))
        })?;
        let endpoint_host = match endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let credentials = Credentials::new(config.access_id.as_str(), config.access_key.as_str())
            .map_err(|e| Error::configuration(e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            signer: SigV4Signer::new(credentials, config.region.as_str()),
            scheme: endpoint.scheme().to_string(),
            endpoint_host,
            bucket: BucketName::new(config.bucket_name.as_str())?,
            path_style: config.path_style,
        })
    }

    /// Host header value for requests against the bucket
    fn host(&self) -> String {
        if self.path_style {
            self.endpoint_host.clone()
        } else {
            format!("{}.{}", self.bucket, self.endpoint_host)
        }
    }

    /// URI-encoded request path for a key (or the bucket root)
    fn path(&self, key: Option<&str>) -> String {
        let key_path = key.map(|k| uri_encode(k, false)).unwrap_or_default();
        if self.path_style {
            format!("/{}/{}", self.bucket, key_path)
        } else {
            format!("/{key_path}")
        }
    }

    /// Sign and send a request, mapping non-2xx responses to errors
    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Result<Response> {
        let host = self.host();
        let path = self.path(key);
        let now = Utc::now();
        let payload_hash = hex_sha256(&body);

        let mut signed_headers = headers;
        signed_headers.push(("host".to_string(), host.clone()));
        signed_headers.push(("x-amz-date".to_string(), SigV4Signer::amz_date(now)));
        signed_headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));

        let authorization = self
            .signer
            .sign(
                &SigningRequest {
                    method: method.as_str(),
                    path: &path,
                    query,
                    headers: &signed_headers,
                    payload_hash: &payload_hash,
                },
                now,
            )
            .map_err(|e| Error::Signing(e.to_string()))?;

        let url = format!("{}://{}{}{}", self.scheme, host, path, encode_query(query));
        trace!("{} {}", method, url);

        let mut request = self
            .http_client
            .request(method, &url)
            .header("authorization", authorization);
        for (name, value) in &signed_headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.body(body).send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = error_body(response.text().await);
        let error = ErrorResponse::parse_lossy(&body);
        debug!(
            status = status.as_u16(),
            code = %error.code,
            "Object store request failed: {}",
            error.message
        );
        Err(Error::from_backend(
            status.as_u16(),
            error.code,
            error.message,
            self.bucket.as_str(),
            key,
        ))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        self.bucket.as_str()
    }

    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ObjectListing> {
        let mut query = vec![
            ("max-keys".to_string(), request.max_keys.to_string()),
            ("prefix".to_string(), request.prefix.to_string()),
        ];
        if let Some(delimiter) = request.delimiter {
            query.push(("delimiter".to_string(), delimiter.to_string()));
        }
        if let Some(marker) = request.marker {
            query.push(("marker".to_string(), marker.to_string()));
        }

        let response = self
            .send(Method::GET, None, &query, Vec::new(), Bytes::new())
            .await?;
        let body = response.text().await.map_err(transport_error)?;

        ListBucketResult::parse(&body)?.into_listing()
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        let response = self
            .send(Method::GET, Some(key), &[], Vec::new(), Bytes::new())
            .await?;

        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(StoredObject {
            key: key.to_string(),
            body,
            last_modified,
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<()> {
        let headers = vec![
            ("content-type".to_string(), options.content_type.clone()),
            ("x-amz-storage-class".to_string(), options.storage_class.clone()),
        ];
        self.send(Method::PUT, Some(key), &[], headers, body).await?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String], quiet: bool) -> Result<Vec<DeleteFailure>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let xml = DeleteObjectsRequest::new(keys, quiet).to_xml()?;
        let body = Bytes::from(xml);
        let headers = vec![
            ("content-type".to_string(), "application/xml".to_string()),
            (
                "content-md5".to_string(),
                BASE64.encode(md5::compute(&body).0),
            ),
        ];
        let query = [("delete".to_string(), String::new())];

        let response = self
            .send(Method::POST, None, &query, headers, body)
            .await?;
        let text = response.text().await.map_err(transport_error)?;

        Ok(DeleteObjectsResult::parse(&text)?.into_failures())
    }
}

/// Render query parameters with the same encoding used for signing
fn encode_query(query: &[(String, String)]) -> String {
    if query.is_empty() {
        return String::new();
    }
    let params: Vec<String> = query
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                uri_encode(k, true)
            } else {
                format!("{}={}", uri_encode(k, true), uri_encode(v, true))
            }
        })
        .collect();
    format!("?{}", params.join("&"))
}

/// Body of a failed response, empty if it could not be read
fn error_body<E: std::fmt::Display>(body: std::result::Result<String, E>) -> String {
    body.unwrap_or_else(|e| {
        debug!("Could not read error response body: {}", e);
        String::new()
    })
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else if e.is_connect() {
        Error::ConnectionFailed(e.to_string())
    } else {
        Error::storage(e.to_string())
    }
}
