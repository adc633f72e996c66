//! S3 XML wire types
//!
//! Request and response bodies exchanged with S3-compatible stores.

use crate::store::{DeleteFailure, ObjectListing, ObjectSummary};
use blobping_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response for ListObjects (v1)
#[derive(Debug, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "Marker", default)]
    pub marker: Option<String>,
    #[serde(rename = "NextMarker", default)]
    pub next_marker: Option<String>,
    #[serde(rename = "MaxKeys", default)]
    pub max_keys: u32,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ObjectContent>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

/// Object entry in a listing
#[derive(Debug, Deserialize)]
pub struct ObjectContent {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

impl ListBucketResult {
    /// Parse a listing response body
    pub fn parse(body: &str) -> Result<Self> {
        quick_xml::de::from_str(body)
            .map_err(|e| Error::Deserialization(format!("invalid ListBucketResult: {e}")))
    }

    /// Convert into the store-neutral listing page
    pub fn into_listing(self) -> Result<ObjectListing> {
        let summaries = self
            .contents
            .into_iter()
            .map(|content| {
                let last_modified = parse_iso8601(&content.last_modified)?;
                Ok(ObjectSummary {
                    key: content.key,
                    size: content.size,
                    last_modified,
                    etag: content.etag,
                    storage_class: content.storage_class,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ObjectListing {
            summaries,
            common_prefixes: self.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            next_marker: self.next_marker.filter(|m| !m.is_empty()),
            is_truncated: self.is_truncated,
        })
    }
}

/// Request body for DeleteObjects
#[derive(Debug, Serialize)]
#[serde(rename = "Delete")]
pub struct DeleteObjectsRequest {
    #[serde(rename = "Quiet")]
    pub quiet: bool,
    #[serde(rename = "Object")]
    pub objects: Vec<DeleteObjectIdentifier>,
}

/// Object identifier in DeleteObjects request
#[derive(Debug, Serialize)]
pub struct DeleteObjectIdentifier {
    #[serde(rename = "Key")]
    pub key: String,
}

impl DeleteObjectsRequest {
    /// Build a request for the given keys
    pub fn new(keys: &[String], quiet: bool) -> Self {
        Self {
            quiet,
            objects: keys
                .iter()
                .map(|key| DeleteObjectIdentifier { key: key.clone() })
                .collect(),
        }
    }

    /// Serialize to an XML document
    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self)
            .map_err(|e| Error::Serialization(format!("invalid Delete request: {e}")))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
    }
}

/// Response for DeleteObjects
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "DeleteResult")]
pub struct DeleteObjectsResult {
    #[serde(rename = "Deleted", default)]
    pub deleted: Vec<DeletedObject>,
    #[serde(rename = "Error", default)]
    pub errors: Vec<DeleteError>,
}

/// Successfully deleted object
#[derive(Debug, Deserialize)]
pub struct DeletedObject {
    #[serde(rename = "Key")]
    pub key: String,
}

/// Error deleting object
#[derive(Debug, Deserialize)]
pub struct DeleteError {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl DeleteObjectsResult {
    /// Parse a DeleteObjects response body; quiet responses may be empty
    pub fn parse(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        quick_xml::de::from_str(body)
            .map_err(|e| Error::Deserialization(format!("invalid DeleteResult: {e}")))
    }

    /// Failures worth reporting; keys that were already gone are not failures
    pub fn into_failures(self) -> Vec<DeleteFailure> {
        self.errors
            .into_iter()
            .filter(|e| e.code != "NoSuchKey")
            .map(|e| DeleteFailure {
                key: e.key,
                code: e.code,
                message: e.message,
            })
            .collect()
    }
}

/// Error document returned with non-2xx responses
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "Error")]
pub struct ErrorResponse {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl ErrorResponse {
    /// Parse an error body, tolerating empty or non-XML bodies
    #[must_use]
    pub fn parse_lossy(body: &str) -> Self {
        let raw = || Self {
            code: String::new(),
            message: body.trim().chars().take(256).collect(),
        };
        if !body.trim_start().starts_with('<') {
            return raw();
        }
        quick_xml::de::from_str(body).unwrap_or_else(|_| raw())
    }
}

fn parse_iso8601(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Deserialization(format!("invalid LastModified '{value}': {e}")))
}
