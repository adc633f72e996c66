//! Object storage boundary
//!
//! The discovery core only needs four primitives from a blob store:
//! paginated listing, whole-object get, overwrite put and batched delete.

use async_trait::async_trait;
use blobping_common::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One entry of an object listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modification time reported by the store
    pub last_modified: DateTime<Utc>,
    /// Entity tag, if reported
    pub etag: Option<String>,
    /// Storage class, if reported
    pub storage_class: Option<String>,
}

impl ObjectSummary {
    /// Create a summary with no optional metadata
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            etag: None,
            storage_class: None,
        }
    }

    /// True if the object carries no content
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Parameters of a single listing request
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    /// Only keys starting with this prefix are returned
    pub prefix: &'a str,
    /// Roll keys containing this delimiter after the prefix into common prefixes
    pub delimiter: Option<&'a str>,
    /// Return keys strictly after this one
    pub marker: Option<&'a str>,
    /// Maximum entries in the page
    pub max_keys: u32,
}

/// One page of an object listing
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    /// Objects in this page, in key order
    pub summaries: Vec<ObjectSummary>,
    /// Common prefixes (only when a delimiter was given)
    pub common_prefixes: Vec<String>,
    /// Marker to continue from, when the store reports one
    pub next_marker: Option<String>,
    /// Whether more entries remain after this page
    pub is_truncated: bool,
}

/// A fetched object
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object key
    pub key: String,
    /// Object content
    pub body: Bytes,
    /// Last modification time, when the store reports it
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// Content length in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Metadata sent with a put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// `Content-Type` of the object
    pub content_type: String,
    /// Requested storage class
    pub storage_class: String,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            storage_class: "STANDARD".to_string(),
        }
    }
}

/// A key the store refused to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    /// Object key
    pub key: String,
    /// Store error code
    pub code: String,
    /// Store error message
    pub message: String,
}

/// Blob store primitives consumed by the discovery core
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store operates on
    fn bucket(&self) -> &str;

    /// List one page of objects
    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ObjectListing>;

    /// Fetch an object in full
    async fn get_object(&self, key: &str) -> Result<StoredObject>;

    /// Create or fully overwrite an object
    async fn put_object(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<()>;

    /// Delete a batch of keys
    ///
    /// Missing keys are not failures. The returned list names the keys the
    /// store reported errors for.
    async fn delete_objects(&self, keys: &[String], quiet: bool) -> Result<Vec<DeleteFailure>>;
}
