//! In-memory object store
//!
//! Mirrors the S3 v1 listing contract (ordered keys, bounded pages, marker
//! continuation, `NextMarker` only when a delimiter is given) so code paging
//! through it behaves exactly as against a real bucket. Also supports
//! backdating objects and injecting failures for tests.

use crate::store::{
    DeleteFailure, ListRequest, ObjectListing, ObjectStore, ObjectSummary, PutOptions,
    StoredObject,
};
use async_trait::async_trait;
use blobping_common::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hard cap on a single listing page, as in S3
const MAX_LIST_KEYS: u32 = 1000;

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Bytes,
    last_modified: DateTime<Utc>,
    options: PutOptions,
}

/// Failures to inject into subsequent calls
#[derive(Debug, Default)]
struct FailurePlan {
    /// Fail the listing request with this zero-based page index
    list_page: Option<u64>,
    /// Keys whose get fails
    gets: HashSet<String>,
    /// Keys whose delete is reported as failed
    deletes: HashSet<String>,
    /// Fail every put
    puts: bool,
}

/// In-memory bucket
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    failures: RwLock<FailurePlan>,
    list_calls: AtomicU64,
    get_calls: AtomicU64,
}

impl MemoryObjectStore {
    /// Create an empty bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(FailurePlan::default()),
            list_calls: AtomicU64::new(0),
            get_calls: AtomicU64::new(0),
        }
    }

    /// Store raw content under a key, bypassing the put path
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.write().insert(
            key.into(),
            MemoryObject {
                body: body.into(),
                last_modified: Utc::now(),
                options: PutOptions::default(),
            },
        );
    }

    /// Override the last-modified time of an existing object
    pub fn set_last_modified(&self, key: &str, at: DateTime<Utc>) -> bool {
        match self.objects.write().get_mut(key) {
            Some(object) => {
                object.last_modified = at;
                true
            }
            None => false,
        }
    }

    /// Content of an object, if present
    pub fn content(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.body.clone())
    }

    /// Put options recorded for an object, if present
    pub fn options(&self, key: &str) -> Option<PutOptions> {
        self.objects.read().get(key).map(|o| o.options.clone())
    }

    /// All keys in order
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Whether a key exists
    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    /// Number of listing requests served
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of get requests served
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Fail the listing request with the given zero-based index (counted from now)
    pub fn fail_list_page(&self, page: u64) {
        self.failures.write().list_page = Some(self.list_calls() + page);
    }

    /// Fail every get of `key`
    pub fn fail_get(&self, key: impl Into<String>) {
        self.failures.write().gets.insert(key.into());
    }

    /// Report every delete of `key` as failed
    pub fn fail_delete(&self, key: impl Into<String>) {
        self.failures.write().deletes.insert(key.into());
    }

    /// Fail every put
    pub fn fail_puts(&self, fail: bool) {
        self.failures.write().puts = fail;
    }

    /// Clear all injected failures
    pub fn clear_failures(&self) {
        *self.failures.write() = FailurePlan::default();
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ObjectListing> {
        let call = self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.failures.read().list_page == Some(call) {
            return Err(Error::ServiceUnavailable(format!(
                "injected listing failure on call {call}"
            )));
        }

        let max_keys = request.max_keys.clamp(1, MAX_LIST_KEYS) as usize;
        let objects = self.objects.read();

        let mut listing = ObjectListing::default();
        let mut emitted = 0usize;
        let mut last_emitted: Option<String> = None;

        let candidates = objects
            .iter()
            .filter(|(key, _)| key.starts_with(request.prefix))
            .filter(|(key, _)| request.marker.is_none_or(|m| key.as_str() > m));

        for (key, object) in candidates {
            let rolled_up = request.delimiter.and_then(|delimiter| {
                key[request.prefix.len()..]
                    .find(delimiter)
                    .map(|idx| key[..request.prefix.len() + idx + delimiter.len()].to_string())
            });

            if let Some(common) = &rolled_up {
                if listing.common_prefixes.last() == Some(common) {
                    continue;
                }
                // A marker inside an already-returned common prefix skips it
                if request.marker.is_some_and(|m| m.starts_with(common.as_str())) {
                    continue;
                }
            }

            if emitted == max_keys {
                listing.is_truncated = true;
                break;
            }

            match rolled_up {
                Some(common) => {
                    last_emitted = Some(common.clone());
                    listing.common_prefixes.push(common);
                }
                None => {
                    last_emitted = Some(key.clone());
                    listing.summaries.push(ObjectSummary {
                        key: key.clone(),
                        size: object.body.len() as u64,
                        last_modified: object.last_modified,
                        etag: Some(format!("\"{:x}\"", md5::compute(&object.body))),
                        storage_class: Some(object.options.storage_class.clone()),
                    });
                }
            }
            emitted += 1;
        }

        if listing.is_truncated && request.delimiter.is_some() {
            listing.next_marker = last_emitted;
        }

        Ok(listing)
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        if self.failures.read().gets.contains(key) {
            return Err(Error::ServiceUnavailable(format!(
                "injected get failure for {key}"
            )));
        }

        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| Error::ObjectNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        })?;

        Ok(StoredObject {
            key: key.to_string(),
            body: object.body.clone(),
            last_modified: Some(object.last_modified),
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<()> {
        if self.failures.read().puts {
            return Err(Error::ServiceUnavailable(format!(
                "injected put failure for {key}"
            )));
        }

        self.objects.write().insert(
            key.to_string(),
            MemoryObject {
                body,
                last_modified: Utc::now(),
                options: options.clone(),
            },
        );
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String], _quiet: bool) -> Result<Vec<DeleteFailure>> {
        let failing = self.failures.read().deletes.clone();
        let mut objects = self.objects.write();
        let mut failures = Vec::new();

        for key in keys {
            if failing.contains(key) {
                failures.push(DeleteFailure {
                    key: key.clone(),
                    code: "AccessDenied".to_string(),
                    message: "injected delete failure".to_string(),
                });
                continue;
            }
            objects.remove(key);
        }

        Ok(failures)
    }
}
