//! Blob key layout
//!
//! `{prefix}{cluster}/{filename(address)}`, where the prefix is the
//! normalized bucket prefix and the filename mapping is injectable.

use blobping_common::config::normalize_prefix;
use blobping_common::{Error, MemberAddress, ObjectKey, Result};
use std::fmt;
use std::sync::Arc;

/// Deterministic mapping from a member address to the last key segment
pub type FilenameFn = Arc<dyn Fn(&MemberAddress) -> String + Send + Sync>;

/// Cluster name without trailing `/`, or `None` if nothing is left
#[must_use]
pub fn cluster_name(cluster: &str) -> Option<&str> {
    let cluster = cluster.trim_end_matches('/');
    (!cluster.is_empty()).then_some(cluster)
}

/// Default filename mapping: the address's string form
#[must_use]
pub fn default_filename(address: &MemberAddress) -> String {
    address.to_string()
}

/// Computes cluster prefixes and member keys
#[derive(Clone)]
pub struct KeyLayout {
    prefix: String,
    filename: FilenameFn,
}

impl KeyLayout {
    /// Create a layout rooted at `bucket_prefix` (normalized)
    #[must_use]
    pub fn new(bucket_prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(bucket_prefix),
            filename: Arc::new(default_filename),
        }
    }

    /// Replace the address to filename mapping
    #[must_use]
    pub fn with_filename_fn(mut self, filename: FilenameFn) -> Self {
        self.filename = filename;
        self
    }

    /// Normalized bucket prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix under which every blob of `cluster` lives
    ///
    /// Always ends with exactly one `/`. An empty cluster name has no
    /// prefix of its own, since the bare bucket prefix spans every cluster.
    #[must_use]
    pub fn cluster_prefix(&self, cluster: &str) -> Option<String> {
        cluster_name(cluster).map(|cluster| format!("{}{}/", self.prefix, cluster))
    }

    /// Filename of a member's blob
    #[must_use]
    pub fn filename(&self, address: &MemberAddress) -> String {
        (self.filename)(address)
    }

    /// Full key of a member's blob
    pub fn member_key(&self, cluster: &str, address: &MemberAddress) -> Result<ObjectKey> {
        let prefix = self
            .cluster_prefix(cluster)
            .ok_or_else(|| Error::invalid_state("cluster name is empty"))?;
        let key = format!("{}{}", prefix, self.filename(address));
        Ok(ObjectKey::new(key)?)
    }
}

impl fmt::Debug for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLayout")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
