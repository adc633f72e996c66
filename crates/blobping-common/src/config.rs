//! Configuration types for BlobPing
//!
//! Configuration is read once at initialization from an optional TOML file
//! overlaid with `BLOBPING__*` environment variables, and is immutable
//! thereafter.

use crate::error::{Error, Result};
use crate::types::BucketName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "BLOBPING";

/// Largest page the S3 listing API will return
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Root configuration for BlobPing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Object storage connection
    pub store: StoreConfig,
    /// Discovery protocol tuning
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let built = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::configuration(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| Error::configuration(e.to_string()))
    }

    /// Parse configuration from a TOML document, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::configuration(e.to_string()))
    }

    /// Check that everything required to reach the object store is present
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.discovery.validate()
    }
}

/// Object storage connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Endpoint URL, e.g. `https://oss-cn-hangzhou.aliyuncs.com`
    pub endpoint: String,
    /// Access key id
    pub access_id: String,
    /// Secret access key
    pub access_key: String,
    /// Bucket holding the cluster directories (must already exist)
    pub bucket_name: String,
    /// Prefix for all keys, e.g. `jgroups/`
    pub bucket_prefix: String,
    /// Signing region
    pub region: String,
    /// Use `{endpoint}/{bucket}/{key}` instead of virtual-host addressing
    pub path_style: bool,
    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Entries requested per listing page
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_id: String::new(),
            access_key: String::new(),
            bucket_name: String::new(),
            bucket_prefix: String::new(),
            region: "us-east-1".to_string(),
            path_style: false,
            request_timeout_ms: 10_000,
            page_size: 200,
        }
    }
}

impl StoreConfig {
    /// Validate the connection settings
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::configuration("store.endpoint is required"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(Error::configuration(format!(
                "store.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.access_id.trim().is_empty() {
            return Err(Error::configuration("store.access_id is required"));
        }
        if self.access_key.trim().is_empty() {
            return Err(Error::configuration("store.access_key is required"));
        }
        if self.bucket_name.trim().is_empty() {
            return Err(Error::configuration("store.bucket_name is required"));
        }
        BucketName::new(self.bucket_name.as_str())?;
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::configuration(format!(
                "store.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    /// Bucket prefix normalized for key construction
    #[must_use]
    pub fn normalized_prefix(&self) -> String {
        normalize_prefix(&self.bucket_prefix)
    }

    /// Request timeout as a duration
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("bucket_prefix", &self.bucket_prefix)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Wire format used for membership blobs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// One record per line, `text/plain`
    #[default]
    Text,
    /// JSON array of records
    Json,
}

/// Discovery protocol settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Stale-entry reaper cadence; also the staleness threshold (seconds)
    pub reaper_interval_secs: u64,
    /// How often the driver re-publishes the local record list (seconds)
    pub heartbeat_interval_secs: u64,
    /// Blob wire format
    pub codec: CodecKind,
    /// Storage class requested on put
    pub storage_class: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            reaper_interval_secs: 60,
            heartbeat_interval_secs: 30,
            codec: CodecKind::Text,
            storage_class: "STANDARD".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Validate the protocol settings
    pub fn validate(&self) -> Result<()> {
        if self.reaper_interval_secs == 0 {
            return Err(Error::configuration(
                "discovery.reaper_interval_secs must be positive",
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(Error::configuration(
                "discovery.heartbeat_interval_secs must be positive",
            ));
        }
        Ok(())
    }

    /// Reaper interval as a duration
    #[must_use]
    pub const fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// Heartbeat interval as a duration
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Normalize a configured key prefix
///
/// An empty or root prefix becomes `""`; anything else ends with exactly one
/// `/`.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
