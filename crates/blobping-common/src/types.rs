//! Core type definitions for BlobPing
//!
//! This module defines the membership data model published to the object
//! store and the validated names used to address it.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Logical address of a cluster member
///
/// Opaque to the discovery core: it is only compared, hashed and rendered
/// into blob keys.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into)]
#[display("{_0}")]
#[serde(transparent)]
pub struct MemberAddress(String);

impl MemberAddress {
    /// Create a member address from its string form
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get the address as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberAddress {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Debug for MemberAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberAddress({:?})", self.0)
    }
}

/// One entry describing a reachable member, as known by the publisher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Logical address of the member
    pub address: MemberAddress,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_name: Option<String>,
    /// Transport endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_addr: Option<SocketAddr>,
    /// Whether the member was acting as coordinator when published
    #[serde(default)]
    pub coordinator: bool,
}

impl MembershipRecord {
    /// Create a record carrying only an address
    #[must_use]
    pub fn new(address: impl Into<MemberAddress>) -> Self {
        Self {
            address: address.into(),
            logical_name: None,
            physical_addr: None,
            coordinator: false,
        }
    }

    /// Set the logical name
    #[must_use]
    pub fn with_logical_name(mut self, name: impl Into<String>) -> Self {
        self.logical_name = Some(name.into());
        self
    }

    /// Set the physical address
    #[must_use]
    pub const fn with_physical_addr(mut self, addr: SocketAddr) -> Self {
        self.physical_addr = Some(addr);
        self
    }

    /// Set the coordinator flag
    #[must_use]
    pub const fn with_coordinator(mut self, coordinator: bool) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// True if this record attests `addr` as coordinator
    #[must_use]
    pub fn attests_coordinator(&self, addr: &MemberAddress) -> bool {
        self.coordinator && &self.address == addr
    }
}

impl fmt::Display for MembershipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(name) = &self.logical_name {
            write!(f, " ({name})")?;
        }
        if let Some(addr) = &self.physical_addr {
            write!(f, " @ {addr}")?;
        }
        if self.coordinator {
            write!(f, " [coord]")?;
        }
        Ok(())
    }
}

/// Name of the bucket holding the cluster directory
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name (validates S3 naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the bucket name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate bucket name according to S3 rules
    fn validate(name: &str) -> Result<(), BucketNameError> {
        if name.len() < 3 {
            return Err(BucketNameError::TooShort);
        }
        if name.len() > 63 {
            return Err(BucketNameError::TooLong);
        }

        let bytes = name.as_bytes();
        let is_edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        if !is_edge(bytes[0]) {
            return Err(BucketNameError::InvalidStartChar);
        }
        if !is_edge(bytes[bytes.len() - 1]) {
            return Err(BucketNameError::InvalidEndChar);
        }

        for c in name.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '.' {
                return Err(BucketNameError::InvalidChar(c));
            }
        }

        if name.contains("..") {
            return Err(BucketNameError::ConsecutivePeriods);
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(BucketNameError::LooksLikeIpAddress);
        }

        Ok(())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.0)
    }
}

/// Errors that can occur when creating a bucket name
#[derive(Debug, Clone, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name must be at least 3 characters")]
    TooShort,
    #[error("bucket name must be at most 63 characters")]
    TooLong,
    #[error("bucket name must start with a lowercase letter or number")]
    InvalidStartChar,
    #[error("bucket name must end with a lowercase letter or number")]
    InvalidEndChar,
    #[error("bucket name contains invalid character: {0}")]
    InvalidChar(char),
    #[error("bucket name cannot contain consecutive periods")]
    ConsecutivePeriods,
    #[error("bucket name cannot be formatted as an IP address")]
    LooksLikeIpAddress,
}

/// Object key (path within a bucket)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new object key
    pub fn new(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Get the object key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    fn validate(key: &str) -> Result<(), ObjectKeyError> {
        // Maximum length: 1024 bytes (UTF-8)
        if key.len() > 1024 {
            return Err(ObjectKeyError::TooLong);
        }
        if key.is_empty() {
            return Err(ObjectKeyError::Empty);
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({:?})", self.0)
    }
}

/// Errors that can occur when creating an object key
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectKeyError {
    #[error("object key cannot be empty")]
    Empty,
    #[error("object key cannot exceed 1024 bytes")]
    TooLong,
}
