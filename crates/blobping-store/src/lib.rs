//! BlobPing Store - Object storage access
//!
//! This crate defines the [`ObjectStore`] boundary used by the discovery
//! core and provides two implementations:
//! - [`S3ObjectStore`]: S3-compatible HTTP backend (AWS S3, Aliyun OSS, MinIO)
//! - [`MemoryObjectStore`]: in-process backend for tests and single-host setups

pub mod memory;
pub mod s3;
pub mod store;
pub mod xml;

// Re-exports
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;
pub use store::{
    DeleteFailure, ListRequest, ObjectListing, ObjectStore, ObjectSummary, PutOptions,
    StoredObject,
};
