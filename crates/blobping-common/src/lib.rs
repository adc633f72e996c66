//! BlobPing Common - Shared types and utilities
//!
//! This crate provides the membership data model, error definitions and
//! configuration used across all BlobPing components.

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::{CodecKind, Config, DiscoveryConfig, StoreConfig};
pub use error::{Error, Result};
pub use types::*;
