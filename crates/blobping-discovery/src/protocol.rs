//! Discovery protocol capability
//!
//! The driver talks to a discovery protocol only through this trait, so the
//! object-storage implementation can be swapped for another backend or a
//! test double.

use crate::sink::ResponseSink;
use async_trait::async_trait;
use blobping_common::{MemberAddress, MembershipRecord, Result};

/// Outcome of one `read_all` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Blobs found under the cluster prefix
    pub blobs_listed: usize,
    /// Blobs fetched and decoded
    pub blobs_fetched: usize,
    /// Records handed to the sink
    pub records_added: usize,
    /// Reading stopped at a blob that decoded to nothing
    pub stopped_on_empty: bool,
}

/// Outcome of a remove call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Membership discovery over a shared medium
#[async_trait]
pub trait DiscoveryProtocol: Send + Sync {
    /// Protocol name
    fn name(&self) -> &'static str;

    /// Validate settings and start background work
    async fn init(&self) -> Result<()>;

    /// Publish the local member's record list for `cluster`
    async fn write(&self, records: &[MembershipRecord], cluster: &str) -> Result<()>;

    /// Read every published record of `cluster` into `sink`
    ///
    /// `members`, when given, limits which records reach the sink. Without a
    /// cluster name nothing is read.
    async fn read_all(
        &self,
        members: Option<&[MemberAddress]>,
        cluster: Option<&str>,
        sink: &mut dyn ResponseSink,
    ) -> Result<ReadSummary>;

    /// Delete the record list published by `address`
    async fn remove(
        &self,
        cluster: Option<&str>,
        address: Option<&MemberAddress>,
    ) -> Result<RemoveSummary>;

    /// Delete every record list of `cluster`
    async fn remove_all(&self, cluster: Option<&str>) -> Result<RemoveSummary>;

    /// Stop background work
    async fn shutdown(&self);
}
