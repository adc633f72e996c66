//! BlobPing Discovery - cluster membership over object storage
//!
//! Every member publishes its membership snapshot as one blob keyed by its
//! address under a cluster prefix. Peers are discovered by listing and
//! reading every blob under that prefix, and the coordinator periodically
//! reaps blobs left behind by crashed or partitioned members.
//!
//! # Example
//!
//! ```rust,ignore
//! use blobping_discovery::{BlobPing, DiscoveryDriver, DiscoveryCache, MemberView};
//! use std::sync::Arc;
//!
//! let view = Arc::new(MemberView::new());
//! view.set_local_address("A".into());
//! view.set_cluster_name("demo");
//!
//! let cache = Arc::new(DiscoveryCache::new());
//! let ping = Arc::new(BlobPing::from_config(&config, view.clone(), cache)?);
//! let driver = DiscoveryDriver::new(ping, view);
//! driver.start().await?;
//! let members = driver.find_members(None).await;
//! ```

pub mod codec;
pub mod driver;
pub mod keys;
pub mod lister;
pub mod member;
pub mod metrics;
pub mod ping;
pub mod protocol;
pub mod reaper;
pub mod registry;
pub mod sink;

// Re-exports
pub use codec::{JsonCodec, RecordCodec, TextCodec, codec_for};
pub use driver::DiscoveryDriver;
pub use keys::KeyLayout;
pub use lister::{DEFAULT_PAGE_SIZE, list_all};
pub use member::{MemberSnapshot, MemberView};
pub use metrics::{DiscoveryMetrics, DiscoveryOperation, discovery_metrics};
pub use ping::{BlobPing, BlobPingOptions};
pub use protocol::{DiscoveryProtocol, ReadSummary, RemoveSummary};
pub use reaper::{CycleOutcome, ReapSummary, SkipReason, StaleEntryReaper};
pub use registry::{BLOB_PING, DEFAULT_MAGIC_NUMBER, ProtocolRegistry, protocol_registry};
pub use sink::{AddressCache, DiscoveryCache, PeerInfo, Response, ResponseSink, Responses};
