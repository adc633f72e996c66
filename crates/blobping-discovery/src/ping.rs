//! Object-storage discovery protocol
//!
//! Each member owns one blob, `{prefix}{cluster}/{address}`, holding its
//! encoded record list. Discovery lists the cluster prefix and reads every
//! blob; leaving deletes the owner's blob; the coordinator runs a
//! [`StaleEntryReaper`] to clean up after members that never left.

use crate::codec::{RecordCodec, codec_for};
use crate::keys::{FilenameFn, KeyLayout, cluster_name};
use crate::lister::{DEFAULT_PAGE_SIZE, list_all};
use crate::member::MemberView;
use crate::metrics::{DiscoveryOperation, OperationTimer, discovery_metrics};
use crate::protocol::{DiscoveryProtocol, ReadSummary, RemoveSummary};
use crate::reaper::StaleEntryReaper;
use crate::registry::{self, BLOB_PING};
use crate::sink::{AddressCache, ResponseSink};
use async_trait::async_trait;
use blobping_common::config::MAX_PAGE_SIZE;
use blobping_common::{CodecKind, Config, Error, MemberAddress, MembershipRecord, Result};
use blobping_store::{ObjectStore, PutOptions, S3ObjectStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Protocol settings independent of the store connection
#[derive(Debug, Clone)]
pub struct BlobPingOptions {
    /// Prefix of every key, normalized on use
    pub bucket_prefix: String,
    /// Entries requested per listing page
    pub page_size: u32,
    /// Reaper cadence and staleness threshold
    pub reaper_interval: Duration,
    /// Storage class requested on put
    pub storage_class: String,
    /// Blob wire format
    pub codec: CodecKind,
}

impl Default for BlobPingOptions {
    fn default() -> Self {
        Self {
            bucket_prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            reaper_interval: Duration::from_secs(60),
            storage_class: "STANDARD".to_string(),
            codec: CodecKind::Text,
        }
    }
}

impl BlobPingOptions {
    /// Options from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket_prefix: config.store.bucket_prefix.clone(),
            page_size: config.store.page_size,
            reaper_interval: config.discovery.reaper_interval(),
            storage_class: config.discovery.storage_class.clone(),
            codec: config.discovery.codec,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::configuration(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.reaper_interval.is_zero() {
            return Err(Error::configuration("reaper interval must be positive"));
        }
        if self.storage_class.trim().is_empty() {
            return Err(Error::configuration("storage class must not be empty"));
        }
        Ok(())
    }
}

struct ReaperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Discovery protocol backed by an object store
pub struct BlobPing {
    store: Arc<dyn ObjectStore>,
    endpoint: Option<String>,
    layout: KeyLayout,
    codec: Arc<dyn RecordCodec>,
    options: BlobPingOptions,
    view: Arc<MemberView>,
    cache: Arc<dyn AddressCache>,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl BlobPing {
    /// Create the protocol over an S3-compatible store from configuration
    pub fn from_config(
        config: &Config,
        view: Arc<MemberView>,
        cache: Arc<dyn AddressCache>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(S3ObjectStore::new(&config.store)?);
        let mut ping = Self::new(store, BlobPingOptions::from_config(config), view, cache)?;
        ping.endpoint = Some(config.store.endpoint.clone());
        Ok(ping)
    }

    /// Create the protocol over any object store
    pub fn new(
        store: Arc<dyn ObjectStore>,
        options: BlobPingOptions,
        view: Arc<MemberView>,
        cache: Arc<dyn AddressCache>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            store,
            endpoint: None,
            layout: KeyLayout::new(&options.bucket_prefix),
            codec: codec_for(options.codec),
            options,
            view,
            cache,
            reaper: Mutex::new(None),
        })
    }

    /// Replace the address to filename mapping
    #[must_use]
    pub fn with_filename_fn(mut self, filename: FilenameFn) -> Self {
        self.layout = self.layout.with_filename_fn(filename);
        self
    }

    #[must_use]
    pub const fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    #[must_use]
    pub fn view(&self) -> &Arc<MemberView> {
        &self.view
    }

    /// Reaper operating on the same store and view as this protocol
    #[must_use]
    pub fn stale_entry_reaper(&self) -> StaleEntryReaper {
        StaleEntryReaper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.codec),
            self.layout.clone(),
            Arc::clone(&self.view),
            self.options.reaper_interval,
        )
        .with_page_size(self.options.page_size)
    }

    /// Whether the reaper task is running
    #[must_use]
    pub fn is_reaper_running(&self) -> bool {
        self.reaper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Cluster name and its prefix; absent or empty names yield `None`
    fn cluster_and_prefix<'a>(&self, cluster: Option<&'a str>) -> Option<(&'a str, String)> {
        let cluster = cluster.and_then(cluster_name)?;
        let prefix = self.layout.cluster_prefix(cluster)?;
        Some((cluster, prefix))
    }

    async fn read_all_inner(
        &self,
        members: Option<&[MemberAddress]>,
        cluster: &str,
        prefix: &str,
        sink: &mut dyn ResponseSink,
    ) -> Result<ReadSummary> {
        trace!("Getting entries for cluster prefix '{}'", prefix);

        let objects = list_all(&*self.store, prefix, None, self.options.page_size, None).await?;
        let local = self.view.local_address();
        let mut summary = ReadSummary {
            blobs_listed: objects.len(),
            ..ReadSummary::default()
        };

        for object in &objects {
            if object.is_empty() {
                trace!("Skipping empty object '{}'", object.key);
                continue;
            }

            let fetched = self.store.get_object(&object.key).await?;
            summary.blobs_fetched += 1;

            // An empty or undecodable blob ends the whole read, not just this blob
            let records = match self.codec.decode(&fetched.body) {
                Ok(records) if !records.is_empty() => records,
                Ok(_) => {
                    debug!("Object '{}' holds no records, stopping read", object.key);
                    summary.stopped_on_empty = true;
                    break;
                }
                Err(e) => {
                    debug!("Could not decode object '{}' ({}), stopping read", object.key, e);
                    summary.stopped_on_empty = true;
                    break;
                }
            };

            for record in records {
                if members.is_none_or(|members| members.contains(&record.address)) {
                    sink.add_response(record.clone(), record.coordinator);
                    summary.records_added += 1;
                }
                if local.as_ref().is_some_and(|local| *local != record.address) {
                    self.cache.add_discovery_response(
                        &record.address,
                        record.logical_name.as_deref(),
                        record.physical_addr,
                    );
                }
            }
        }

        discovery_metrics().record_discovered(summary.records_added as u64);
        debug!(
            "Read cluster '{}': {} listed, {} fetched, {} records",
            cluster, summary.blobs_listed, summary.blobs_fetched, summary.records_added
        );
        Ok(summary)
    }

    async fn write_inner(&self, records: &[MembershipRecord], cluster: &str) -> Result<()> {
        let local = self
            .view
            .local_address()
            .ok_or_else(|| Error::invalid_state("local address is not assigned yet"))?;
        let key = self.layout.member_key(cluster, &local)?;
        let body = self.codec.encode(records)?;
        trace!(
            "New content of '{}' ({} bytes): {}",
            key,
            body.len(),
            String::from_utf8_lossy(&body)
        );

        let options = PutOptions {
            content_type: self.codec.content_type().to_string(),
            storage_class: self.options.storage_class.clone(),
        };
        self.store.put_object(key.as_str(), body, &options).await?;

        debug!(
            "Wrote {} record(s) to '{}' in bucket '{}'",
            records.len(),
            key,
            self.store.bucket()
        );
        Ok(())
    }

    async fn remove_all_inner(&self, cluster: &str, prefix: &str) -> Result<RemoveSummary> {
        let objects = list_all(&*self.store, prefix, None, self.options.page_size, None).await?;

        let mut summary = RemoveSummary::default();
        for object in &objects {
            if delete_quietly(&*self.store, &object.key).await {
                summary.deleted += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            "Removed {} of {} entries of cluster '{}'",
            summary.deleted,
            objects.len(),
            cluster
        );
        Ok(summary)
    }
}

#[async_trait]
impl DiscoveryProtocol for BlobPing {
    fn name(&self) -> &'static str {
        BLOB_PING
    }

    async fn init(&self) -> Result<()> {
        self.options.validate()?;
        let id = registry::register_blob_ping()?;

        info!(
            "Using object store at endpoint '{}' with bucket '{}' and prefix '{}' (protocol id {})",
            self.endpoint.as_deref().unwrap_or("<custom>"),
            self.store.bucket(),
            self.layout.prefix(),
            id
        );

        let mut reaper = self.reaper.lock();
        if reaper.is_some() {
            return Err(Error::invalid_state("protocol is already initialized"));
        }
        let token = CancellationToken::new();
        let task = self.stale_entry_reaper().spawn(token.clone());
        *reaper = Some(ReaperHandle { token, task });
        drop(reaper);
        Ok(())
    }

    async fn write(&self, records: &[MembershipRecord], cluster: &str) -> Result<()> {
        let timer = OperationTimer::new(DiscoveryOperation::Write);
        let result = self.write_inner(records, cluster).await;
        timer.complete(result.is_ok());
        result
    }

    async fn read_all(
        &self,
        members: Option<&[MemberAddress]>,
        cluster: Option<&str>,
        sink: &mut dyn ResponseSink,
    ) -> Result<ReadSummary> {
        let Some((cluster, prefix)) = self.cluster_and_prefix(cluster) else {
            return Ok(ReadSummary::default());
        };
        let timer = OperationTimer::new(DiscoveryOperation::ReadAll);
        let result = self.read_all_inner(members, cluster, &prefix, sink).await;
        timer.complete(result.is_ok());
        result
    }

    async fn remove(
        &self,
        cluster: Option<&str>,
        address: Option<&MemberAddress>,
    ) -> Result<RemoveSummary> {
        let (Some(cluster), Some(address)) = (cluster.and_then(cluster_name), address) else {
            return Ok(RemoveSummary::default());
        };
        let timer = OperationTimer::new(DiscoveryOperation::Remove);
        let key = match self.layout.member_key(cluster, address) {
            Ok(key) => key,
            Err(e) => {
                timer.complete(false);
                return Err(e);
            }
        };

        trace!("Removing '{}'", key);
        let deleted = delete_quietly(&*self.store, key.as_str()).await;
        timer.complete(deleted);
        Ok(RemoveSummary {
            deleted: usize::from(deleted),
            failed: usize::from(!deleted),
        })
    }

    async fn remove_all(&self, cluster: Option<&str>) -> Result<RemoveSummary> {
        let Some((cluster, prefix)) = self.cluster_and_prefix(cluster) else {
            return Ok(RemoveSummary::default());
        };
        let timer = OperationTimer::new(DiscoveryOperation::RemoveAll);
        let result = self.remove_all_inner(cluster, &prefix).await;
        timer.complete(result.is_ok());
        result
    }

    async fn shutdown(&self) {
        let handle = self.reaper.lock().take();
        if let Some(ReaperHandle { token, task }) = handle {
            token.cancel();
            if let Err(e) = task.await {
                warn!("Stale entry reaper terminated abnormally: {}", e);
            }
        }
    }
}

/// Delete one key, logging instead of propagating failures
pub(crate) async fn delete_quietly(store: &dyn ObjectStore, key: &str) -> bool {
    let keys = [key.to_string()];
    match store.delete_objects(&keys, true).await {
        Ok(failures) if failures.is_empty() => true,
        Ok(failures) => {
            for failure in &failures {
                error!(
                    "Failed deleting object '{}': {} {}",
                    failure.key, failure.code, failure.message
                );
            }
            discovery_metrics().record_delete_failures(1);
            false
        }
        Err(e) => {
            error!("Failed deleting object '{}': {}", key, e);
            discovery_metrics().record_delete_failures(1);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{DiscoveryCache, Responses};
    use blobping_store::MemoryObjectStore;

    struct Fixture {
        store: Arc<MemoryObjectStore>,
        view: Arc<MemberView>,
        cache: Arc<DiscoveryCache>,
        ping: BlobPing,
    }

    fn fixture(options: BlobPingOptions) -> Fixture {
        let store = Arc::new(MemoryObjectStore::new("membership"));
        let view = Arc::new(MemberView::joined("A", "demo"));
        let cache = Arc::new(DiscoveryCache::new());
        let ping = BlobPing::new(store.clone(), options, view.clone(), cache.clone()).unwrap();
        Fixture {
            store,
            view,
            cache,
            ping,
        }
    }

    fn jg_options() -> BlobPingOptions {
        BlobPingOptions {
            bucket_prefix: "jg/".to_string(),
            ..BlobPingOptions::default()
        }
    }

    fn record(addr: &str) -> MembershipRecord {
        MembershipRecord::new(addr).with_logical_name(format!("node-{}", addr.to_lowercase()))
    }

    async fn read(ping: &BlobPing, members: Option<&[MemberAddress]>) -> (Responses, ReadSummary) {
        let mut responses = Responses::new();
        let summary = ping
            .read_all(members, Some("demo"), &mut responses)
            .await
            .unwrap();
        (responses, summary)
    }

    #[tokio::test]
    async fn test_write_then_read_from_another_member() {
        let fx = fixture(jg_options());
        let a = MembershipRecord::new("A")
            .with_logical_name("node-a")
            .with_physical_addr("10.0.0.1:7800".parse().unwrap())
            .with_coordinator(true);
        fx.ping.write(&[a.clone()], "demo").await.unwrap();

        assert!(fx.store.contains("jg/demo/A"));
        let options = fx.store.options("jg/demo/A").unwrap();
        assert_eq!(options.content_type, "text/plain");
        assert_eq!(options.storage_class, "STANDARD");

        // B reads with the same store
        let view_b = Arc::new(MemberView::joined("B", "demo"));
        let cache_b = Arc::new(DiscoveryCache::new());
        let ping_b = BlobPing::new(fx.store.clone(), jg_options(), view_b, cache_b.clone()).unwrap();

        let (responses, summary) = read(&ping_b, None).await;
        assert_eq!(summary.records_added, 1);
        let response = responses.get(&MemberAddress::new("A")).unwrap();
        assert_eq!(response.record, a);
        assert!(response.is_coordinator);

        let peer = cache_b.get(&MemberAddress::new("A")).unwrap();
        assert_eq!(peer.logical_name.as_deref(), Some("node-a"));
        assert_eq!(peer.physical_addr, Some("10.0.0.1:7800".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_read_without_cluster_does_nothing() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", "- B - F\n");

        let mut responses = Responses::new();
        let summary = fx.ping.read_all(None, None, &mut responses).await.unwrap();
        assert_eq!(summary, ReadSummary::default());
        assert!(responses.is_empty());
        assert_eq!(fx.store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_all_across_pages() {
        let fx = fixture(BlobPingOptions {
            page_size: 2,
            ..jg_options()
        });
        for addr in ["B", "C", "D", "E", "F"] {
            fx.store.insert(
                format!("jg/demo/{addr}"),
                encoded(&record(addr)),
            );
        }

        let (responses, summary) = read(&fx.ping, None).await;
        assert_eq!(summary.blobs_listed, 5);
        assert_eq!(responses.len(), 5);
        assert_eq!(fx.store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_read_all_skips_zero_size_blobs() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", bytes::Bytes::new());
        fx.store.insert("jg/demo/C", encoded(&record("C")));

        let (responses, summary) = read(&fx.ping, None).await;
        assert_eq!(summary.blobs_listed, 2);
        assert_eq!(summary.blobs_fetched, 1);
        assert_eq!(responses.addresses(), vec![MemberAddress::new("C")]);
        assert_eq!(fx.store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_read_all_stops_at_first_empty_blob() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", encoded(&record("B")));
        fx.store.insert("jg/demo/C", "\n\n");
        fx.store.insert("jg/demo/D", encoded(&record("D")));

        let (responses, summary) = read(&fx.ping, None).await;
        assert!(summary.stopped_on_empty);
        assert_eq!(responses.addresses(), vec![MemberAddress::new("B")]);
        assert!(!responses.contains(&MemberAddress::new("D")));
    }

    #[tokio::test]
    async fn test_read_all_stops_at_undecodable_blob() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", "garbage");
        fx.store.insert("jg/demo/C", encoded(&record("C")));

        let (responses, summary) = read(&fx.ping, None).await;
        assert!(summary.stopped_on_empty);
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_filter_limits_sink_not_cache() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", encoded(&record("B")));
        fx.store.insert("jg/demo/C", encoded(&record("C")));

        let filter = [MemberAddress::new("C")];
        let (responses, summary) = read(&fx.ping, Some(&filter)).await;
        assert_eq!(summary.records_added, 1);
        assert_eq!(responses.addresses(), vec![MemberAddress::new("C")]);
        assert!(fx.cache.get(&MemberAddress::new("B")).is_some());
        assert!(fx.cache.get(&MemberAddress::new("C")).is_some());
    }

    #[tokio::test]
    async fn test_read_all_does_not_cache_self_or_without_local_address() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();
        fx.store.insert("jg/demo/B", encoded(&record("B")));

        let (responses, _) = read(&fx.ping, None).await;
        assert_eq!(responses.len(), 2);
        assert!(fx.cache.get(&MemberAddress::new("A")).is_none());
        assert!(fx.cache.get(&MemberAddress::new("B")).is_some());

        fx.cache.remove(&MemberAddress::new("B"));
        fx.view.clear_local_address();
        let (responses, _) = read(&fx.ping, None).await;
        assert_eq!(responses.len(), 2);
        assert!(fx.cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_fetch_error_keeps_partial_responses() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", encoded(&record("B")));
        fx.store.insert("jg/demo/C", encoded(&record("C")));
        fx.store.fail_get("jg/demo/C");

        let mut responses = Responses::new();
        let err = fx
            .ping
            .read_all(None, Some("demo"), &mut responses)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(responses.addresses(), vec![MemberAddress::new("B")]);
    }

    #[tokio::test]
    async fn test_write_requires_local_address() {
        let fx = fixture(jg_options());
        fx.view.clear_local_address();
        let err = fx.ping.write(&[record("A")], "demo").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(fx.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_blob() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();
        fx.ping
            .write(&[record("A"), record("B")], "demo")
            .await
            .unwrap();

        assert_eq!(fx.store.keys(), vec!["jg/demo/A".to_string()]);
        let (responses, _) = read(&fx.ping, None).await;
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_blob() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();
        let before = fx.store.content("jg/demo/A").unwrap();

        fx.store.fail_puts(true);
        assert!(fx.ping.write(&[record("A"), record("B")], "demo").await.is_err());
        assert_eq!(fx.store.content("jg/demo/A").unwrap(), before);
    }

    #[tokio::test]
    async fn test_json_codec_blobs() {
        let fx = fixture(BlobPingOptions {
            codec: CodecKind::Json,
            ..jg_options()
        });
        fx.ping.write(&[record("A").with_coordinator(true)], "demo").await.unwrap();
        assert_eq!(
            fx.store.options("jg/demo/A").unwrap().content_type,
            "application/json"
        );

        let (responses, _) = read(&fx.ping, None).await;
        assert!(responses.get(&MemberAddress::new("A")).unwrap().is_coordinator);
    }

    #[tokio::test]
    async fn test_remove_then_read_excludes_member() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();
        fx.store.insert("jg/demo/B", encoded(&record("B")));

        let summary = fx
            .ping
            .remove(Some("demo"), Some(&MemberAddress::new("A")))
            .await
            .unwrap();
        assert_eq!(summary.deleted, 1);

        let (responses, _) = read(&fx.ping, None).await;
        assert!(!responses.contains(&MemberAddress::new("A")));
        assert!(responses.contains(&MemberAddress::new("B")));
    }

    #[tokio::test]
    async fn test_remove_without_cluster_or_address_is_noop() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();

        let address = MemberAddress::new("A");
        assert_eq!(
            fx.ping.remove(None, Some(&address)).await.unwrap(),
            RemoveSummary::default()
        );
        assert_eq!(
            fx.ping.remove(Some("demo"), None).await.unwrap(),
            RemoveSummary::default()
        );
        assert!(fx.store.contains("jg/demo/A"));
    }

    #[tokio::test]
    async fn test_remove_failure_is_not_propagated() {
        let fx = fixture(jg_options());
        fx.ping.write(&[record("A")], "demo").await.unwrap();
        fx.store.fail_delete("jg/demo/A");

        let summary = fx
            .ping
            .remove(Some("demo"), Some(&MemberAddress::new("A")))
            .await
            .unwrap();
        assert_eq!(summary, RemoveSummary { deleted: 0, failed: 1 });
        assert!(fx.store.contains("jg/demo/A"));
    }

    #[tokio::test]
    async fn test_remove_all_tolerates_individual_failures() {
        let fx = fixture(jg_options());
        for addr in ["A", "B", "C"] {
            fx.store.insert(format!("jg/demo/{addr}"), encoded(&record(addr)));
        }
        fx.store.insert("jg/other/X", encoded(&record("X")));
        fx.store.fail_delete("jg/demo/B");

        let summary = fx.ping.remove_all(Some("demo")).await.unwrap();
        assert_eq!(summary, RemoveSummary { deleted: 2, failed: 1 });
        assert_eq!(
            fx.store.keys(),
            vec!["jg/demo/B".to_string(), "jg/other/X".to_string()]
        );
        assert_eq!(
            fx.ping.remove_all(None).await.unwrap(),
            RemoveSummary::default()
        );
    }

    #[tokio::test]
    async fn test_remove_all_listing_failure_is_returned() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/demo/B", encoded(&record("B")));
        fx.store.fail_list_page(0);

        assert!(fx.ping.remove_all(Some("demo")).await.is_err());
        assert!(fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_empty_cluster_name_never_touches_other_clusters() {
        let fx = fixture(jg_options());
        fx.store.insert("jg/other/X", encoded(&record("X")));

        for cluster in ["", "/"] {
            let mut responses = Responses::new();
            let summary = fx
                .ping
                .read_all(None, Some(cluster), &mut responses)
                .await
                .unwrap();
            assert_eq!(summary, ReadSummary::default());
            assert!(responses.is_empty());

            assert_eq!(
                fx.ping.remove_all(Some(cluster)).await.unwrap(),
                RemoveSummary::default()
            );
            assert_eq!(
                fx.ping
                    .remove(Some(cluster), Some(&MemberAddress::new("X")))
                    .await
                    .unwrap(),
                RemoveSummary::default()
            );
            let err = fx.ping.write(&[record("A")], cluster).await.unwrap_err();
            assert!(matches!(err, Error::InvalidState(_)));
        }

        assert_eq!(fx.store.list_calls(), 0);
        assert!(fx.cache.is_empty());
        assert_eq!(fx.store.keys(), vec!["jg/other/X".to_string()]);
    }

    struct OrderCheckingSink {
        cache: Arc<DiscoveryCache>,
        cached_before_sink: Vec<MemberAddress>,
    }

    impl ResponseSink for OrderCheckingSink {
        fn add_response(&mut self, record: MembershipRecord, _is_coordinator: bool) {
            if self.cache.get(&record.address).is_some() {
                self.cached_before_sink.push(record.address);
            }
        }
    }

    #[tokio::test]
    async fn test_read_all_offers_record_to_sink_before_caching() {
        let fx = fixture(jg_options());
        for addr in ["B", "C"] {
            fx.store.insert(format!("jg/demo/{addr}"), encoded(&record(addr)));
        }

        let mut sink = OrderCheckingSink {
            cache: fx.cache.clone(),
            cached_before_sink: Vec::new(),
        };
        let summary = fx.ping.read_all(None, Some("demo"), &mut sink).await.unwrap();
        assert_eq!(summary.records_added, 2);
        assert!(sink.cached_before_sink.is_empty());
        assert_eq!(fx.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_custom_filename_fn() {
        let fx = fixture(jg_options());
        let ping = fx
            .ping
            .with_filename_fn(Arc::new(|addr: &MemberAddress| format!("{addr}.list")));
        ping.write(&[record("A")], "demo").await.unwrap();
        assert!(fx.store.contains("jg/demo/A.list"));

        ping.remove(Some("demo"), Some(&MemberAddress::new("A")))
            .await
            .unwrap();
        assert!(fx.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let fx = fixture(jg_options());
        fx.ping.init().await.unwrap();
        assert!(fx.ping.is_reaper_running());
        assert!(matches!(
            fx.ping.init().await.unwrap_err(),
            Error::InvalidState(_)
        ));

        fx.ping.shutdown().await;
        assert!(!fx.ping.is_reaper_running());
        // A second shutdown has nothing to stop
        fx.ping.shutdown().await;
    }

    #[test]
    fn test_invalid_options() {
        let store = Arc::new(MemoryObjectStore::new("membership"));
        let view = Arc::new(MemberView::new());
        let cache = Arc::new(DiscoveryCache::new());
        let options = BlobPingOptions {
            page_size: 0,
            ..BlobPingOptions::default()
        };
        let err = BlobPing::new(store, options, view, cache).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_from_config_requires_store_settings() {
        let view = Arc::new(MemberView::new());
        let cache = Arc::new(DiscoveryCache::new());
        let err = BlobPing::from_config(&Config::default(), view, cache)
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    /// Text encoding of one record, for seeding blobs directly
    fn encoded(record: &MembershipRecord) -> bytes::Bytes {
        crate::codec::TextCodec
            .encode(std::slice::from_ref(record))
            .unwrap()
    }
}
