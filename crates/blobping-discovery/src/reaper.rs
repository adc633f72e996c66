//! Stale entry reaper
//!
//! Runs on every member but only acts while the member is coordinator. Each
//! cycle lists the cluster prefix and deletes:
//!
//! - empty blobs, regardless of age;
//! - blobs older than the interval that decode to nothing;
//! - blobs older than the interval in which no record attests the local
//!   member as coordinator.
//!
//! Live members re-publish well within the interval, so only blobs of
//! crashed or partitioned members age out.

use crate::codec::RecordCodec;
use crate::keys::KeyLayout;
use crate::lister::{DEFAULT_PAGE_SIZE, list_all};
use crate::member::MemberView;
use crate::metrics::{DiscoveryOperation, OperationTimer, discovery_metrics};
use crate::ping::delete_quietly;
use blobping_common::Result;
use blobping_store::{ObjectStore, ObjectSummary};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Why a cycle did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotCoordinator,
    NoClusterName,
    NoLocalAddress,
}

/// Counts from one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub examined: usize,
    pub deleted_empty: usize,
    pub deleted_junk: usize,
    pub deleted_stale: usize,
    pub kept: usize,
    pub delete_failures: usize,
}

impl ReapSummary {
    /// Blobs deleted in the cycle
    #[must_use]
    pub const fn deleted(&self) -> usize {
        self.deleted_empty + self.deleted_junk + self.deleted_stale
    }
}

/// Result of one reaper cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(ReapSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Empty,
    Junk,
    Stale,
}

/// Periodically deletes blobs left behind by departed members
pub struct StaleEntryReaper {
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn RecordCodec>,
    layout: KeyLayout,
    view: Arc<MemberView>,
    interval: Duration,
    page_size: u32,
}

impl StaleEntryReaper {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn RecordCodec>,
        layout: KeyLayout,
        view: Arc<MemberView>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            layout,
            view,
            interval,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle against the current time
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle, judging staleness against `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let snapshot = self.view.snapshot();
        if !snapshot.coordinator {
            return Ok(Self::skip(SkipReason::NotCoordinator));
        }
        let Some(prefix) = snapshot
            .cluster_name
            .as_deref()
            .and_then(|cluster| self.layout.cluster_prefix(cluster))
        else {
            return Ok(Self::skip(SkipReason::NoClusterName));
        };
        let Some(local) = snapshot.local_address else {
            return Ok(Self::skip(SkipReason::NoLocalAddress));
        };

        let objects = list_all(&*self.store, &prefix, None, self.page_size, None).await?;

        let mut summary = ReapSummary::default();
        for object in &objects {
            summary.examined += 1;

            let verdict = if object.is_empty() {
                Verdict::Empty
            } else if !self.is_expired(object, now) {
                Verdict::Keep
            } else {
                let fetched = match self.store.get_object(&object.key).await {
                    Ok(fetched) => fetched,
                    // Deleted by its owner since the listing
                    Err(e) if e.is_not_found() => {
                        trace!("Object '{}' disappeared before it was read", object.key);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                match self.codec.decode(&fetched.body) {
                    Ok(records) if records.is_empty() => Verdict::Junk,
                    Ok(records) if records.iter().any(|r| r.attests_coordinator(&local)) => {
                        Verdict::Keep
                    }
                    Ok(_) => Verdict::Stale,
                    Err(e) => {
                        debug!("Object '{}' is undecodable: {}", object.key, e);
                        Verdict::Junk
                    }
                }
            };

            if verdict == Verdict::Keep {
                summary.kept += 1;
                continue;
            }
            if !delete_quietly(&*self.store, &object.key).await {
                summary.delete_failures += 1;
                continue;
            }
            match verdict {
                Verdict::Empty => {
                    summary.deleted_empty += 1;
                    debug!("Deleted empty object '{}'", object.key);
                }
                Verdict::Junk => {
                    summary.deleted_junk += 1;
                    info!("Deleted unreadable object '{}'", object.key);
                }
                Verdict::Stale => {
                    summary.deleted_stale += 1;
                    info!("Deleted stale member object '{}'", object.key);
                }
                Verdict::Keep => {}
            }
        }

        discovery_metrics().record_reaped(summary.deleted() as u64);
        Ok(CycleOutcome::Completed(summary))
    }

    fn skip(reason: SkipReason) -> CycleOutcome {
        trace!("Skipping stale entry cycle: {:?}", reason);
        if reason == SkipReason::NotCoordinator {
            discovery_metrics().record_reaper_skip();
        }
        CycleOutcome::Skipped(reason)
    }

    /// Older than the interval; timestamps in the future are never expired
    fn is_expired(&self, object: &ObjectSummary, now: DateTime<Utc>) -> bool {
        (now - object.last_modified)
            .to_std()
            .is_ok_and(|age| age > self.interval)
    }

    /// Run cycles until `token` is cancelled
    ///
    /// The first cycle starts immediately. Cancellation abandons an
    /// in-progress cycle.
    pub async fn run(self, token: CancellationToken) {
        info!("Started stale entry reaper, interval {:?}", self.interval);

        loop {
            let timer = OperationTimer::new(DiscoveryOperation::ReaperCycle);
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                result = AssertUnwindSafe(self.run_cycle()).catch_unwind() => {
                    timer.complete(matches!(result, Ok(Ok(_))));
                    match result {
                        Ok(Ok(CycleOutcome::Completed(summary))) if summary.deleted() > 0 => {
                            info!(
                                "Stale entry cycle deleted {} of {} objects",
                                summary.deleted(),
                                summary.examined
                            );
                        }
                        Ok(Ok(outcome)) => trace!("Stale entry cycle finished: {:?}", outcome),
                        Ok(Err(e)) => error!("Stale entry cycle failed, will retry: {}", e),
                        Err(_) => error!("Stale entry cycle panicked, will retry"),
                    }
                }
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Stopped stale entry reaper");
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextCodec;
    use blobping_common::MembershipRecord;
    use blobping_store::MemoryObjectStore;
    use bytes::Bytes;

    const INTERVAL: Duration = Duration::from_secs(60);

    struct Fixture {
        store: Arc<MemoryObjectStore>,
        view: Arc<MemberView>,
        reaper: StaleEntryReaper,
    }

    fn fixture(interval: Duration) -> Fixture {
        let store = Arc::new(MemoryObjectStore::new("membership"));
        let view = Arc::new(MemberView::joined("A", "demo"));
        view.set_coordinator(true);
        let reaper = StaleEntryReaper::new(
            store.clone(),
            Arc::new(TextCodec),
            KeyLayout::new("jg"),
            view.clone(),
            interval,
        );
        Fixture {
            store,
            view,
            reaper,
        }
    }

    fn encoded(records: &[MembershipRecord]) -> Bytes {
        TextCodec.encode(records).unwrap()
    }

    fn backdate(store: &MemoryObjectStore, key: &str) {
        assert!(store.set_last_modified(key, Utc::now() - chrono::Duration::minutes(5)));
    }

    fn completed(outcome: CycleOutcome) -> ReapSummary {
        match outcome {
            CycleOutcome::Completed(summary) => summary,
            CycleOutcome::Skipped(reason) => panic!("cycle skipped: {reason:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_blob_deleted_regardless_of_age() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/demo/B", Bytes::new());

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.deleted_empty, 1);
        assert!(!fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_fresh_blob_is_kept() {
        let fx = fixture(INTERVAL);
        fx.store
            .insert("jg/demo/B", encoded(&[MembershipRecord::new("B")]));

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.kept, 1);
        assert_eq!(fx.store.get_calls(), 0);
        assert!(fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_old_blob_without_coordinator_record_is_deleted() {
        let fx = fixture(INTERVAL);
        fx.store.insert(
            "jg/demo/B",
            encoded(&[MembershipRecord::new("B"), MembershipRecord::new("A")]),
        );
        backdate(&fx.store, "jg/demo/B");

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.deleted_stale, 1);
        assert!(!fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_old_blob_attesting_local_coordinator_is_kept() {
        let fx = fixture(INTERVAL);
        fx.store.insert(
            "jg/demo/A",
            encoded(&[
                MembershipRecord::new("A").with_coordinator(true),
                MembershipRecord::new("B"),
            ]),
        );
        backdate(&fx.store, "jg/demo/A");
        // Coordinator flag on another member does not count
        fx.store.insert(
            "jg/demo/C",
            encoded(&[MembershipRecord::new("C").with_coordinator(true)]),
        );
        backdate(&fx.store, "jg/demo/C");

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.deleted_stale, 1);
        assert!(fx.store.contains("jg/demo/A"));
        assert!(!fx.store.contains("jg/demo/C"));
    }

    #[tokio::test]
    async fn test_old_junk_blob_is_deleted() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/demo/B", "not a record list");
        fx.store.insert("jg/demo/C", "\n");
        backdate(&fx.store, "jg/demo/B");
        backdate(&fx.store, "jg/demo/C");

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.deleted_junk, 2);
        assert!(fx.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_reaper_confined_to_cluster_prefix() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/other/B", Bytes::new());
        fx.store.insert("jg/demo2/B", Bytes::new());

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.examined, 0);
        assert_eq!(fx.store.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_suppressed_when_not_coordinator() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/demo/B", Bytes::new());
        fx.view.set_coordinator(false);

        let outcome = fx.reaper.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NotCoordinator));
        assert!(fx.store.contains("jg/demo/B"));
        assert_eq!(fx.store.list_calls(), 0);

        // Coordinator status is re-read every cycle
        fx.view.set_coordinator(true);
        completed(fx.reaper.run_cycle().await.unwrap());
        assert!(!fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_cycle_skipped_without_local_address() {
        let fx = fixture(INTERVAL);
        fx.view.clear_local_address();
        let outcome = fx.reaper.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoLocalAddress));
    }

    #[tokio::test]
    async fn test_cycle_skipped_for_empty_cluster_name() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/other/X", Bytes::new());

        for cluster in ["", "/"] {
            fx.view.set_cluster_name(cluster);
            let outcome = fx.reaper.run_cycle().await.unwrap();
            assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoClusterName));
        }
        assert_eq!(fx.store.list_calls(), 0);
        assert!(fx.store.contains("jg/other/X"));
    }

    #[tokio::test]
    async fn test_delete_failures_are_counted() {
        let fx = fixture(INTERVAL);
        fx.store.insert("jg/demo/B", Bytes::new());
        fx.store.insert("jg/demo/C", Bytes::new());
        fx.store.fail_delete("jg/demo/B");

        let summary = completed(fx.reaper.run_cycle().await.unwrap());
        assert_eq!(summary.delete_failures, 1);
        assert_eq!(summary.deleted_empty, 1);
        assert!(fx.store.contains("jg/demo/B"));
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_cycle() {
        let fx = fixture(INTERVAL);
        fx.store
            .insert("jg/demo/B", encoded(&[MembershipRecord::new("B")]));
        fx.store.insert("jg/demo/C", Bytes::new());
        backdate(&fx.store, "jg/demo/B");
        fx.store.fail_get("jg/demo/B");

        assert!(fx.reaper.run_cycle().await.is_err());
        // Later entries were not reached
        assert!(fx.store.contains("jg/demo/C"));
    }

    #[tokio::test]
    async fn test_future_timestamp_is_not_expired() {
        let fx = fixture(INTERVAL);
        fx.store
            .insert("jg/demo/B", encoded(&[MembershipRecord::new("B")]));
        let summary = completed(
            fx.reaper
                .run_cycle_at(Utc::now() - chrono::Duration::hours(1))
                .await
                .unwrap(),
        );
        assert_eq!(summary.kept, 1);
    }

    #[tokio::test]
    async fn test_loop_exits_promptly_on_cancellation() {
        let fx = fixture(INTERVAL);
        let token = CancellationToken::new();
        let handle = fx.reaper.spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_cycle_errors() {
        let fx = fixture(Duration::from_millis(20));
        fx.store.insert("jg/demo/B", Bytes::new());
        // First cycle fails on listing, a later one cleans up
        fx.store.fail_list_page(0);

        let token = CancellationToken::new();
        let handle = fx.reaper.spawn(token.clone());

        let mut cleaned = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !fx.store.contains("jg/demo/B") {
                cleaned = true;
                break;
            }
        }
        token.cancel();
        handle.await.unwrap();

        assert!(cleaned, "reaper stopped after a failed cycle");
        assert!(fx.store.list_calls() >= 2);
    }

    #[tokio::test]
    async fn test_first_cycle_runs_immediately() {
        let fx = fixture(Duration::from_secs(3600));
        fx.store.insert("jg/demo/B", Bytes::new());

        let token = CancellationToken::new();
        let handle = fx.reaper.spawn(token.clone());
        for _ in 0..100 {
            if !fx.store.contains("jg/demo/B") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();
        handle.await.unwrap();

        assert!(!fx.store.contains("jg/demo/B"));
    }
}
