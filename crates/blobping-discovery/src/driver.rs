//! Discovery driver
//!
//! Invokes a [`DiscoveryProtocol`] on behalf of the local member and decides
//! what each failure means: configuration problems are fatal, everything else
//! is logged and retried on the next round.

use crate::member::MemberView;
use crate::protocol::{DiscoveryProtocol, RemoveSummary};
use crate::sink::Responses;
use blobping_common::{Error, MemberAddress, MembershipRecord, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives discovery for the local member
pub struct DiscoveryDriver {
    protocol: Arc<dyn DiscoveryProtocol>,
    view: Arc<MemberView>,
}

impl DiscoveryDriver {
    pub fn new(protocol: Arc<dyn DiscoveryProtocol>, view: Arc<MemberView>) -> Self {
        Self { protocol, view }
    }

    #[must_use]
    pub fn view(&self) -> &Arc<MemberView> {
        &self.view
    }

    /// Initialize the protocol
    pub async fn start(&self) -> Result<()> {
        self.protocol.init().await.inspect_err(|e| {
            error!("Failed to start {}: {}", self.protocol.name(), e);
        })
    }

    /// Publish the local record list
    pub async fn join(&self, records: &[MembershipRecord]) -> Result<()> {
        let Some(cluster) = self.view.cluster_name() else {
            return settle("join", Error::invalid_state("cluster name is not set"));
        };
        match self.protocol.write(records, &cluster).await {
            Ok(()) => {
                info!("Published {} record(s) to cluster '{}'", records.len(), cluster);
                Ok(())
            }
            Err(e) => settle("join", e),
        }
    }

    /// Discover the members of the local cluster
    ///
    /// Non-fatal failures are logged and whatever was found before the
    /// failure is returned.
    pub async fn find_members(&self, filter: Option<&[MemberAddress]>) -> Result<Responses> {
        let cluster = self.view.cluster_name();
        let mut responses = Responses::new();
        match self
            .protocol
            .read_all(filter, cluster.as_deref(), &mut responses)
            .await
        {
            Ok(summary) => {
                debug!(
                    "Found {} member(s), stopped early: {}",
                    responses.len(),
                    summary.stopped_on_empty
                );
            }
            Err(e) => settle("find_members", e)?,
        }
        Ok(responses)
    }

    /// Re-publish the local record list every `interval` until cancelled
    ///
    /// The first publish happens one interval after spawning; call
    /// [`join`](Self::join) for the initial one.
    pub fn spawn_heartbeat<F>(
        &self,
        records_fn: F,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()>
    where
        F: Fn() -> Vec<MembershipRecord> + Send + Sync + 'static,
    {
        let protocol = Arc::clone(&self.protocol);
        let view = Arc::clone(&self.view);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(cluster) = view.cluster_name() else {
                    debug!("No cluster name yet, skipping heartbeat");
                    continue;
                };
                let records = records_fn();
                if let Err(e) = protocol.write(&records, &cluster).await {
                    log_failure("heartbeat", &e);
                }
            }
            debug!("Heartbeat stopped");
        })
    }

    /// Remove the local member's record list
    pub async fn leave(&self) -> Result<RemoveSummary> {
        let cluster = self.view.cluster_name();
        let address = self.view.local_address();
        match self
            .protocol
            .remove(cluster.as_deref(), address.as_ref())
            .await
        {
            Ok(summary) => Ok(summary),
            Err(e) => settle("leave", e).map(|()| RemoveSummary::default()),
        }
    }

    /// Remove every record list of the local cluster
    pub async fn teardown(&self) -> Result<RemoveSummary> {
        let cluster = self.view.cluster_name();
        match self.protocol.remove_all(cluster.as_deref()).await {
            Ok(summary) => Ok(summary),
            Err(e) => settle("teardown", e).map(|()| RemoveSummary::default()),
        }
    }

    /// Stop the protocol's background work
    pub async fn stop(&self) {
        self.protocol.shutdown().await;
    }
}

/// Log a failure and propagate it only if it is fatal
fn settle(op: &str, err: Error) -> Result<()> {
    if err.is_fatal() {
        error!("{} failed with a configuration error: {}", op, err);
        return Err(err);
    }
    log_failure(op, &err);
    Ok(())
}

fn log_failure(op: &str, err: &Error) {
    if err.is_retryable() {
        warn!("{} failed, will retry next round: {}", op, err);
    } else {
        error!("{} failed: {}", op, err);
    }
}
