//! Diff-and-apply engine
//!
//! One pass: take the store lock, wait for the platform to settle, collect
//! the desired set, withdraw stale routes, publish missing ones. The lock is
//! held for the whole pass so passes never interleave.
//!
//! A failed publish leaves the store unchanged for that key. Since every pass
//! recomputes the desired set from scratch, a failed publish is retried by
//! the next pass, and a failed withdrawal is retried for as long as the key
//! stays undesired. A failed withdrawal may still have been applied by the
//! speaker, so if its key becomes desired again it is published anew.

use crate::collector::TopologyCollector;
use crate::desired::DesiredSet;
use crate::error::{Result, SyncError};
use crate::publisher::RoutePublisher;
use crate::store::{Advertisement, RouteStore};
use lxd_bgp_types::RouteKey;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default delay between taking the lock and collecting.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Timing knobs of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Delay after acquiring the lock, giving the platform time to settle
    pub settle_delay: Duration,
    /// Upper bound on collection; exceeding it aborts the pass before any change
    pub collect_timeout: Option<Duration>,
    /// Upper bound on each publish or withdraw call
    pub call_timeout: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            collect_timeout: None,
            call_timeout: None,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Size of the desired set
    pub desired: usize,
    /// Keys already published and still desired
    pub unchanged: usize,
    pub published: usize,
    pub publish_failed: usize,
    pub withdrawn: usize,
    pub withdraw_failed: usize,
}

impl PassReport {
    /// Number of publish and withdraw calls issued.
    pub fn calls(&self) -> usize {
        self.published + self.publish_failed + self.withdrawn + self.withdraw_failed
    }

    /// Returns true if any call failed.
    pub fn has_failures(&self) -> bool {
        self.publish_failed > 0 || self.withdraw_failed > 0
    }
}

async fn bounded<T, F>(limit: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SyncError::timeout(operation, limit))?,
        None => fut.await,
    }
}

/// Converges the speaker's advertised routes to the platform topology.
pub struct Reconciler {
    collector: TopologyCollector,
    publisher: Arc<dyn RoutePublisher>,
    store: Mutex<RouteStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler starting from `store`.
    pub fn new(
        collector: TopologyCollector,
        publisher: Arc<dyn RoutePublisher>,
        store: RouteStore,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            collector,
            publisher,
            store: Mutex::new(store),
            config,
        }
    }

    /// Keys currently recorded as published.
    pub async fn advertised(&self) -> Vec<RouteKey> {
        self.store.lock().await.keys().copied().collect()
    }

    /// Runs one complete pass.
    ///
    /// Returns an error only if collection failed; in that case the store
    /// and the speaker are left untouched.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PassReport> {
        let mut store = self.store.lock().await;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let candidates = bounded(
            self.config.collect_timeout,
            "topology collection",
            self.collector.collect(),
        )
        .await?;
        let desired = DesiredSet::from_candidates(candidates);
        debug!(
            desired = desired.len(),
            duplicates = desired.duplicates(),
            published = store.len(),
            "Computed desired routes"
        );

        let mut report = PassReport {
            desired: desired.len(),
            ..Default::default()
        };

        // Withdrawals first so a changed next-hop is never announced twice.
        for advertisement in store.stale(&desired) {
            self.withdraw(&mut store, advertisement, &mut report).await;
        }

        for key in store.missing(&desired) {
            self.publish(&mut store, key, &mut report).await;
        }

        report.unchanged = report.desired - report.published - report.publish_failed;
        Ok(report)
    }

    async fn withdraw(
        &self,
        store: &mut RouteStore,
        advertisement: Advertisement,
        report: &mut PassReport,
    ) {
        let key = advertisement.key;
        let result = bounded(
            self.config.call_timeout,
            "withdraw",
            self.publisher.withdraw(&advertisement.handle),
        )
        .await;

        match result {
            Ok(()) => {
                store.remove(&key);
                report.withdrawn += 1;
                info!(prefix = %key.prefix(), nexthop = %key.nexthop(), "Stopped advertising {key}");
            }
            Err(e) => {
                store.mark_unconfirmed(&key);
                report.withdraw_failed += 1;
                warn!(
                    prefix = %key.prefix(),
                    nexthop = %key.nexthop(),
                    handle = %advertisement.handle,
                    error = %e,
                    "Failed to withdraw route"
                );
            }
        }
    }

    async fn publish(&self, store: &mut RouteStore, key: RouteKey, report: &mut PassReport) {
        if let Some(previous) = store.get(&key) {
            debug!(
                route = %key,
                handle = %previous.handle,
                "Re-publishing route whose withdrawal was not confirmed"
            );
        }

        let result = bounded(
            self.config.call_timeout,
            "publish",
            self.publisher.publish(key.prefix(), key.nexthop()),
        )
        .await;

        match result {
            Ok(handle) => {
                debug!(route = %key, handle = %handle, "Route accepted by speaker");
                store.insert(Advertisement::new(key, handle));
                report.published += 1;
                info!(prefix = %key.prefix(), nexthop = %key.nexthop(), "Started advertising {key}");
            }
            Err(e) => {
                report.publish_failed += 1;
                warn!(
                    prefix = %key.prefix(),
                    nexthop = %key.nexthop(),
                    error = %e,
                    "Failed to publish route"
                );
            }
        }
    }
}
