//! Topology collector
//!
//! Walks the topology reachable from the configured uplinks and produces
//! candidate (prefix, next-hop) pairs. The traversal policy depends on the
//! uplink's management mode and is chosen once per uplink:
//!
//! - [`ManagedStrategy`]: follows the `used_by` relations of the uplink to its
//!   downstream networks and their instances.
//! - [`UnmanagedStrategy`]: enumerates every project and instance and reads
//!   free-form route annotations from devices.
//!
//! Per-entity failures (missing network or instance, unparseable CIDR) are
//! logged and skip that entity. Errors that mean the platform cannot be read
//! at all abort the whole collection, and so does any uplink lookup failure
//! other than the uplink not existing.

mod managed;
mod unmanaged;

pub use managed::ManagedStrategy;
pub use unmanaged::UnmanagedStrategy;

use crate::error::{Result, SyncError};
use crate::platform::PlatformQuery;
use crate::topology::{Instance, Network, DEFAULT_PROJECT};
use async_trait::async_trait;
use lxd_bgp_types::{IpAddress, IpPrefix, RouteKey};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Where a candidate route was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    /// Subnet of a managed downstream network
    Subnet { project: String, network: String },
    /// `routes.external` of a NIC on a managed downstream network
    InstanceRoute {
        project: String,
        instance: String,
        device: String,
    },
    /// Free-form annotation on a device
    Annotation {
        project: String,
        instance: String,
        device: String,
    },
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Subnet { project, network } => {
                write!(f, "network {project}/{network}")
            }
            CandidateSource::InstanceRoute {
                project,
                instance,
                device,
            } => write!(f, "instance {project}/{instance} device {device}"),
            CandidateSource::Annotation {
                project,
                instance,
                device,
            } => write!(f, "annotation on {project}/{instance} device {device}"),
        }
    }
}

/// A (prefix, next-hop) pair produced by the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub prefix: IpPrefix,
    pub nexthop: IpAddress,
    pub source: CandidateSource,
}

impl RouteCandidate {
    pub fn new(prefix: IpPrefix, nexthop: IpAddress, source: CandidateSource) -> Self {
        Self {
            prefix,
            nexthop,
            source,
        }
    }

    /// Canonical identity of this candidate.
    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.prefix, self.nexthop)
    }
}

/// What a traversal strategy can see while walking the topology.
pub struct CollectContext<'a> {
    pub platform: &'a dyn PlatformQuery,
    /// Local host identifier used for the instance location filter
    pub server_name: &'a str,
}

impl CollectContext<'_> {
    /// Returns true if the instance's routes belong to this host, logging why not.
    pub fn accepts(&self, instance: &Instance) -> bool {
        if !instance.is_local_to(self.server_name) {
            debug!(
                instance = %instance.name,
                location = %instance.location,
                "Skipping instance located on another host"
            );
            return false;
        }
        if !instance.is_running() {
            debug!(
                instance = %instance.name,
                status_code = instance.status_code,
                "Skipping instance that is not running"
            );
            return false;
        }
        true
    }
}

/// A policy for deriving route candidates from one uplink network.
#[async_trait]
pub trait TraversalStrategy: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Appends every candidate reachable from `uplink` to `out`.
    ///
    /// Returns an error only when the traversal cannot proceed at all.
    async fn collect(
        &self,
        uplink: &Network,
        ctx: &CollectContext<'_>,
        out: &mut Vec<RouteCandidate>,
    ) -> Result<()>;
}

/// Decides whether an entity lookup failure skips the entity or aborts.
pub(crate) fn skip_entity(error: SyncError, entity: &str) -> Result<()> {
    if error.aborts_pass() {
        return Err(error);
    }
    warn!(entity = %entity, error = %error, "Skipping entity");
    Ok(())
}

/// Collects route candidates for all configured uplinks.
pub struct TopologyCollector {
    platform: Arc<dyn PlatformQuery>,
    uplinks: Vec<String>,
    server_name: String,
    managed: ManagedStrategy,
    unmanaged: UnmanagedStrategy,
}

impl TopologyCollector {
    /// Create a collector using the default route annotation key
    pub fn new(
        platform: Arc<dyn PlatformQuery>,
        uplinks: Vec<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            uplinks,
            server_name: server_name.into(),
            managed: ManagedStrategy::new(),
            unmanaged: UnmanagedStrategy::default(),
        }
    }

    /// Use a different device key for unmanaged route annotations
    pub fn with_annotation_key(mut self, key: impl Into<String>) -> Self {
        self.unmanaged = UnmanagedStrategy::new(key);
        self
    }

    /// Selects the traversal strategy for an uplink.
    pub fn strategy_for(&self, uplink: &Network) -> &dyn TraversalStrategy {
        if uplink.managed {
            &self.managed
        } else {
            &self.unmanaged
        }
    }

    /// Runs one full collection over every uplink.
    #[instrument(skip(self), fields(uplinks = self.uplinks.len()))]
    pub async fn collect(&self) -> Result<Vec<RouteCandidate>> {
        let ctx = CollectContext {
            platform: self.platform.as_ref(),
            server_name: &self.server_name,
        };
        let mut candidates = Vec::new();

        for name in &self.uplinks {
            // A missing uplink is configuration drift; any other failure means
            // the uplinks cannot be read and the pass must not act on a partial view.
            let uplink = match self.platform.get_network(DEFAULT_PROJECT, name).await {
                Ok(uplink) => uplink,
                Err(e) if e.is_not_found() => {
                    warn!(uplink = %name, "Skipping uplink that does not exist");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let strategy = self.strategy_for(&uplink);
            let before = candidates.len();
            strategy.collect(&uplink, &ctx, &mut candidates).await?;
            debug!(
                uplink = %name,
                strategy = strategy.name(),
                candidates = candidates.len() - before,
                "Collected uplink"
            );
        }

        Ok(candidates)
    }
}
