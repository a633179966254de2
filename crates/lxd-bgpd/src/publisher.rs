//! Route publisher contract
//!
//! The reconciler hands the speaker only the semantic (prefix, next-hop)
//! tuple. Attribute encoding per address family is the publisher's concern.

use crate::error::Result;
use async_trait::async_trait;
use lxd_bgp_types::{IpAddress, IpPrefix};
use std::fmt;

/// Opaque identifier the speaker assigned to a published route.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteHandle(Vec<u8>);

impl RouteHandle {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteHandle({self})")
    }
}

/// Announces and withdraws routes at the protocol speaker.
///
/// Calls are issued serially by the reconciler.
#[async_trait]
pub trait RoutePublisher: Send + Sync {
    /// Announces `prefix` via `nexthop` and returns the speaker's handle.
    async fn publish(&self, prefix: &IpPrefix, nexthop: &IpAddress) -> Result<RouteHandle>;

    /// Withdraws a route previously returned by [`publish`](Self::publish).
    async fn withdraw(&self, handle: &RouteHandle) -> Result<()>;
}
