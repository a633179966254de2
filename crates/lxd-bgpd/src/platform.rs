//! Read-only query surface of the compute platform.
//!
//! The collector only ever reads topology through this trait, so a pass can
//! be driven against the LXD adapter in production and against in-memory
//! fakes in tests.

use crate::error::Result;
use crate::topology::{Instance, Network};
use async_trait::async_trait;

/// Hierarchical lookup of networks, projects and instances.
///
/// # Example
///
/// ```ignore
/// use lxd_bgpd::{PlatformQuery, Network, Instance, Result};
///
/// struct StaticPlatform { uplink: Network }
///
/// #[async_trait]
/// impl PlatformQuery for StaticPlatform {
///     async fn get_network(&self, _project: &str, _name: &str) -> Result<Network> {
///         Ok(self.uplink.clone())
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait PlatformQuery: Send + Sync {
    /// Fetches a network by project and name.
    ///
    /// Returns [`SyncError::NotFound`](crate::SyncError::NotFound) if it
    /// does not exist.
    async fn get_network(&self, project: &str, name: &str) -> Result<Network>;

    /// Lists the names of all projects.
    async fn list_projects(&self) -> Result<Vec<String>>;

    /// Lists all instances of a project with their expanded devices.
    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>>;

    /// Fetches an instance by project and name.
    async fn get_instance(&self, project: &str, name: &str) -> Result<Instance>;
}
