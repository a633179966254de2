//! Topology records read from the platform
//!
//! These mirror the subset of the LXD REST objects the collector needs. They
//! are re-queried every pass and never cached or mutated by the daemon.

use lxd_bgp_types::AddressFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project used when a locator carries no `project` qualifier.
pub const DEFAULT_PROJECT: &str = "default";

/// Instance location meaning "not pinned to a cluster member".
pub const LOCATION_ANY: &str = "none";

/// Subnet value that disables addressing for a family.
pub const SUBNET_DISABLED: &str = "none";

/// LXD status code of a running instance.
pub const STATUS_RUNNING: i32 = 103;

/// Device type of network interfaces.
pub const NIC_DEVICE_TYPE: &str = "nic";

/// Default device key holding free-form `prefix_nexthop` route annotations.
pub const DEFAULT_ROUTE_ANNOTATION_KEY: &str = "user.bgp.routes";

/// Returns true for LXD boolean config values.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// A network as returned by `GET /1.0/networks/<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub managed: bool,
    #[serde(default, rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub used_by: Vec<String>,
}

impl Network {
    /// Create an unmanaged network with no configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Raw value of a config key
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Configured subnet of a family, if addressing is enabled.
    ///
    /// Returns `None` for a missing key, an empty value or the `none` sentinel.
    pub fn subnet(&self, family: AddressFamily) -> Option<&str> {
        self.config_value(&format!("{}.address", family.as_str()))
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != SUBNET_DISABLED)
    }

    /// Returns true if NAT is enabled for a family.
    pub fn nat_enabled(&self, family: AddressFamily) -> bool {
        self.config_value(&format!("{}.nat", family.as_str()))
            .is_some_and(is_truthy)
    }

    /// Subnet of a family that should be exported: configured and not NATed.
    pub fn exported_subnet(&self, family: AddressFamily) -> Option<&str> {
        if self.nat_enabled(family) {
            return None;
        }
        self.subnet(family)
    }

    /// The network's address on its uplink, used as next-hop for its routes.
    pub fn tracked_nexthop(&self, family: AddressFamily) -> Option<&str> {
        self.config_value(&format!("volatile.network.{}.address", family.as_str()))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// A device of an instance. LXD represents devices as flat string maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(pub BTreeMap<String, String>);

impl Device {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn device_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Name of the network a NIC is attached to
    pub fn network(&self) -> Option<&str> {
        self.get("network")
    }

    /// Returns true if this is a NIC attached to `network`.
    pub fn is_nic_on(&self, network: &str) -> bool {
        self.device_type() == Some(NIC_DEVICE_TYPE) && self.network() == Some(network)
    }

    /// Prefixes listed in `<family>.routes.external`, trimmed, empty items dropped.
    pub fn external_routes(&self, family: AddressFamily) -> Vec<&str> {
        self.get(&format!("{}.routes.external", family.as_str()))
            .map(split_list)
            .unwrap_or_default()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Device {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }
}

/// Splits a comma-separated config value into trimmed, non-empty items.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// An instance as returned by `GET /1.0/instances/<name>` (or with recursion).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status_code: i32,
    #[serde(default)]
    pub expanded_devices: BTreeMap<String, Device>,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.status_code == STATUS_RUNNING
    }

    /// Returns true if the instance runs on `server_name` or is not pinned.
    pub fn is_local_to(&self, server_name: &str) -> bool {
        self.location == server_name || self.location == LOCATION_ANY
    }
}
