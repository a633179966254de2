//! Shared fakes for lxd-bgpd integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lxd_bgp_types::{IpAddress, IpPrefix, RouteKey};
use lxd_bgpd::topology::{Device, Instance, Network, STATUS_RUNNING};
use lxd_bgpd::{
    PlatformQuery, Reconciler, ReconcilerConfig, Result, RouteHandle, RoutePublisher, RouteStore,
    SyncError, TopologyCollector,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const HOST: &str = "host-a";

/// In-memory LXD topology.
#[derive(Default)]
pub struct FakePlatform {
    networks: Mutex<BTreeMap<(String, String), Network>>,
    instances: Mutex<BTreeMap<(String, String), Instance>>,
    unreachable: AtomicBool,
    delay: Mutex<Option<Duration>>,
    failing_networks: Mutex<HashMap<(String, String), u16>>,
    network_queried: Notify,
    pub get_network_calls: AtomicUsize,
    pub get_instance_calls: AtomicUsize,
    pub list_projects_calls: AtomicUsize,
    pub list_instances_calls: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_network(&self, project: &str, network: Network) {
        self.networks
            .lock()
            .unwrap()
            .insert((project.to_string(), network.name.clone()), network);
    }

    pub fn remove_network(&self, project: &str, name: &str) {
        self.networks
            .lock()
            .unwrap()
            .remove(&(project.to_string(), name.to_string()));
    }

    pub fn put_instance(&self, project: &str, mut instance: Instance) {
        instance.project = project.to_string();
        self.instances
            .lock()
            .unwrap()
            .insert((project.to_string(), instance.name.clone()), instance);
    }

    pub fn update_network(&self, project: &str, name: &str, f: impl FnOnce(&mut Network)) {
        let mut networks = self.networks.lock().unwrap();
        let network = networks
            .get_mut(&(project.to_string(), name.to_string()))
            .expect("network exists");
        f(network);
    }

    pub fn update_instance(&self, project: &str, name: &str, f: impl FnOnce(&mut Instance)) {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(&(project.to_string(), name.to_string()))
            .expect("instance exists");
        f(instance);
    }

    /// Makes every query fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delays every query.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Makes lookups of one network fail with an API error carrying `code`.
    pub fn fail_network(&self, project: &str, name: &str, code: Option<u16>) {
        let mut failing = self.failing_networks.lock().unwrap();
        let id = (project.to_string(), name.to_string());
        match code {
            Some(code) => failing.insert(id, code),
            None => failing.remove(&id),
        };
    }

    /// Resolves once a network lookup has been answered.
    pub async fn network_queried(&self) {
        self.network_queried.notified().await;
    }

    async fn lookup_network(&self, project: &str, name: &str) -> Result<Network> {
        self.enter("get_network").await?;
        let id = (project.to_string(), name.to_string());
        let failing = self.failing_networks.lock().unwrap().get(&id).copied();
        if let Some(code) = failing {
            return Err(SyncError::api("get_network", code, "database is locked"));
        }
        self.networks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("network {project}/{name}")))
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport(operation, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformQuery for FakePlatform {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network> {
        self.get_network_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.lookup_network(project, name).await;
        self.network_queried.notify_one();
        result
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        self.list_projects_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("list_projects").await?;
        let mut projects: Vec<String> = self
            .instances
            .lock()
            .unwrap()
            .keys()
            .map(|(project, _)| project.clone())
            .collect();
        projects.push("default".to_string());
        projects.sort();
        projects.dedup();
        Ok(projects)
    }

    async fn list_instances(&self, project: &str) -> Result<Vec<Instance>> {
        self.list_instances_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("list_instances").await?;
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|((p, _), _)| p == project)
            .map(|(_, instance)| instance.clone())
            .collect())
    }

    async fn get_instance(&self, project: &str, name: &str) -> Result<Instance> {
        self.get_instance_calls.fetch_add(1, Ordering::SeqCst);
        self.enter("get_instance").await?;
        self.instances
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("instance {project}/{name}")))
    }
}

/// A call observed by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish(RouteKey),
    Withdraw(RouteKey),
}

/// Publisher that records calls and can be told to fail.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<Call>>,
    live: Mutex<BTreeMap<RouteHandle, RouteKey>>,
    issued: Mutex<BTreeMap<RouteHandle, RouteKey>>,
    next_handle: AtomicUsize,
    publish_delay: Mutex<Option<Duration>>,
    withdraw_delay: Mutex<Option<Duration>>,
    failing_publish: Mutex<HashSet<RouteKey>>,
    failing_withdraw: Mutex<HashSet<RouteKey>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns and forgets the recorded calls.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Routes the speaker currently holds.
    pub fn live(&self) -> Vec<RouteKey> {
        let mut keys: Vec<RouteKey> = self.live.lock().unwrap().values().copied().collect();
        keys.sort();
        keys
    }

    pub fn fail_publish(&self, key: RouteKey, fail: bool) {
        let mut failing = self.failing_publish.lock().unwrap();
        if fail {
            failing.insert(key);
        } else {
            failing.remove(&key);
        }
    }

    /// Delays every publish call before the speaker applies it.
    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        *self.publish_delay.lock().unwrap() = delay;
    }

    /// Delays the answer to every withdraw call the speaker already applied.
    pub fn set_withdraw_delay(&self, delay: Option<Duration>) {
        *self.withdraw_delay.lock().unwrap() = delay;
    }

    pub fn fail_withdraw(&self, key: RouteKey, fail: bool) {
        let mut failing = self.failing_withdraw.lock().unwrap();
        if fail {
            failing.insert(key);
        } else {
            failing.remove(&key);
        }
    }
}

#[async_trait]
impl RoutePublisher for RecordingPublisher {
    async fn publish(&self, prefix: &IpPrefix, nexthop: &IpAddress) -> Result<RouteHandle> {
        let key = RouteKey::new(*prefix, *nexthop);
        self.calls.lock().unwrap().push(Call::Publish(key));
        let delay = *self.publish_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_publish.lock().unwrap().contains(&key) {
            return Err(SyncError::publisher("publish", "rejected by speaker"));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) as u64;
        let handle = RouteHandle::new(id.to_be_bytes().to_vec());
        self.issued.lock().unwrap().insert(handle.clone(), key);
        let mut live = self.live.lock().unwrap();
        // One path per prefix and next-hop, like the speaker's RIB.
        live.retain(|_, live_key| *live_key != key);
        live.insert(handle.clone(), key);
        Ok(handle)
    }

    async fn withdraw(&self, handle: &RouteHandle) -> Result<()> {
        let key = self
            .issued
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .ok_or_else(|| SyncError::publisher("withdraw", "unknown handle"))?;
        self.calls.lock().unwrap().push(Call::Withdraw(key));
        if self.failing_withdraw.lock().unwrap().contains(&key) {
            return Err(SyncError::publisher("withdraw", "speaker unavailable"));
        }
        // A path that is already gone counts as withdrawn.
        self.live.lock().unwrap().remove(handle);
        let delay = *self.withdraw_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

pub fn key(prefix: &str, nexthop: &str) -> RouteKey {
    RouteKey::new(prefix.parse().unwrap(), nexthop.parse().unwrap())
}

fn config(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A managed uplink listing `downstream` networks of the default project in `used_by`.
pub fn managed_uplink(name: &str, downstream: &[&str]) -> Network {
    Network {
        name: name.to_string(),
        managed: true,
        network_type: "physical".to_string(),
        used_by: downstream
            .iter()
            .map(|n| format!("/1.0/networks/{n}"))
            .collect(),
        ..Default::default()
    }
}

/// An unmanaged uplink.
pub fn unmanaged_uplink(name: &str) -> Network {
    Network {
        name: name.to_string(),
        managed: false,
        network_type: "bridge".to_string(),
        ..Default::default()
    }
}

/// A managed downstream network with config entries and attached instances.
pub fn downstream(name: &str, entries: &[(&str, &str)], instances: &[&str]) -> Network {
    Network {
        name: name.to_string(),
        managed: true,
        network_type: "ovn".to_string(),
        config: config(entries),
        used_by: instances
            .iter()
            .map(|i| format!("/1.0/instances/{i}"))
            .collect(),
    }
}

/// A running instance located on `location` with the given devices.
pub fn instance(name: &str, location: &str, devices: Vec<(&str, Device)>) -> Instance {
    Instance {
        name: name.to_string(),
        project: String::new(),
        location: location.to_string(),
        status_code: STATUS_RUNNING,
        expanded_devices: devices
            .into_iter()
            .map(|(n, d)| (n.to_string(), d))
            .collect(),
    }
}

/// A NIC on `network` declaring IPv4 external routes.
pub fn nic_v4_routes(network: &str, routes: &str) -> Device {
    Device::from([
        ("type", "nic"),
        ("network", network),
        ("ipv4.routes.external", routes),
    ])
}

/// A NIC on `network` declaring IPv6 external routes.
pub fn nic_v6_routes(network: &str, routes: &str) -> Device {
    Device::from([
        ("type", "nic"),
        ("network", network),
        ("ipv6.routes.external", routes),
    ])
}

pub fn reconciler(
    platform: Arc<FakePlatform>,
    publisher: Arc<RecordingPublisher>,
    uplinks: &[&str],
) -> Reconciler {
    reconciler_with(platform, publisher, uplinks, ReconcilerConfig {
        settle_delay: Duration::ZERO,
        ..Default::default()
    })
}

pub fn reconciler_with(
    platform: Arc<FakePlatform>,
    publisher: Arc<RecordingPublisher>,
    uplinks: &[&str],
    config: ReconcilerConfig,
) -> Reconciler {
    let collector = TopologyCollector::new(
        platform,
        uplinks.iter().map(|u| u.to_string()).collect(),
        HOST,
    );
    Reconciler::new(collector, publisher, RouteStore::new(), config)
}
