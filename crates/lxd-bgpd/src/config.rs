//! Configuration file support for lxd-bgp
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/lxd-bgp/lxd-bgp.conf

use crate::error::{Result, SyncError};
use crate::gobgp::{BgpSession, DEFAULT_ENDPOINT, NO_LISTEN_PORT};
use crate::lxd::DEFAULT_SOCKET_PATH;
use crate::reconciler::ReconcilerConfig;
use crate::scheduler::DEFAULT_QUEUE_DEPTH;
use crate::topology::DEFAULT_ROUTE_ANNOTATION_KEY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lxd-bgp/lxd-bgp.conf";

/// LXD connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LxdConfig {
    /// Path of the LXD unix socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Timeout of a single REST request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between event stream reconnect attempts in seconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
}

/// GoBGP connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GobgpConfig {
    /// gRPC endpoint of the GoBGP daemon
    #[serde(default = "default_gobgp_endpoint")]
    pub endpoint: String,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout of a single API call in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

/// Reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay before collecting, letting LXD settle after a change
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Abort a pass whose topology collection takes longer than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_timeout_secs: Option<u64>,

    /// Device key holding `prefix_nexthop` annotations on unmanaged uplinks
    #[serde(default = "default_route_annotation_key")]
    pub route_annotation_key: String,

    /// Host identifier for the instance location filter (default: hostname)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Capacity of the pass trigger queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// BGP session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpConfig {
    /// Listen port; -1 disables inbound sessions
    #[serde(default = "default_listen_port")]
    pub listen_port: i32,

    /// eBGP multihop TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebgp_multihop_ttl: Option<u32>,

    /// Enable graceful restart
    #[serde(default)]
    pub graceful_restart: bool,

    /// Graceful restart time in seconds
    #[serde(default = "default_restart_time")]
    pub restart_time_secs: u32,
}

/// Complete lxd-bgp configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub lxd: LxdConfig,

    #[serde(default)]
    pub gobgp: GobgpConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub bgp: BgpConfig,
}

// Default functions
fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_request_timeout() -> u64 {
    30
}

fn default_reconnect_interval() -> u64 {
    10
}

fn default_gobgp_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_call_timeout() -> u64 {
    10
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_route_annotation_key() -> String {
    DEFAULT_ROUTE_ANNOTATION_KEY.to_string()
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_listen_port() -> i32 {
    NO_LISTEN_PORT
}

fn default_restart_time() -> u32 {
    120
}

impl Default for LxdConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_secs: default_request_timeout(),
            reconnect_interval_secs: default_reconnect_interval(),
        }
    }
}

impl Default for GobgpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gobgp_endpoint(),
            connect_timeout_secs: default_connect_timeout(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            collect_timeout_secs: None,
            route_annotation_key: default_route_annotation_key(),
            server_name: None,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for BgpConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            ebgp_multihop_ttl: None,
            graceful_restart: false,
            restart_time_secs: default_restart_time(),
        }
    }
}

impl BgpConfig {
    /// Applies the tuning to a session built from the command line.
    pub fn apply_to(&self, session: &mut BgpSession) {
        session.listen_port = self.listen_port;
        session.ebgp_multihop_ttl = self.ebgp_multihop_ttl;
        session.graceful_restart_time = self.graceful_restart.then_some(self.restart_time_secs);
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SyncError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse config file: {e}"),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SyncError::Io(e)),
        }
    }

    /// Get LXD request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.lxd.request_timeout_secs)
    }

    /// Get event stream reconnect interval as Duration
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.lxd.reconnect_interval_secs)
    }

    /// Get GoBGP connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.gobgp.connect_timeout_secs)
    }

    /// Get GoBGP call timeout as Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.gobgp.call_timeout_secs)
    }

    /// Timing of reconciliation passes
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            settle_delay: Duration::from_millis(self.sync.settle_delay_ms),
            collect_timeout: self.sync.collect_timeout_secs.map(Duration::from_secs),
            call_timeout: Some(self.call_timeout()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.lxd.socket_path.as_os_str().is_empty() {
            return Err(SyncError::invalid_config("lxd.socket_path", "must not be empty"));
        }

        if self.lxd.request_timeout_secs == 0 {
            return Err(SyncError::invalid_config("lxd.request_timeout_secs", "must be > 0"));
        }

        if self.lxd.reconnect_interval_secs == 0 {
            return Err(SyncError::invalid_config(
                "lxd.reconnect_interval_secs",
                "must be > 0",
            ));
        }

        if self.gobgp.endpoint.trim().is_empty() {
            return Err(SyncError::invalid_config("gobgp.endpoint", "must not be empty"));
        }

        if self.gobgp.call_timeout_secs == 0 {
            return Err(SyncError::invalid_config("gobgp.call_timeout_secs", "must be > 0"));
        }

        if self.sync.collect_timeout_secs == Some(0) {
            return Err(SyncError::invalid_config("sync.collect_timeout_secs", "must be > 0"));
        }

        if self.sync.route_annotation_key.trim().is_empty() {
            return Err(SyncError::invalid_config(
                "sync.route_annotation_key",
                "must not be empty",
            ));
        }

        if self.sync.queue_depth == 0 {
            return Err(SyncError::invalid_config("sync.queue_depth", "must be > 0"));
        }

        if self.bgp.listen_port < -1 || self.bgp.listen_port > i32::from(u16::MAX) {
            return Err(SyncError::invalid_config(
                "bgp.listen_port",
                "must be -1 or a TCP port",
            ));
        }

        if let Some(ttl) = self.bgp.ebgp_multihop_ttl {
            if ttl == 0 || ttl > 255 {
                return Err(SyncError::invalid_config("bgp.ebgp_multihop_ttl", "must be 1-255"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::net::Ipv4Addr;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(
            config.lxd.socket_path,
            PathBuf::from("/var/snap/lxd/common/lxd/unix.socket")
        );
        assert_eq!(config.gobgp.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.sync.route_annotation_key, "user.bgp.routes");
        assert_eq!(config.bgp.listen_port, -1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors() {
        let config = DaemonConfig::default();
        assert_eq!(config.reconnect_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let reconciler = config.reconciler();
        assert_eq!(reconciler.settle_delay, Duration::from_secs(1));
        assert_eq!(reconciler.collect_timeout, None);
        assert_eq!(reconciler.call_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[lxd]
socket_path = "/var/lib/lxd/unix.socket"

[sync]
settle_delay_ms = 250
collect_timeout_secs = 20
server_name = "host-a"

[bgp]
ebgp_multihop_ttl = 4
graceful_restart = true
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.lxd.socket_path, PathBuf::from("/var/lib/lxd/unix.socket"));
        assert_eq!(config.sync.settle_delay_ms, 250);
        assert_eq!(config.sync.server_name.as_deref(), Some("host-a"));
        assert_eq!(
            config.reconciler().collect_timeout,
            Some(Duration::from_secs(20))
        );
        // Unspecified values should use defaults
        assert_eq!(config.lxd.reconnect_interval_secs, 10);
        assert_eq!(config.bgp.restart_time_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string(&DaemonConfig::default()).unwrap();
        assert!(toml_str.contains("socket_path"));
        assert!(!toml_str.contains("server_name"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DaemonConfig::default();
        config.sync.queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.bgp.ebgp_multihop_ttl = Some(300);
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.bgp.listen_port = 70000;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.sync.collect_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load_or_default(dir.path().join("missing.conf")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gobgp]\nendpoint = \"http://[::1]:50051\"").unwrap();

        let config = DaemonConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.gobgp.endpoint, "http://[::1]:50051");
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync\nqueue_depth = ").unwrap();

        let err = DaemonConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { .. }));
    }

    #[test]
    fn test_bgp_tuning_applies_to_session() {
        let mut session = BgpSession::new(Ipv4Addr::new(192, 0, 2, 1), 65001, Vec::new());
        let bgp = BgpConfig {
            listen_port: 179,
            ebgp_multihop_ttl: Some(3),
            graceful_restart: true,
            restart_time_secs: 90,
        };
        bgp.apply_to(&mut session);

        assert_eq!(session.listen_port, 179);
        assert_eq!(session.ebgp_multihop_ttl, Some(3));
        assert_eq!(session.graceful_restart_time, Some(90));

        BgpConfig::default().apply_to(&mut session);
        assert_eq!(session.graceful_restart_time, None);
    }
}
