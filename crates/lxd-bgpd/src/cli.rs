//! Command line interface

use crate::config::{DaemonConfig, DEFAULT_CONFIG_PATH};
use crate::error::{Result, SyncError};
use crate::gobgp::{BgpPeer, BgpSession};
use crate::topology::split_list;
use clap::Parser;
use lxd_bgp_types::IpAddress;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Advertise LXD networks and instance routes over BGP
#[derive(Parser, Debug, Clone)]
#[command(name = "lxd-bgp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Comma-separated uplink network names
    pub uplinks: String,

    /// BGP router identifier (IPv4)
    pub router_id: Ipv4Addr,

    /// Local AS number
    pub local_asn: u32,

    /// Peer AS number, or one per peer address (comma-separated)
    pub peer_asns: String,

    /// Comma-separated peer addresses
    pub peer_addresses: String,

    /// Shared BGP session password
    pub password: Option<String>,

    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// LXD unix socket (overrides the config file)
    #[arg(long)]
    pub lxd_socket: Option<PathBuf>,

    /// GoBGP gRPC endpoint (overrides the config file)
    #[arg(long)]
    pub gobgp_endpoint: Option<String>,

    /// Host identifier matched against instance locations (default: hostname)
    #[arg(long)]
    pub server_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Uplink network names.
    pub fn uplinks(&self) -> Result<Vec<String>> {
        let uplinks: Vec<String> = split_list(&self.uplinks)
            .into_iter()
            .map(str::to_string)
            .collect();
        if uplinks.is_empty() {
            return Err(SyncError::invalid_config("uplinks", "at least one uplink is required"));
        }
        Ok(uplinks)
    }

    /// Pairs peer addresses with their AS numbers.
    ///
    /// A single AS number is shared by every peer; otherwise there must be
    /// one per address.
    pub fn peers(&self) -> Result<Vec<BgpPeer>> {
        let addresses = split_list(&self.peer_addresses)
            .into_iter()
            .map(|raw| {
                raw.parse::<IpAddress>()
                    .map_err(|e| SyncError::invalid_config("peer-addresses", e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let asns = split_list(&self.peer_asns)
            .into_iter()
            .map(|raw| {
                raw.parse::<u32>().map_err(|e| {
                    SyncError::invalid_config("peer-asn", format!("invalid AS number '{raw}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if addresses.is_empty() {
            return Err(SyncError::invalid_config(
                "peer-addresses",
                "at least one peer is required",
            ));
        }

        match asns.as_slice() {
            [shared] => Ok(addresses
                .into_iter()
                .map(|address| BgpPeer {
                    address,
                    asn: *shared,
                })
                .collect()),
            _ if asns.len() == addresses.len() => Ok(addresses
                .into_iter()
                .zip(asns)
                .map(|(address, asn)| BgpPeer { address, asn })
                .collect()),
            _ => Err(SyncError::invalid_config(
                "peer-asn",
                format!(
                    "{} AS numbers given for {} peer addresses",
                    asns.len(),
                    addresses.len()
                ),
            )),
        }
    }

    /// BGP session described by the positional arguments.
    pub fn bgp_session(&self) -> Result<BgpSession> {
        let mut session = BgpSession::new(self.router_id, self.local_asn, self.peers()?);
        session.auth_password = self.password.clone().filter(|p| !p.is_empty());
        Ok(session)
    }

    /// Applies command line overrides to the file configuration.
    pub fn apply_overrides(&self, config: &mut DaemonConfig) {
        if let Some(socket) = &self.lxd_socket {
            config.lxd.socket_path = socket.clone();
        }
        if let Some(endpoint) = &self.gobgp_endpoint {
            config.gobgp.endpoint = endpoint.clone();
        }
        if let Some(server_name) = &self.server_name {
            config.sync.server_name = Some(server_name.clone());
        }
    }
}
