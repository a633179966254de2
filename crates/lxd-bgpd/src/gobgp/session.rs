//! BGP session bootstrap
//!
//! Configures the global speaker and its peers once at startup. GoBGP runs
//! as a separate daemon and may outlive us; a server left running by a
//! previous instance still holds that instance's paths, which the new (empty)
//! route store knows nothing about. Such a server is stopped and started
//! again so the daemon always begins from an empty RIB. Any failure here is
//! fatal for the daemon.

use super::api::{
    method, AddPeerRequest, AfiSafi, AfiSafiConfig, EbgpMultihop, Family, GetBgpRequest,
    GetBgpResponse, Global, GracefulRestart, MpGracefulRestart, MpGracefulRestartConfig, Peer,
    PeerConf, StartBgpRequest, StopBgpRequest,
};
use super::client::GobgpClient;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use lxd_bgp_types::{AddressFamily, IpAddress};
use std::net::Ipv4Addr;
use tonic::Status;
use tracing::{debug, info, warn};

/// GoBGP's answer to AddPeer for a neighbor it already has.
const PEER_EXISTS: &str = "can't overwrite the existing peer";

/// Listen port telling GoBGP not to accept inbound sessions.
pub const NO_LISTEN_PORT: i32 = -1;

/// Speaker management calls used during bootstrap.
#[async_trait]
pub trait SpeakerControl: Send + Sync {
    /// Global configuration of a started server, `None` if not started.
    async fn running_global(&self) -> std::result::Result<Option<Global>, Status>;
    async fn stop_bgp(&self) -> std::result::Result<(), Status>;
    async fn start_bgp(&self, request: StartBgpRequest) -> std::result::Result<(), Status>;
    async fn add_peer(&self, request: AddPeerRequest) -> std::result::Result<(), Status>;
}

#[async_trait]
impl SpeakerControl for GobgpClient {
    async fn running_global(&self) -> std::result::Result<Option<Global>, Status> {
        let response: GetBgpResponse = self.unary(method::GET_BGP, GetBgpRequest {}).await?;
        // An unstarted server reports an all-zero global config.
        Ok(response.global.filter(|global| global.asn != 0))
    }

    async fn stop_bgp(&self) -> std::result::Result<(), Status> {
        self.unary::<_, ()>(method::STOP_BGP, StopBgpRequest {}).await
    }

    async fn start_bgp(&self, request: StartBgpRequest) -> std::result::Result<(), Status> {
        self.unary::<_, ()>(method::START_BGP, request).await
    }

    async fn add_peer(&self, request: AddPeerRequest) -> std::result::Result<(), Status> {
        self.unary::<_, ()>(method::ADD_PEER, request).await
    }
}

/// A BGP neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgpPeer {
    pub address: IpAddress,
    pub asn: u32,
}

/// Process-wide speaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpSession {
    pub router_id: Ipv4Addr,
    pub local_asn: u32,
    pub peers: Vec<BgpPeer>,
    /// Shared TCP-MD5 password for every peer
    pub auth_password: Option<String>,
    pub listen_port: i32,
    /// eBGP multihop TTL; `None` leaves multihop disabled
    pub ebgp_multihop_ttl: Option<u32>,
    /// Graceful restart time in seconds; `None` leaves it disabled
    pub graceful_restart_time: Option<u32>,
}

impl BgpSession {
    pub fn new(router_id: Ipv4Addr, local_asn: u32, peers: Vec<BgpPeer>) -> Self {
        Self {
            router_id,
            local_asn,
            peers,
            auth_password: None,
            listen_port: NO_LISTEN_PORT,
            ebgp_multihop_ttl: None,
            graceful_restart_time: None,
        }
    }

    pub(crate) fn start_request(&self) -> StartBgpRequest {
        StartBgpRequest {
            global: Some(Global {
                asn: self.local_asn,
                router_id: self.router_id.to_string(),
                listen_port: self.listen_port,
                listen_addresses: Vec::new(),
            }),
        }
    }

    pub(crate) fn peer_request(&self, peer: &BgpPeer) -> AddPeerRequest {
        let graceful = self.graceful_restart_time.is_some();
        let afi_safis = AddressFamily::ALL
            .into_iter()
            .map(|family| AfiSafi {
                mp_graceful_restart: graceful.then(|| MpGracefulRestart {
                    config: Some(MpGracefulRestartConfig { enabled: true }),
                }),
                config: Some(AfiSafiConfig {
                    family: Some(Family::unicast(family)),
                    enabled: true,
                }),
            })
            .collect();

        AddPeerRequest {
            peer: Some(Peer {
                conf: Some(PeerConf {
                    auth_password: self.auth_password.clone().unwrap_or_default(),
                    neighbor_address: peer.address.to_string(),
                    peer_asn: peer.asn,
                }),
                ebgp_multihop: self.ebgp_multihop_ttl.map(|ttl| EbgpMultihop {
                    enabled: true,
                    multihop_ttl: ttl,
                }),
                graceful_restart: self.graceful_restart_time.map(|restart_time| GracefulRestart {
                    enabled: true,
                    restart_time,
                }),
                afi_safis,
            }),
        }
    }

    /// Starts the speaker from a clean state and adds every peer.
    pub async fn start<C>(&self, speaker: &C) -> Result<()>
    where
        C: SpeakerControl + ?Sized,
    {
        match speaker.running_global().await {
            Ok(Some(previous)) => {
                warn!(
                    asn = previous.asn,
                    router_id = %previous.router_id,
                    "GoBGP already running, restarting it to drop stale paths and peers"
                );
                speaker.stop_bgp().await.map_err(|status| {
                    SyncError::speaker(format!("StopBgp failed: {}", status.message()))
                })?;
            }
            Ok(None) => {}
            Err(status) => {
                debug!(error = %status.message(), "GetBgp failed, assuming GoBGP is not started");
            }
        }

        speaker
            .start_bgp(self.start_request())
            .await
            .map_err(|status| SyncError::speaker(format!("StartBgp failed: {}", status.message())))?;
        info!(
            router_id = %self.router_id,
            asn = self.local_asn,
            "BGP speaker started"
        );

        for peer in &self.peers {
            match speaker.add_peer(self.peer_request(peer)).await {
                Ok(()) => info!(peer = %peer.address, asn = peer.asn, "Added BGP peer"),
                Err(status) if status.message().contains(PEER_EXISTS) => {
                    info!(peer = %peer.address, "BGP peer already configured");
                }
                Err(status) => {
                    return Err(SyncError::speaker(format!(
                        "AddPeer {} failed: {}",
                        peer.address,
                        status.message()
                    )));
                }
            }
        }

        Ok(())
    }
}
