//! Subset of the GoBGP v3 `apipb` protobuf API.
//!
//! Field tags follow `gobgp.proto` and `attribute.proto`. Only the messages
//! and fields the daemon sends or reads are declared; unknown fields in
//! responses are skipped by prost.

use lxd_bgp_types::{AddressFamily, IpAddress, IpPrefix};
use prost::Message;
use prost_types::Any;

/// gRPC method paths of `apipb.GobgpApi`.
pub mod method {
    pub const START_BGP: &str = "/apipb.GobgpApi/StartBgp";
    pub const STOP_BGP: &str = "/apipb.GobgpApi/StopBgp";
    pub const GET_BGP: &str = "/apipb.GobgpApi/GetBgp";
    pub const ADD_PEER: &str = "/apipb.GobgpApi/AddPeer";
    pub const ADD_PATH: &str = "/apipb.GobgpApi/AddPath";
    pub const DELETE_PATH: &str = "/apipb.GobgpApi/DeletePath";
}

const TYPE_URL_PREFIX: &str = "type.googleapis.com/apipb.";

/// `Family.Afi`
pub mod afi {
    pub const IP: i32 = 1;
    pub const IP6: i32 = 2;
}

/// `Family.Safi`
pub mod safi {
    pub const UNICAST: i32 = 1;
}

/// `TableType.GLOBAL`
pub const TABLE_TYPE_GLOBAL: i32 = 0;

/// ORIGIN attribute value IGP
pub const ORIGIN_IGP: u32 = 0;

#[derive(Clone, PartialEq, Message)]
pub struct Family {
    #[prost(int32, tag = "1")]
    pub afi: i32,
    #[prost(int32, tag = "2")]
    pub safi: i32,
}

impl Family {
    /// Unicast family of an address family.
    pub fn unicast(family: AddressFamily) -> Self {
        let afi = match family {
            AddressFamily::Ipv4 => afi::IP,
            AddressFamily::Ipv6 => afi::IP6,
        };
        Self {
            afi,
            safi: safi::UNICAST,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Global {
    #[prost(uint32, tag = "1")]
    pub asn: u32,
    #[prost(string, tag = "2")]
    pub router_id: String,
    #[prost(int32, tag = "3")]
    pub listen_port: i32,
    #[prost(string, repeated, tag = "4")]
    pub listen_addresses: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartBgpRequest {
    #[prost(message, optional, tag = "1")]
    pub global: Option<Global>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StopBgpRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetBgpRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetBgpResponse {
    #[prost(message, optional, tag = "1")]
    pub global: Option<Global>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PeerConf {
    #[prost(string, tag = "1")]
    pub auth_password: String,
    #[prost(string, tag = "4")]
    pub neighbor_address: String,
    #[prost(uint32, tag = "5")]
    pub peer_asn: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct EbgpMultihop {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub multihop_ttl: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GracefulRestart {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint32, tag = "2")]
    pub restart_time: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct MpGracefulRestartConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct MpGracefulRestart {
    #[prost(message, optional, tag = "1")]
    pub config: Option<MpGracefulRestartConfig>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AfiSafiConfig {
    #[prost(message, optional, tag = "1")]
    pub family: Option<Family>,
    #[prost(bool, tag = "2")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct AfiSafi {
    #[prost(message, optional, tag = "1")]
    pub mp_graceful_restart: Option<MpGracefulRestart>,
    #[prost(message, optional, tag = "2")]
    pub config: Option<AfiSafiConfig>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Peer {
    #[prost(message, optional, tag = "2")]
    pub conf: Option<PeerConf>,
    #[prost(message, optional, tag = "3")]
    pub ebgp_multihop: Option<EbgpMultihop>,
    #[prost(message, optional, tag = "9")]
    pub graceful_restart: Option<GracefulRestart>,
    #[prost(message, repeated, tag = "10")]
    pub afi_safis: Vec<AfiSafi>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddPeerRequest {
    #[prost(message, optional, tag = "1")]
    pub peer: Option<Peer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Path {
    #[prost(message, optional, tag = "1")]
    pub nlri: Option<Any>,
    #[prost(message, repeated, tag = "2")]
    pub pattrs: Vec<Any>,
    #[prost(message, optional, tag = "9")]
    pub family: Option<Family>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddPathRequest {
    #[prost(int32, tag = "1")]
    pub table_type: i32,
    #[prost(string, tag = "2")]
    pub vrf_id: String,
    #[prost(message, optional, tag = "3")]
    pub path: Option<Path>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddPathResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeletePathRequest {
    #[prost(int32, tag = "1")]
    pub table_type: i32,
    #[prost(string, tag = "2")]
    pub vrf_id: String,
    #[prost(message, optional, tag = "3")]
    pub family: Option<Family>,
    #[prost(message, optional, tag = "4")]
    pub path: Option<Path>,
    #[prost(bytes = "vec", tag = "5")]
    pub uuid: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct IpAddressPrefix {
    #[prost(uint32, tag = "1")]
    pub prefix_len: u32,
    #[prost(string, tag = "2")]
    pub prefix: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct OriginAttribute {
    #[prost(uint32, tag = "1")]
    pub origin: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct NextHopAttribute {
    #[prost(string, tag = "1")]
    pub next_hop: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MpReachNlriAttribute {
    #[prost(message, optional, tag = "1")]
    pub family: Option<Family>,
    #[prost(string, repeated, tag = "2")]
    pub next_hops: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub nlris: Vec<Any>,
}

/// Wraps a message in `Any` with its `apipb` type URL.
fn pack<M: Message>(type_name: &str, message: &M) -> Any {
    Any {
        type_url: format!("{TYPE_URL_PREFIX}{type_name}"),
        value: message.encode_to_vec(),
    }
}

/// Builds the unicast path announcing `prefix` via `nexthop`.
///
/// IPv4 carries the next-hop in NEXT_HOP; IPv6 needs MP_REACH_NLRI.
pub fn unicast_path(prefix: &IpPrefix, nexthop: &IpAddress) -> Path {
    let family = Family::unicast(prefix.family());
    let nlri = pack(
        "IPAddressPrefix",
        &IpAddressPrefix {
            prefix_len: u32::from(prefix.prefix_len()),
            prefix: prefix.address().to_string(),
        },
    );
    let origin = pack("OriginAttribute", &OriginAttribute { origin: ORIGIN_IGP });

    let next_hop = match prefix.family() {
        AddressFamily::Ipv4 => pack(
            "NextHopAttribute",
            &NextHopAttribute {
                next_hop: nexthop.to_string(),
            },
        ),
        AddressFamily::Ipv6 => pack(
            "MpReachNLRIAttribute",
            &MpReachNlriAttribute {
                family: Some(family.clone()),
                next_hops: vec![nexthop.to_string()],
                nlris: vec![nlri.clone()],
            },
        ),
    };

    Path {
        nlri: Some(nlri),
        pattrs: vec![origin, next_hop],
        family: Some(family),
    }
}
