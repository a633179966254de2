//! Common lxd-bgp types for route synchronization.
//!
//! This crate provides type-safe representations of the network primitives
//! the reconciliation engine compares across passes:
//!
//! - [`IpAddress`]: IPv4 and IPv6 next-hop addresses
//! - [`IpPrefix`]: canonical IP network prefixes (CIDR notation, host bits masked)
//! - [`AddressFamily`]: IPv4/IPv6 discrimination and config-key fragments
//! - [`RouteKey`]: the identity of an advertised route (prefix + next-hop)

mod ip;
mod route;

pub use ip::{AddressFamily, IpAddress, IpPrefix};
pub use route::RouteKey;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),
}
