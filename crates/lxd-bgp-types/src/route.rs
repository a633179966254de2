//! Route identity.

use crate::{IpAddress, IpPrefix};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an advertised route.
///
/// Two advertisements with equal keys are the same logical route no matter
/// which part of the topology produced them. Both components are stored in
/// normalized form, so textual differences in the source (`10.0.0.1/24` vs
/// `10.0.0.0/24`, `2001:0db8::1` vs `2001:db8::1`) never create distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    prefix: IpPrefix,
    nexthop: IpAddress,
}

impl RouteKey {
    /// Creates a new route key.
    pub const fn new(prefix: IpPrefix, nexthop: IpAddress) -> Self {
        Self { prefix, nexthop }
    }

    /// Returns the advertised prefix.
    pub const fn prefix(&self) -> &IpPrefix {
        &self.prefix
    }

    /// Returns the next-hop address.
    pub const fn nexthop(&self) -> &IpAddress {
        &self.nexthop
    }

    /// Returns true if prefix and next-hop belong to the same address family.
    pub fn is_single_family(&self) -> bool {
        self.prefix.family() == self.nexthop.family()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.prefix, self.nexthop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn key(prefix: &str, nexthop: &str) -> RouteKey {
        RouteKey::new(prefix.parse().unwrap(), nexthop.parse().unwrap())
    }

    #[test]
    fn test_display() {
        assert_eq!(
            key("203.0.113.0/24", "10.0.0.2").to_string(),
            "203.0.113.0/24 via 10.0.0.2"
        );
    }

    #[test]
    fn test_formatting_differences_collapse() {
        assert_eq!(
            key("203.0.113.9/24", "2001:0db8::0001"),
            key("203.0.113.0/24", "2001:db8::1")
        );
    }

    #[test]
    fn test_nexthop_distinguishes_keys() {
        assert_ne!(
            key("203.0.113.0/24", "10.0.0.2"),
            key("203.0.113.0/24", "10.0.0.3")
        );
    }

    #[test]
    fn test_family_check() {
        assert!(key("203.0.113.0/24", "10.0.0.2").is_single_family());
        assert!(!key("203.0.113.0/24", "2001:db8::1").is_single_family());
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let set: BTreeSet<RouteKey> = [
            key("2001:db8::/64", "2001:db8::1"),
            key("10.0.1.0/24", "10.0.0.2"),
            key("10.0.0.0/24", "10.0.0.2"),
        ]
        .into_iter()
        .collect();

        let ordered: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(
            ordered,
            vec![
                "10.0.0.0/24 via 10.0.0.2",
                "10.0.1.0/24 via 10.0.0.2",
                "2001:db8::/64 via 2001:db8::1",
            ]
        );
    }
}
