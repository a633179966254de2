//! Desired-state builder
//!
//! Turns collector output into the de-duplicated set of route keys a pass
//! converges to. The first occurrence of a key wins; later duplicates carry
//! the same identity and are absorbed.

use crate::collector::RouteCandidate;
use lxd_bgp_types::RouteKey;
use std::collections::HashSet;
use tracing::trace;

/// The routes that should be advertised after a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSet {
    keys: Vec<RouteKey>,
    index: HashSet<RouteKey>,
    duplicates: usize,
}

impl DesiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from collector candidates, preserving discovery order.
    pub fn from_candidates<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = RouteCandidate>,
    {
        let mut set = Self::new();
        for candidate in candidates {
            let key = candidate.key();
            if !set.insert(key) {
                trace!(route = %key, source = %candidate.source, "Duplicate candidate absorbed");
            }
        }
        set
    }

    /// Adds a key. Returns false if it was already present.
    pub fn insert(&mut self, key: RouteKey) -> bool {
        if self.index.insert(key) {
            self.keys.push(key);
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.index.contains(key)
    }

    /// Keys in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of candidates dropped as duplicates.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

impl FromIterator<RouteKey> for DesiredSet {
    fn from_iter<I: IntoIterator<Item = RouteKey>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CandidateSource;
    use pretty_assertions::assert_eq;

    fn candidate(prefix: &str, nexthop: &str, network: &str) -> RouteCandidate {
        RouteCandidate::new(
            prefix.parse().unwrap(),
            nexthop.parse().unwrap(),
            CandidateSource::Subnet {
                project: "default".to_string(),
                network: network.to_string(),
            },
        )
    }

    #[test]
    fn test_first_occurrence_wins() {
        let set = DesiredSet::from_candidates(vec![
            candidate("203.0.113.0/24", "10.0.0.2", "a"),
            candidate("198.51.100.0/24", "10.0.0.3", "b"),
            candidate("203.0.113.1/24", "10.0.0.2", "c"),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.duplicates(), 1);
        let order: Vec<String> = set.iter().map(ToString::to_string).collect();
        assert_eq!(
            order,
            vec!["203.0.113.0/24 via 10.0.0.2", "198.51.100.0/24 via 10.0.0.3"]
        );
    }

    #[test]
    fn test_same_prefix_different_nexthop_is_distinct() {
        let set = DesiredSet::from_candidates(vec![
            candidate("203.0.113.0/24", "10.0.0.2", "a"),
            candidate("203.0.113.0/24", "10.0.0.3", "b"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.duplicates(), 0);
    }

    #[test]
    fn test_contains_uses_normalized_key() {
        let set = DesiredSet::from_candidates(vec![candidate("2001:db8:0::/64", "2001:db8::0:1", "a")]);
        let key = RouteKey::new("2001:db8::/64".parse().unwrap(), "2001:db8::1".parse().unwrap());
        assert!(set.contains(&key));
    }
}
