//! Reconciliation state store.
//!
//! Holds every route the speaker currently believes is live, keyed by its
//! canonical [`RouteKey`], together with the handle needed to withdraw it.
//!
//! # Invariants
//!
//! - An entry is inserted only after its publish call succeeded.
//! - An entry is removed only after its withdraw call succeeded.
//! - An entry whose withdraw call failed is kept but marked unconfirmed: the
//!   speaker may or may not still hold the path, so a key that becomes
//!   desired again is published anew instead of being trusted.
//! - Lookups never create entries.
//!
//! The store is owned by the [`Reconciler`](crate::Reconciler) and mutated
//! only while its pass lock is held. It lives for the process lifetime and is
//! not persisted.

use crate::desired::DesiredSet;
use crate::publisher::RouteHandle;
use lxd_bgp_types::RouteKey;
use std::collections::BTreeMap;

/// A route accepted by the speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub key: RouteKey,
    pub handle: RouteHandle,
    /// A withdraw call for this handle failed
    pub unconfirmed: bool,
}

impl Advertisement {
    pub fn new(key: RouteKey, handle: RouteHandle) -> Self {
        Self {
            key,
            handle,
            unconfirmed: false,
        }
    }
}

/// Published advertisements keyed by identity.
///
/// Backed by a `BTreeMap` so iteration, and with it the withdrawal order of a
/// pass, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct RouteStore {
    inner: BTreeMap<RouteKey, Advertisement>,
}

impl RouteStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Returns the number of published routes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is published.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns true if the route is published.
    pub fn contains(&self, key: &RouteKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the advertisement for a route.
    ///
    /// **This never creates entries.**
    pub fn get(&self, key: &RouteKey) -> Option<&Advertisement> {
        self.inner.get(key)
    }

    /// Records a successfully published route.
    ///
    /// Returns the previous advertisement if the key was already present.
    pub fn insert(&mut self, advertisement: Advertisement) -> Option<Advertisement> {
        self.inner.insert(advertisement.key, advertisement)
    }

    /// Forgets a successfully withdrawn route.
    pub fn remove(&mut self, key: &RouteKey) -> Option<Advertisement> {
        self.inner.remove(key)
    }

    /// Marks a route whose withdrawal failed. Returns false if it is unknown.
    pub fn mark_unconfirmed(&mut self, key: &RouteKey) -> bool {
        match self.inner.get_mut(key) {
            Some(adv) => {
                adv.unconfirmed = true;
                true
            }
            None => false,
        }
    }

    /// Returns an iterator over published keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.inner.keys()
    }

    /// Published advertisements whose key is no longer desired.
    pub fn stale(&self, desired: &DesiredSet) -> Vec<Advertisement> {
        self.inner
            .values()
            .filter(|adv| !desired.contains(&adv.key))
            .cloned()
            .collect()
    }

    /// Desired keys that are not published or not confirmed, in desired order.
    pub fn missing(&self, desired: &DesiredSet) -> Vec<RouteKey> {
        desired
            .iter()
            .filter(|key| self.inner.get(*key).map_or(true, |adv| adv.unconfirmed))
            .copied()
            .collect()
    }
}

impl FromIterator<Advertisement> for RouteStore {
    fn from_iter<I: IntoIterator<Item = Advertisement>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(|adv| (adv.key, adv)).collect(),
        }
    }
}
