//! Lease registry: the set of currently outstanding leases.
//!
//! The registry is the only state a valve hands over between instances, so it
//! serializes as a plain token-to-holder map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{HolderId, LeaseToken};

/// Mapping from lease token to holder. Insertion order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseRegistry {
    leases: HashMap<LeaseToken, HolderId>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lease. Returns the previous holder if the token was already
    /// present, in which case the holder is replaced and the size is unchanged.
    pub fn insert(&mut self, token: LeaseToken, holder: HolderId) -> Option<HolderId> {
        self.leases.insert(token, holder)
    }

    /// Remove a lease, returning its holder if it was present.
    pub fn remove(&mut self, token: &LeaseToken) -> Option<HolderId> {
        self.leases.remove(token)
    }

    pub fn contains(&self, token: &LeaseToken) -> bool {
        self.leases.contains_key(token)
    }

    pub fn holder(&self, token: &LeaseToken) -> Option<HolderId> {
        self.leases.get(token).copied()
    }

    /// Number of outstanding leases.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LeaseToken, &HolderId)> {
        self.leases.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &LeaseToken> {
        self.leases.keys()
    }
}

impl FromIterator<(LeaseToken, HolderId)> for LeaseRegistry {
    fn from_iter<I: IntoIterator<Item = (LeaseToken, HolderId)>>(iter: I) -> Self {
        Self {
            leases: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for LeaseRegistry {
    type Item = (LeaseToken, HolderId);
    type IntoIter = std::collections::hash_map::IntoIter<LeaseToken, HolderId>;

    fn into_iter(self) -> Self::IntoIter {
        self.leases.into_iter()
    }
}
