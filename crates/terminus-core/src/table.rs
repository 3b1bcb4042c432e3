//! Reservation table: the item ↔ claimant mapping.
//!
//! Plain map operations. Consistency with the identity directory is the
//! coordinator's job.

use crate::identity::IdentityKey;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ReservationTable {
    by_item: HashMap<Arc<str>, IdentityKey>,
    by_claimant: HashMap<IdentityKey, Arc<str>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_taken(&self, item: &str) -> bool {
        self.by_item.contains_key(item)
    }

    pub fn owner_of(&self, item: &str) -> Option<&IdentityKey> {
        self.by_item.get(item)
    }

    pub fn claimant_item(&self, claimant: &IdentityKey) -> Option<&Arc<str>> {
        self.by_claimant.get(claimant)
    }

    /// Record `claimant` as the owner of `item`.
    ///
    /// Any previous entry for either side is replaced, so both directions
    /// stay one-to-one.
    pub fn set(&mut self, item: Arc<str>, claimant: IdentityKey) {
        if let Some(previous_owner) = self.by_item.remove(&item) {
            self.by_claimant.remove(&previous_owner);
        }
        if let Some(previous_item) = self.by_claimant.remove(&claimant) {
            self.by_item.remove(&previous_item);
        }
        self.by_claimant.insert(claimant.clone(), Arc::clone(&item));
        self.by_item.insert(item, claimant);
    }

    /// Remove the entry for `item`, returning its former owner.
    pub fn clear(&mut self, item: &str) -> Option<IdentityKey> {
        let owner = self.by_item.remove(item)?;
        self.by_claimant.remove(&owner);
        Some(owner)
    }

    pub fn clear_all(&mut self) {
        self.by_item.clear();
        self.by_claimant.clear();
    }

    /// All (item, owner) pairs, unordered.
    pub fn entries(&self) -> impl Iterator<Item = (&Arc<str>, &IdentityKey)> {
        self.by_item.iter()
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}
