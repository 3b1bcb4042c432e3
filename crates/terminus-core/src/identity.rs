//! Identity directory.
//!
//! Two identity models coexist:
//!
//! - **Anonymous**: the caller's address *is* the identity.
//! - **Handle**: a case-insensitively unique handle, registered once and kept
//!   for the process lifetime, bound to whichever address last logged in as it.
//!
//! Resolution is address-based. Anyone presenting a bound address acts as
//! that identity; the [`IdentityResolver`] trait keeps that policy out of the
//! coordinator so it can be swapped for real credentials later.

use crate::address::ClientAddr;
use crate::error::ReservationError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Longest accepted handle, in characters.
pub const MAX_HANDLE_LEN: usize = 32;

/// Stable key of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    /// Identity defined by its address alone.
    Anonymous(ClientAddr),
    /// Registered handle, stored lowercase.
    Handle(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous(addr) => write!(f, "{addr}"),
            Self::Handle(handle) => write!(f, "@{handle}"),
        }
    }
}

/// Resolved view of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key: IdentityKey,
    /// Display handle, as registered.
    pub handle: Option<String>,
    /// Address the identity is currently bound to.
    pub address: Option<ClientAddr>,
    /// Item currently claimed.
    pub claim: Option<Arc<str>>,
}

/// Answer to a handle lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    Unregistered,
    Registered {
        /// The caller's address is the one bound to this handle.
        owner_is_caller: bool,
        current_station: Option<Arc<str>>,
    },
}

#[derive(Debug, Clone, Default)]
struct IdentityRecord {
    handle: Option<String>,
    address: Option<ClientAddr>,
    claim: Option<Arc<str>>,
    /// Address whose budget paid for `claim`.
    charged_to: Option<ClientAddr>,
}

/// Trim and validate a handle, returning `(display, key)`.
pub fn normalize_handle(handle: &str) -> Result<(String, String), ReservationError> {
    let display = handle.trim();
    if display.is_empty() {
        return Err(ReservationError::InvalidHandle("handle is empty"));
    }
    if display.chars().count() > MAX_HANDLE_LEN {
        return Err(ReservationError::InvalidHandle("handle is too long"));
    }
    if display.chars().any(char::is_control) {
        return Err(ReservationError::InvalidHandle("handle contains control characters"));
    }
    Ok((display.to_string(), display.to_lowercase()))
}

/// Handle records, address bindings and per-identity claim pointers.
#[derive(Debug, Default)]
pub struct IdentityDirectory {
    records: HashMap<IdentityKey, IdentityRecord>,
    bindings: HashMap<ClientAddr, IdentityKey>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive lookup; never mutates.
    pub fn check_handle(
        &self,
        handle: &str,
        caller: &ClientAddr,
    ) -> Result<HandleStatus, ReservationError> {
        let (_, key) = normalize_handle(handle)?;
        let key = IdentityKey::Handle(key);
        Ok(match self.records.get(&key) {
            None => HandleStatus::Unregistered,
            Some(record) => HandleStatus::Registered {
                owner_is_caller: record.address.as_ref() == Some(caller),
                current_station: record.claim.clone(),
            },
        })
    }

    /// Register a new handle and bind it to `caller`.
    pub fn register(
        &mut self,
        handle: &str,
        caller: &ClientAddr,
    ) -> Result<Identity, ReservationError> {
        let (display, key) = normalize_handle(handle)?;
        let key = IdentityKey::Handle(key);
        if self.records.contains_key(&key) {
            return Err(ReservationError::HandleTaken);
        }

        self.records.insert(
            key.clone(),
            IdentityRecord {
                handle: Some(display),
                address: None,
                claim: None,
                charged_to: None,
            },
        );
        self.bind(&key, caller);
        Ok(self.view(&key))
    }

    /// Rebind an existing handle to `caller`, keeping its claim.
    pub fn login(
        &mut self,
        handle: &str,
        caller: &ClientAddr,
    ) -> Result<Identity, ReservationError> {
        let (_, key) = normalize_handle(handle).map_err(|_| ReservationError::UnknownHandle)?;
        let key = IdentityKey::Handle(key);
        if !self.records.contains_key(&key) {
            return Err(ReservationError::UnknownHandle);
        }
        self.bind(&key, caller);
        Ok(self.view(&key))
    }

    /// Drop the caller's address binding. Handle and claim survive.
    ///
    /// Returns the identity that was bound, if any.
    pub fn logout(&mut self, caller: &ClientAddr) -> Option<IdentityKey> {
        let key = self.bindings.remove(caller)?;
        if let Some(record) = self.records.get_mut(&key) {
            if record.address.as_ref() == Some(caller) {
                record.address = None;
            }
        }
        Some(key)
    }

    /// Handle identity bound to `caller`, if any.
    pub fn bound_key(&self, caller: &ClientAddr) -> Option<&IdentityKey> {
        self.bindings.get(caller)
    }

    /// View of any identity, including anonymous ones without a record.
    pub fn view(&self, key: &IdentityKey) -> Identity {
        let record = self.records.get(key);
        Identity {
            key: key.clone(),
            handle: record.and_then(|r| r.handle.clone()),
            address: match key {
                IdentityKey::Anonymous(addr) => Some(addr.clone()),
                IdentityKey::Handle(_) => record.and_then(|r| r.address.clone()),
            },
            claim: record.and_then(|r| r.claim.clone()),
        }
    }

    /// Display handle of an identity.
    pub fn handle_of(&self, key: &IdentityKey) -> Option<&str> {
        self.records.get(key).and_then(|r| r.handle.as_deref())
    }

    /// Claim pointer of an identity.
    pub fn claim_of(&self, key: &IdentityKey) -> Option<&Arc<str>> {
        self.records.get(key).and_then(|r| r.claim.as_ref())
    }

    /// Address charged for an identity's current claim.
    pub fn charged_to(&self, key: &IdentityKey) -> Option<&ClientAddr> {
        self.records.get(key).and_then(|r| r.charged_to.as_ref())
    }

    /// Set the claim pointer and the address that paid for it, creating a
    /// record for anonymous identities.
    pub fn set_claim(&mut self, key: &IdentityKey, item: Arc<str>, charged_to: ClientAddr) {
        let record = self.records.entry(key.clone()).or_default();
        record.claim = Some(item);
        record.charged_to = Some(charged_to);
    }

    /// Clear the claim pointer. Anonymous records are dropped with it.
    pub fn clear_claim(&mut self, key: &IdentityKey) -> Option<Arc<str>> {
        let record = self.records.get_mut(key)?;
        record.charged_to = None;
        let item = record.claim.take();
        if matches!(key, IdentityKey::Anonymous(_)) {
            self.records.remove(key);
        }
        item
    }

    /// Clear every claim pointer.
    pub fn clear_all_claims(&mut self) {
        self.records
            .retain(|key, _| matches!(key, IdentityKey::Handle(_)));
        for record in self.records.values_mut() {
            record.claim = None;
            record.charged_to = None;
        }
    }

    /// Every identity that currently points at an item.
    pub fn claims(&self) -> impl Iterator<Item = (&IdentityKey, &Arc<str>)> {
        self.records
            .iter()
            .filter_map(|(key, record)| record.claim.as_ref().map(|item| (key, item)))
    }

    fn bind(&mut self, key: &IdentityKey, caller: &ClientAddr) {
        // The handle's previous address stops resolving to it.
        if let Some(previous) = self
            .records
            .get_mut(key)
            .and_then(|record| record.address.replace(caller.clone()))
        {
            if previous != *caller {
                self.bindings.remove(&previous);
            }
        }

        // The caller's previous handle, if different, loses its address.
        if let Some(displaced) = self.bindings.insert(caller.clone(), key.clone()) {
            if displaced != *key {
                if let Some(record) = self.records.get_mut(&displaced) {
                    record.address = None;
                }
            }
        }
    }
}

/// Maps a caller address to the identity making the request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, directory: &IdentityDirectory, caller: &ClientAddr) -> Option<IdentityKey>;
}

/// Address-based resolution.
///
/// A handle bound to the address always wins. Without one, the address is
/// its own identity when `allow_anonymous` is set and unauthenticated otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver {
    pub allow_anonymous: bool,
}

impl AddressResolver {
    /// Handles required.
    pub fn registered() -> Self {
        Self {
            allow_anonymous: false,
        }
    }

    /// Any address may claim.
    pub fn anonymous() -> Self {
        Self {
            allow_anonymous: true,
        }
    }
}

impl IdentityResolver for AddressResolver {
    fn resolve(&self, directory: &IdentityDirectory, caller: &ClientAddr) -> Option<IdentityKey> {
        directory.bound_key(caller).cloned().or_else(|| {
            self.allow_anonymous
                .then(|| IdentityKey::Anonymous(caller.clone()))
        })
    }
}
