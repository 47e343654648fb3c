// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Endpoint registry.
//!
//! Every addressable party on the bus is an endpoint with a unique name
//! `:<guid>.<n>`. The [`NameTable`] owns the name-to-kind mapping and the
//! well-known alias table; it is guarded by the process-wide name-table lock
//! (acquired before the state lock, always). Virtual endpoint route sets and
//! bus-to-bus endpoint records live in the state table (see
//! [`crate::bus::shared`]).
//!
//! Unique names allocated from this daemon's namespace are never reused for
//! the lifetime of the daemon (monotonic serial).

mod b2b;
mod virtual_ep;

pub use b2b::{B2bEndpoint, LinkRef};
pub use virtual_ep::VirtualEndpoint;

use crate::bus::guid::{controller_name, make_unique_name};
use crate::bus::BusGuid;
use crate::protocol::messages::NameEntry;
use std::collections::BTreeMap;

// ============================================================================
// Endpoint kinds
// ============================================================================

/// The variants of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    /// The daemon's own bus-controller endpoint (`:<guid>.1`).
    Local,
    /// A session-less I/O connection to a same-host client.
    Client,
    /// Fast-path endpoint of a bundled in-process daemon.
    Null,
    /// A link to a sibling daemon.
    BusToBus,
    /// A remote client reachable via one or more bus-to-bus links.
    Virtual,
}

impl EndpointKind {
    /// True for endpoints served directly by this daemon (valid session
    /// hosts and attach destinations).
    #[inline]
    #[must_use]
    pub fn is_locally_served(self) -> bool {
        matches!(self, EndpointKind::Local | EndpointKind::Client | EndpointKind::Null)
    }
}

// ============================================================================
// Name table
// ============================================================================

/// Unique-name registry plus the well-known alias table.
pub struct NameTable {
    guid: BusGuid,
    next_serial: u64,
    endpoints: BTreeMap<String, EndpointKind>,
    /// Well-known name -> owning unique name.
    aliases: BTreeMap<String, String>,
}

impl NameTable {
    /// Create the table and register the daemon's controller endpoint
    /// (`:<guid>.1`).
    #[must_use]
    pub fn new(guid: BusGuid) -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(controller_name(&guid), EndpointKind::Local);
        Self {
            guid,
            next_serial: 2,
            endpoints,
            aliases: BTreeMap::new(),
        }
    }

    /// This daemon's GUID.
    #[inline]
    #[must_use]
    pub fn guid(&self) -> &BusGuid {
        &self.guid
    }

    /// Allocate a fresh unique name from this daemon's namespace and register
    /// it with `kind`.
    pub fn alloc(&mut self, kind: EndpointKind) -> String {
        let name = make_unique_name(&self.guid, self.next_serial);
        self.next_serial += 1;
        self.endpoints.insert(name.clone(), kind);
        name
    }

    /// Register an endpoint under a caller-provided name (virtual endpoints
    /// and the connecting side of a bus-to-bus link). Returns false if the
    /// name is already taken.
    pub fn insert(&mut self, name: &str, kind: EndpointKind) -> bool {
        if self.endpoints.contains_key(name) {
            return false;
        }
        self.endpoints.insert(name.to_string(), kind);
        true
    }

    /// Remove an endpoint. Its unique name stays retired.
    pub fn remove(&mut self, name: &str) -> Option<EndpointKind> {
        self.endpoints.remove(name)
    }

    /// Kind of a registered endpoint.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<EndpointKind> {
        self.endpoints.get(name).copied()
    }

    /// Resolve a bus name (unique or well-known) to a registered endpoint.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(String, EndpointKind)> {
        let unique = if name.starts_with(':') {
            name
        } else {
            self.aliases.get(name)?.as_str()
        };
        self.endpoints
            .get(unique)
            .map(|kind| (unique.to_string(), *kind))
    }

    /// Set or clear a well-known alias. Returns true iff the table changed.
    pub fn set_alias(&mut self, alias: &str, owner: Option<&str>) -> bool {
        match owner {
            Some(owner) => {
                let prev = self.aliases.insert(alias.to_string(), owner.to_string());
                prev.as_deref() != Some(owner)
            }
            None => self.aliases.remove(alias).is_some(),
        }
    }

    /// Current owner of a well-known alias.
    #[must_use]
    pub fn alias_owner(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// All aliases owned by `unique`.
    #[must_use]
    pub fn aliases_of(&self, unique: &str) -> Vec<String> {
        self.aliases
            .iter()
            .filter(|(_, owner)| owner.as_str() == unique)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Remove every alias owned by `unique`; returns the removed alias names.
    pub fn remove_aliases_of(&mut self, unique: &str) -> Vec<String> {
        let removed: Vec<String> = self.aliases_of(unique);
        for alias in &removed {
            self.aliases.remove(alias);
        }
        removed
    }

    /// Snapshot of every endpoint with its aliases, for `ExchangeNames`.
    #[must_use]
    pub fn names_and_aliases(&self) -> Vec<NameEntry> {
        self.endpoints
            .keys()
            .map(|unique| NameEntry {
                unique_name: unique.clone(),
                aliases: self.aliases_of(unique),
            })
            .collect()
    }

    /// Names of all endpoints of a given kind.
    #[must_use]
    pub fn names_of_kind(&self, kind: EndpointKind) -> Vec<String> {
        self.endpoints
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(n, _)| n.clone())
            .collect()
    }
}
