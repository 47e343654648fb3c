// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Advertise and discover registries.
//!
//! The advertise map folds each `(name, owner)` pair into one entry carrying
//! the OR of all transports the owner advertises on. The discover map records
//! which local endpoints hunt which name prefixes; its companion forbid map
//! remembers the transports an owner is not permitted to receive matches on.

use crate::transport::TransportMask;
use std::collections::BTreeMap;

// ============================================================================
// Advertise map
// ============================================================================

/// One advertiser of a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertiseEntry {
    pub transports: TransportMask,
    pub owner: String,
}

/// name -> advertisers.
#[derive(Default)]
pub struct AdvertiseMap {
    entries: BTreeMap<String, Vec<AdvertiseEntry>>,
}

impl AdvertiseMap {
    /// Fold `(name, owner, transports)` into the map. Returns false if the
    /// owner already advertises the name on an overlapping mask (the
    /// `ALREADY_ADVERTISING` case); on success the owner's entry carries the
    /// union of its masks.
    pub fn add(&mut self, name: &str, owner: &str, transports: TransportMask) -> bool {
        let slot = self.entries.entry(name.to_string()).or_default();
        if let Some(entry) = slot.iter_mut().find(|e| e.owner == owner) {
            if entry.transports & transports != 0 {
                return false;
            }
            entry.transports |= transports;
            return true;
        }
        slot.push(AdvertiseEntry {
            transports,
            owner: owner.to_string(),
        });
        true
    }

    /// Clear `transports` bits from `(name, owner)`; the entry disappears
    /// when its mask empties. Returns `(found, other_owners_remain)`.
    pub fn remove(&mut self, name: &str, owner: &str, transports: TransportMask) -> (bool, bool) {
        let Some(slot) = self.entries.get_mut(name) else {
            return (false, false);
        };
        let mut found = false;
        slot.retain_mut(|e| {
            if e.owner == owner {
                found = true;
                e.transports &= !transports;
                e.transports != 0
            } else {
                true
            }
        });
        let others = !slot.is_empty();
        if slot.is_empty() {
            self.entries.remove(name);
        }
        (found, others)
    }

    /// All `(name, transports)` advertised by `owner` (for departure cleanup).
    #[must_use]
    pub fn owned_by(&self, owner: &str) -> Vec<(String, TransportMask)> {
        self.entries
            .iter()
            .flat_map(|(name, slot)| {
                slot.iter()
                    .filter(|e| e.owner == owner)
                    .map(|e| (name.clone(), e.transports))
            })
            .collect()
    }

    /// Distinct advertised names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// All advertisers of `name`.
    #[must_use]
    pub fn advertisers(&self, name: &str) -> &[AdvertiseEntry] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate every entry (invariant checks).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AdvertiseEntry)> {
        self.entries
            .iter()
            .flat_map(|(name, slot)| slot.iter().map(move |e| (name.as_str(), e)))
    }
}

// ============================================================================
// Discover map
// ============================================================================

/// prefix -> interested local endpoints, plus the per-(prefix, owner)
/// forbidden-transport record.
#[derive(Default)]
pub struct DiscoverMap {
    entries: BTreeMap<String, Vec<String>>,
    forbid: BTreeMap<String, Vec<(TransportMask, String)>>,
}

impl DiscoverMap {
    /// Register `owner` as a discoverer of `prefix`. Returns
    /// `(inserted, first_for_prefix)`; `inserted` is false when the owner
    /// already discovers this prefix.
    pub fn add(&mut self, prefix: &str, owner: &str) -> (bool, bool) {
        let slot = self.entries.entry(prefix.to_string()).or_default();
        if slot.iter().any(|o| o == owner) {
            return (false, false);
        }
        let first = slot.is_empty();
        slot.push(owner.to_string());
        (true, first)
    }

    /// Remove `(prefix, owner)` and its forbid record. Returns
    /// `(found, last_for_prefix)`.
    pub fn remove(&mut self, prefix: &str, owner: &str) -> (bool, bool) {
        let mut found = false;
        if let Some(slot) = self.entries.get_mut(prefix) {
            if let Some(pos) = slot.iter().position(|o| o == owner) {
                slot.remove(pos);
                found = true;
            }
            if slot.is_empty() {
                self.entries.remove(prefix);
            }
        }
        if let Some(slot) = self.forbid.get_mut(prefix) {
            slot.retain(|(_, o)| o != owner);
            if slot.is_empty() {
                self.forbid.remove(prefix);
            }
        }
        let last = found && !self.entries.contains_key(prefix);
        (found, last)
    }

    /// Record transports `owner` may not receive matches for under `prefix`.
    pub fn forbid(&mut self, prefix: &str, owner: &str, transports: TransportMask) {
        if transports != 0 {
            self.forbid
                .entry(prefix.to_string())
                .or_default()
                .push((transports, owner.to_string()));
        }
    }

    /// The transports `owner` is forbidden to use for names under any prefix
    /// of `name`.
    #[must_use]
    pub fn forbidden_for(&self, name: &str, owner: &str) -> TransportMask {
        self.forbid
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .flat_map(|(_, slot)| slot.iter())
            .filter(|(_, o)| o == owner)
            .fold(0, |m, (mask, _)| m | mask)
    }

    /// All prefixes `owner` is discovering (for departure cleanup).
    #[must_use]
    pub fn prefixes_of(&self, owner: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, slot)| slot.iter().any(|o| o == owner))
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    /// `(prefix, owner)` pairs whose prefix matches `name`.
    #[must_use]
    pub fn matching(&self, name: &str) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .flat_map(|(prefix, slot)| slot.iter().map(move |o| (prefix.clone(), o.clone())))
            .collect()
    }

    /// Discoverers of exactly `prefix`.
    #[must_use]
    pub fn owners_of(&self, prefix: &str) -> &[String] {
        self.entries.get(prefix).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
