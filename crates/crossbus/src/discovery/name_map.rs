// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! The name-discovery map.
//!
//! Names found on remote daemons (or injected for local advertisements) live
//! here with the bus address to connect to, the advertising daemon's GUID,
//! the transport they were found on, and a TTL. Records with
//! [`crate::config::TTL_INFINITE_MS`] never expire; everything else is
//! reaped once `now - timestamp >= ttl`.

use crate::config::TTL_INFINITE_MS;
use crate::transport::TransportMask;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// One discovered advertisement.
#[derive(Clone, Debug)]
pub struct NameRecord {
    /// Short GUID of the advertising daemon.
    pub guid: String,
    /// Bus address to connect through.
    pub bus_addr: String,
    /// Transport the advertisement was found on.
    pub transport: TransportMask,
    /// Arrival (or last refresh) time.
    pub timestamp: Instant,
    /// Lifetime in milliseconds; [`TTL_INFINITE_MS`] never expires.
    pub ttl_ms: u32,
}

impl NameRecord {
    /// True once the record's lifetime has elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        if self.ttl_ms == TTL_INFINITE_MS {
            return false;
        }
        now.duration_since(self.timestamp) >= Duration::from_millis(u64::from(self.ttl_ms))
    }

    /// Time remaining until expiry; `None` for infinite records.
    #[must_use]
    pub fn expires_in(&self, now: Instant) -> Option<Duration> {
        if self.ttl_ms == TTL_INFINITE_MS {
            return None;
        }
        let ttl = Duration::from_millis(u64::from(self.ttl_ms));
        Some(ttl.saturating_sub(now.duration_since(self.timestamp)))
    }
}

/// Multi-valued map: advertised name -> records.
#[derive(Default)]
pub struct NameMap {
    entries: BTreeMap<String, Vec<NameRecord>>,
}

impl NameMap {
    /// Records for `name`.
    #[must_use]
    pub fn records(&self, name: &str) -> &[NameRecord] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    /// First record of `name` whose transport intersects `mask` (bus-address
    /// lookup during join).
    #[must_use]
    pub fn first_match(&self, name: &str, mask: TransportMask) -> Option<&NameRecord> {
        self.records(name).iter().find(|r| r.transport & mask != 0)
    }

    /// Records whose name starts with `prefix`, as `(name, record)` pairs.
    #[must_use]
    pub fn matching_prefix(&self, prefix: &str) -> Vec<(String, NameRecord)> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(name, records)| records.iter().map(move |r| (name.clone(), r.clone())))
            .collect()
    }

    /// Insert or refresh one record.
    ///
    /// A record for the same `(name, guid)` on an overlapping transport is a
    /// re-announcement: with the same bus address the timestamp refreshes;
    /// with a different bus address the announcement is a redundant alternate
    /// route and is ignored (clients never see bus addresses, so it would
    /// look like a duplicate to them). Returns true iff a new record was
    /// inserted.
    pub fn upsert(
        &mut self,
        name: &str,
        guid: &str,
        bus_addr: &str,
        transport: TransportMask,
        ttl_ms: u32,
        now: Instant,
    ) -> bool {
        let slot = self.entries.entry(name.to_string()).or_default();
        if let Some(existing) = slot
            .iter_mut()
            .find(|r| r.guid == guid && r.transport & transport != 0)
        {
            if existing.bus_addr == bus_addr {
                existing.timestamp = now;
            }
            return false;
        }
        slot.push(NameRecord {
            guid: guid.to_string(),
            bus_addr: bus_addr.to_string(),
            transport,
            timestamp: now,
            ttl_ms,
        });
        true
    }

    /// Remove the records of `name` from `guid` on `transport`. Returns true
    /// iff anything was removed (the ttl == 0 flush case).
    pub fn flush(&mut self, name: &str, guid: &str, transport: TransportMask) -> bool {
        let Some(slot) = self.entries.get_mut(name) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|r| !(r.guid == guid && r.transport & transport != 0));
        let removed = slot.len() < before;
        if slot.is_empty() {
            self.entries.remove(name);
        }
        removed
    }

    /// Remove every record advertised from `(guid, bus_addr)`; returns the
    /// affected names (a daemon's advertisements all expire together when it
    /// announces ttl 0 with no names).
    pub fn flush_source(&mut self, guid: &str, bus_addr: &str) -> Vec<(String, TransportMask)> {
        let mut lost = Vec::new();
        self.entries.retain(|name, slot| {
            slot.retain(|r| {
                if r.guid == guid && r.bus_addr == bus_addr {
                    lost.push((name.clone(), r.transport));
                    false
                } else {
                    true
                }
            });
            !slot.is_empty()
        });
        lost
    }

    /// Remove records on any of `mask`'s transports (the network-entry flush
    /// when the last advertiser and discoverer are gone).
    pub fn flush_transports(&mut self, mask: TransportMask) {
        self.entries.retain(|_, slot| {
            slot.retain(|r| r.transport & mask == 0);
            !slot.is_empty()
        });
    }

    /// Remove expired records; returns them as `(name, transport)` pairs plus
    /// the wait until the next scheduled expiry (`None` when nothing finite
    /// remains).
    pub fn reap(&mut self, now: Instant) -> (Vec<(String, TransportMask)>, Option<Duration>) {
        let mut lost = Vec::new();
        let mut next: Option<Duration> = None;
        self.entries.retain(|name, slot| {
            slot.retain(|r| {
                if r.is_expired(now) {
                    lost.push((name.clone(), r.transport));
                    return false;
                }
                if let Some(left) = r.expires_in(now) {
                    next = Some(match next {
                        Some(cur) if cur <= left => cur,
                        _ => left,
                    });
                }
                true
            });
            !slot.is_empty()
        });
        (lost, next)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
