// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Name advertisement and discovery.
//!
//! Local endpoints advertise names on transport sets and hunt for name
//! prefixes; remote advertisements arrive through [`BusCore::found_names`]
//! and age out of the name-discovery map under the [`reaper`]'s TTL sweep.
//!
//! ```text
//!  AdvertiseName ----> advertise map ----> Transport::enable_advertisement
//!  FindAdvertisedName -> discover map ---> Transport::enable_discovery
//!  found_names ------> name map (TTL) --> FoundAdvertisedName signals
//!  reaper -----------> name map sweep --> LostAdvertisedName signals
//! ```

pub(crate) mod maps;
pub(crate) mod name_map;
pub(crate) mod reaper;

pub use name_map::NameRecord;

use crate::bus::guid::is_legal_bus_name;
use crate::bus::BusCore;
use crate::config::TTL_INFINITE_MS;
use crate::protocol::reply::{
    AdvertiseReply, CancelAdvertiseReply, CancelFindReply, FindReply,
};
use crate::bus::{Error, Result};
use crate::transport::{TransportMask, LOCAL_BUS_ADDR, TRANSPORT_LOCAL, TRANSPORT_REMOTE};
use std::collections::BTreeSet;
use std::time::Instant;

impl BusCore {
    // ========================================================================
    // Advertisement
    // ========================================================================

    /// Advertise `name` on the transports in `transports` for `sender`.
    pub fn advertise_name(
        &self,
        sender: &str,
        name: &str,
        transports: TransportMask,
    ) -> AdvertiseReply {
        let granted = self.shared.policy.allowed(sender, transports);
        if granted == 0 || !is_legal_bus_name(name) {
            log::debug!("[DISCOVERY] AdvertiseName({}, {:#x}) rejected", name, transports);
            return AdvertiseReply::Failed;
        }

        let reply = {
            let mut l = self.shared.lock();
            if l.names.kind_of(sender).is_none() {
                AdvertiseReply::Failed
            } else if l.state.advertise.add(name, sender, granted) {
                for trans in self.shared.transports.iter() {
                    if trans.is_bus_to_bus() && trans.mask() & granted != 0 {
                        if let Err(e) = trans.enable_advertisement(name) {
                            log::error!(
                                "[DISCOVERY] EnableAdvertisement failed for {} on {}: {}",
                                name,
                                trans.name(),
                                e
                            );
                        }
                    }
                }
                AdvertiseReply::Success
            } else {
                AdvertiseReply::AlreadyAdvertising
            }
        };

        // Make the advertisement visible to local discoverers.
        if reply == AdvertiseReply::Success && granted & TRANSPORT_LOCAL != 0 {
            let guid = self.shared.guid.short().to_string();
            self.found_names(
                LOCAL_BUS_ADDR,
                &guid,
                TRANSPORT_LOCAL,
                Some(std::slice::from_ref(&name.to_string())),
                TTL_INFINITE_MS,
            );
        }
        log::debug!(
            "[DISCOVERY] AdvertiseName({}, {:#x}) from {} -> {:?}",
            name,
            granted,
            sender,
            reply
        );
        reply
    }

    /// Cancel a prior advertisement.
    pub fn cancel_advertise_name(
        &self,
        sender: &str,
        name: &str,
        transports: TransportMask,
    ) -> CancelAdvertiseReply {
        let reply = match self.proc_cancel_advertise(sender, name, transports) {
            Ok(()) => CancelAdvertiseReply::Success,
            Err(_) => CancelAdvertiseReply::Failed,
        };
        if reply == CancelAdvertiseReply::Success && transports & TRANSPORT_LOCAL != 0 {
            let guid = self.shared.guid.short().to_string();
            self.found_names(
                LOCAL_BUS_ADDR,
                &guid,
                TRANSPORT_LOCAL,
                Some(std::slice::from_ref(&name.to_string())),
                0,
            );
        }
        reply
    }

    /// Shared cancel path (client request or endpoint departure).
    pub(crate) fn proc_cancel_advertise(
        &self,
        sender: &str,
        name: &str,
        transports: TransportMask,
    ) -> Result<()> {
        let mut l = self.shared.lock();
        let (found, others) = l.state.advertise.remove(name, sender, transports);
        if found && !others {
            let last = l.state.advertise.is_empty();
            for trans in self.shared.transports.iter() {
                if trans.mask() & transports != 0 {
                    trans.disable_advertisement(name, last);
                }
            }
            if last && l.state.discover.is_empty() {
                l.state.name_map.flush_transports(TRANSPORT_REMOTE);
            }
        }
        if found {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{sender} does not advertise {name}")))
        }
    }

    /// Distinct names currently advertised (introspection).
    #[must_use]
    pub fn advertised_names(&self) -> Vec<String> {
        self.shared.lock().state.advertise.names()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Register `sender` as a discoverer of `prefix` and replay matching
    /// names already known.
    pub fn find_advertised_name(&self, sender: &str, prefix: &str) -> FindReply {
        let all = self.shared.transports.mask();
        let granted = self.shared.policy.allowed(sender, all);
        let forbidden = all & !granted;

        let first = {
            let mut l = self.shared.lock();
            if l.names.kind_of(sender).is_none() {
                return FindReply::Failed;
            }
            let (inserted, first) = l.state.discover.add(prefix, sender);
            if !inserted {
                return FindReply::AlreadyDiscovering;
            }
            l.state.discover.forbid(prefix, sender, forbidden);
            first
        };

        if first {
            for trans in self.shared.transports.iter() {
                if trans.mask() & forbidden == trans.mask() && trans.mask() != 0 {
                    log::debug!(
                        "[DISCOVERY] {} not permitted to discover over {}",
                        sender,
                        trans.name()
                    );
                    continue;
                }
                trans.enable_discovery(prefix);
            }
        }

        // Replay names already in the map, one signal per distinct
        // (name, transport).
        let matches = {
            let l = self.shared.lock();
            let mut sent: BTreeSet<(String, TransportMask)> = BTreeSet::new();
            let mut out = Vec::new();
            for (name, record) in l.state.name_map.matching_prefix(prefix) {
                if record.transport & forbidden != 0 {
                    continue;
                }
                if sent.insert((name.clone(), record.transport)) {
                    out.push((name, record.transport));
                }
            }
            out
        };
        for (name, transport) in matches {
            self.shared
                .sink
                .found_advertised_name(sender, &name, transport, prefix);
        }
        log::debug!("[DISCOVERY] FindAdvertisedName({}) from {}", prefix, sender);
        FindReply::Success
    }

    /// Deregister a discoverer.
    pub fn cancel_find_advertised_name(&self, sender: &str, prefix: &str) -> CancelFindReply {
        match self.proc_cancel_find(sender, prefix) {
            Ok(()) => CancelFindReply::Success,
            Err(_) => CancelFindReply::Failed,
        }
    }

    /// Shared cancel path (client request or endpoint departure).
    pub(crate) fn proc_cancel_find(&self, sender: &str, prefix: &str) -> Result<()> {
        let mut l = self.shared.lock();
        let (found, last) = l.state.discover.remove(prefix, sender);
        if found && last {
            for trans in self.shared.transports.iter() {
                trans.disable_discovery(prefix);
            }
            if l.state.discover.is_empty() && l.state.advertise.is_empty() {
                l.state.name_map.flush_transports(TRANSPORT_REMOTE);
            }
        }
        if found {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{sender} does not discover {prefix}")))
        }
    }

    // ========================================================================
    // Name-map ingest
    // ========================================================================

    /// Ingest advertisements reported by a transport (or injected locally).
    ///
    /// - `names == None` with `ttl_ms == 0` expires everything previously
    ///   announced from `(guid, bus_addr)`.
    /// - `ttl_ms == 0` with names flushes those records.
    /// - Otherwise records are inserted (or refreshed; a differing bus
    ///   address on an existing record is a redundant alternate route and is
    ///   ignored), and discoverers are told about genuinely new names.
    pub fn found_names(
        &self,
        bus_addr: &str,
        guid: &str,
        transport: TransportMask,
        names: Option<&[String]>,
        ttl_ms: u32,
    ) {
        log::debug!(
            "[DISCOVERY] found_names(addr={}, guid={}, transport={:#x}, ttl={})",
            bus_addr,
            guid,
            transport,
            ttl_ms
        );
        let now = Instant::now();
        let mut found: Vec<(String, String, TransportMask, String)> = Vec::new();
        let mut lost: Vec<(String, TransportMask)> = Vec::new();
        let mut fresh_records = false;
        {
            let mut l = self.shared.lock();
            match names {
                None => {
                    if ttl_ms == 0 {
                        lost.extend(l.state.name_map.flush_source(guid, bus_addr));
                    }
                }
                Some(list) => {
                    for name in list {
                        if ttl_ms > 0 {
                            let is_new =
                                l.state
                                    .name_map
                                    .upsert(name, guid, bus_addr, transport, ttl_ms, now);
                            fresh_records = true;
                            if is_new {
                                for (prefix, owner) in l.state.discover.matching(name) {
                                    if l.state.discover.forbidden_for(name, &owner) & transport != 0
                                    {
                                        log::debug!(
                                            "[DISCOVERY] withholding {} from {} (forbidden transport)",
                                            name,
                                            owner
                                        );
                                        continue;
                                    }
                                    found.push((owner, name.clone(), transport, prefix));
                                }
                            }
                        } else if l.state.name_map.flush(name, guid, transport) {
                            lost.push((name.clone(), transport));
                        }
                    }
                }
            }
        }
        if fresh_records {
            self.shared.alert_reaper();
        }
        for (dest, name, mask, prefix) in found {
            self.shared.sink.found_advertised_name(&dest, &name, mask, &prefix);
        }
        for (name, mask) in lost {
            self.notify_lost_name(&name, mask);
        }
    }

    /// Tell every discoverer with a matching prefix that `name` is gone.
    pub(crate) fn notify_lost_name(&self, name: &str, transport: TransportMask) {
        let interested = {
            let l = self.shared.lock();
            l.state.discover.matching(name)
        };
        for (prefix, owner) in interested {
            log::debug!(
                "[DISCOVERY] LostAdvertisedName({}, {:#x}) -> {}",
                name,
                transport,
                owner
            );
            self.shared
                .sink
                .lost_advertised_name(&owner, name, transport, &prefix);
        }
    }
}
