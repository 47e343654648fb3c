// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Name-ownership propagation between sibling daemons.
//!
//! On every new bus-to-bus link the daemons exchange their name rosters
//! (`ExchangeNames`); afterwards, incremental `NameChanged` signals keep the
//! virtual-endpoint tables in sync. Inbound updates are validated against the
//! embedded GUIDs (a remote may never change a local name), applied, and
//! forwarded to every other directly connected daemon, deduplicated by
//! remote GUID. Each push holds a waiter on its link and runs with the core
//! locks released.

use crate::bus::guid::{controller_name, is_legal_unique_name, name_owned_by};
use crate::bus::{BusCore, BusGuid};
use crate::endpoint::EndpointKind;
use crate::protocol::messages::{NameChangedMsg, NameEntry};
use crate::transport::{TRANSPORT_LOCAL, LOCAL_BUS_ADDR};

impl BusCore {
    // ========================================================================
    // Outbound
    // ========================================================================

    /// Push our name roster over a freshly registered link: every locally
    /// served endpoint plus every virtual endpoint still reachable without
    /// that link.
    pub(crate) fn exchange_names_on(&self, b2b_name: &str) {
        let (guard, entries) = {
            let l = self.shared.lock();
            let Some(ep) = l.state.b2bs.get(b2b_name) else {
                log::warn!("[NAMES] exchange on unknown b2b {}", b2b_name);
                return;
            };
            let exclude = ep.remote_guid().clone();
            let guard = ep.hold();
            let entries: Vec<NameEntry> = l
                .names
                .names_and_aliases()
                .into_iter()
                .filter(|entry| match l.names.kind_of(&entry.unique_name) {
                    Some(EndpointKind::BusToBus) | None => false,
                    Some(EndpointKind::Virtual) => l
                        .state
                        .virtuals
                        .get(&entry.unique_name)
                        .is_some_and(|vep| can_route_without(&l, vep.unique_name(), &exclude)),
                    Some(_) => true,
                })
                .collect();
            (guard, entries)
        };
        log::debug!(
            "[NAMES] exchanging {} names over {}",
            entries.len(),
            b2b_name
        );
        if let Err(e) = guard.send_exchange_names(&entries) {
            log::error!("[NAMES] failed to send ExchangeNames on {}: {}", b2b_name, e);
        }
    }

    /// Announce a local ownership change to every directly connected daemon.
    fn broadcast_name_changed(&self, alias: &str, old_owner: &str, new_owner: &str) {
        let links = {
            let l = self.shared.lock();
            l.state.links_except_guid(None)
        };
        for (name, link) in links {
            if let Err(e) = link.send_name_changed(alias, old_owner, new_owner) {
                log::error!("[NAMES] failed to send NameChanged to {}: {}", name, e);
            }
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Apply a roster received from the daemon `from_guid` and forward it to
    /// the other siblings if it changed anything.
    pub fn handle_exchange_names(&self, from_guid: &BusGuid, entries: &[NameEntry]) {
        let mut made_changes = false;
        {
            let mut l = self.shared.lock();
            let carriers = l.state.b2bs_with_guid(from_guid);
            if carriers.is_empty() {
                log::warn!(
                    "[NAMES] ExchangeNames from unconnected daemon {}",
                    from_guid.short()
                );
                return;
            }
            for entry in entries {
                if !is_legal_unique_name(&entry.unique_name) {
                    log::warn!(
                        "[NAMES] invalid unique name \"{}\" in ExchangeNames",
                        entry.unique_name
                    );
                    continue;
                }
                if name_owned_by(&entry.unique_name, &self.shared.guid) {
                    // A remote may not claim one of our names.
                    continue;
                }
                for carrier in &carriers {
                    if l.add_virtual(&entry.unique_name, carrier) {
                        made_changes = true;
                    }
                }
                for alias in &entry.aliases {
                    if l.names.set_alias(alias, Some(&entry.unique_name)) {
                        made_changes = true;
                    }
                }
            }
        }
        if made_changes {
            let links = {
                let l = self.shared.lock();
                l.state.links_except_guid(Some(from_guid))
            };
            for (name, link) in links {
                log::debug!("[NAMES] propagating ExchangeNames to {}", name);
                if let Err(e) = link.send_exchange_names(entries) {
                    log::error!("[NAMES] failed to forward ExchangeNames to {}: {}", name, e);
                }
            }
        }
    }

    /// Apply a `NameChanged` received from the daemon `from_guid`.
    pub fn handle_name_changed(&self, from_guid: &BusGuid, msg: &NameChangedMsg) {
        log::debug!(
            "[NAMES] NameChanged(\"{}\", \"{}\" -> \"{}\") from {}",
            msg.alias,
            msg.old_owner,
            msg.new_owner,
            from_guid.short()
        );

        // A remote may never change a name belonging to this daemon.
        if (!msg.old_owner.is_empty() && name_owned_by(&msg.old_owner, &self.shared.guid))
            || (!msg.new_owner.is_empty() && name_owned_by(&msg.new_owner, &self.shared.guid))
        {
            return;
        }

        let mut made_changes = false;
        if msg.alias.starts_with(':') {
            let mut l = self.shared.lock();
            let carriers = l.state.b2bs_with_guid(from_guid);
            if carriers.is_empty() {
                log::warn!(
                    "[NAMES] NameChanged from unconnected daemon {}",
                    from_guid.short()
                );
                return;
            }
            if msg.new_owner.is_empty() {
                if l.state.virtuals.contains_key(&msg.old_owner) {
                    let mut now_empty = false;
                    if let Some(vep) = l.state.virtuals.get_mut(&msg.old_owner) {
                        made_changes = carriers.iter().any(|c| vep.can_use_route(c));
                        for carrier in &carriers {
                            if vep.remove_b2b(carrier) {
                                now_empty = true;
                            }
                        }
                    }
                    if now_empty {
                        l.remove_virtual(&msg.old_owner);
                    }
                }
            } else {
                for carrier in &carriers {
                    if l.add_virtual(&msg.alias, carrier) {
                        made_changes = true;
                    }
                }
            }
        } else {
            // Well-known alias: the sending daemon's controller must be known.
            let mut l = self.shared.lock();
            let sender_ctrl = controller_name(from_guid);
            if l.state.virtuals.contains_key(&sender_ctrl) {
                let owner = if msg.new_owner.is_empty() || !l.state.virtuals.contains_key(&msg.new_owner)
                {
                    None
                } else {
                    Some(msg.new_owner.as_str())
                };
                made_changes = l.names.set_alias(&msg.alias, owner);
            } else {
                log::warn!("[NAMES] no virtual endpoint for controller {}", sender_ctrl);
            }
        }

        if made_changes {
            let links = {
                let l = self.shared.lock();
                l.state.links_except_guid(Some(from_guid))
            };
            for (name, link) in links {
                log::debug!("[NAMES] propagating NameChanged to {}", name);
                if let Err(e) =
                    link.send_name_changed(&msg.alias, &msg.old_owner, &msg.new_owner)
                {
                    log::error!("[NAMES] failed to forward NameChanged to {}: {}", name, e);
                }
            }
        }
    }

    // ========================================================================
    // Local ownership changes
    // ========================================================================

    /// React to a name-table mutation on this daemon: sweep sessions for a
    /// departed unique name, tell the siblings, and drop the departed owner's
    /// advertise/discover registrations.
    pub(crate) fn local_name_owner_changed(
        &self,
        alias: &str,
        old_owner: Option<&str>,
        new_owner: Option<&str>,
    ) {
        let Some(unique) = old_owner.or(new_owner) else {
            log::warn!("[NAMES] ownership change of \"{}\" without any owner", alias);
            return;
        };

        // Well-known ownership changes involving a bus controller are not
        // propagated (every daemon already knows every controller).
        if !alias.starts_with(':') && unique.ends_with(".1") {
            return;
        }

        if new_owner.is_none() && alias.starts_with(':') {
            self.sweep_departed_endpoint(alias);
        }

        if !name_owned_by(unique, &self.shared.guid) {
            return;
        }

        self.broadcast_name_changed(alias, old_owner.unwrap_or(""), new_owner.unwrap_or(""));

        if new_owner.is_none() {
            if alias.starts_with(':') {
                // Departed unique name: retire its advertisements and
                // discovery registrations through the normal cancel paths.
                let (adverts, prefixes) = {
                    let l = self.shared.lock();
                    (
                        l.state.advertise.owned_by(alias),
                        l.state.discover.prefixes_of(alias),
                    )
                };
                for (name, mask) in adverts {
                    if let Err(e) = self.proc_cancel_advertise(alias, &name, mask) {
                        log::error!("[NAMES] cancel advertise \"{}\" failed: {}", name, e);
                    }
                }
                for prefix in prefixes {
                    if let Err(e) = self.proc_cancel_find(alias, &prefix) {
                        log::error!("[NAMES] cancel discovery \"{}\" failed: {}", prefix, e);
                    }
                }
            } else {
                // Dropped local well-known name: flush the locally injected
                // record so local discoverers see it disappear.
                let has_local_record = {
                    let l = self.shared.lock();
                    l.state
                        .name_map
                        .records(alias)
                        .iter()
                        .any(|r| r.transport & TRANSPORT_LOCAL != 0)
                };
                if has_local_record {
                    let guid = self.shared.guid.short().to_string();
                    self.found_names(
                        LOCAL_BUS_ADDR,
                        &guid,
                        TRANSPORT_LOCAL,
                        Some(std::slice::from_ref(&alias.to_string())),
                        0,
                    );
                }
            }
        }
    }
}

/// True iff `vep_name` stays reachable when every link to `exclude` is gone.
fn can_route_without(
    l: &crate::bus::shared::Locked<'_>,
    vep_name: &str,
    exclude: &BusGuid,
) -> bool {
    let Some(vep) = l.state.virtuals.get(vep_name) else {
        return false;
    };
    vep.b2b_names().iter().any(|b2b| {
        l.state
            .b2bs
            .get(b2b)
            .is_some_and(|ep| ep.remote_guid() != exclude)
    })
}
