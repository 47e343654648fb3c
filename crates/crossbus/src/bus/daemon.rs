// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! The daemon core facade.
//!
//! [`BusCore`] wires the session controller, the route and name tables, the
//! discovery registries and the name-owner tracker over one shared two-lock
//! state. The embedding daemon constructs it via [`BusCore::builder`], feeds
//! it client method calls and inbound daemon-to-daemon traffic, and receives
//! local signals through its [`EventSink`].

use crate::bus::guid::controller_name;
use crate::bus::shared::Shared;
use crate::bus::{BusGuid, Error, EventSink, Result};
use crate::config::BusConfig;
use crate::endpoint::EndpointKind;
use crate::transport::{
    AllowAllPolicy, B2bHandle, Transport, TransportList, TransportPolicy,
};
use std::sync::Arc;

/// The session-and-routing core of one bus daemon.
#[derive(Clone)]
pub struct BusCore {
    pub(crate) shared: Arc<Shared>,
}

impl BusCore {
    /// Start building a core.
    #[must_use]
    pub fn builder() -> BusCoreBuilder {
        BusCoreBuilder::new()
    }

    /// This daemon's GUID.
    #[must_use]
    pub fn guid(&self) -> &BusGuid {
        &self.shared.guid
    }

    /// Unique name of this daemon's bus controller endpoint.
    #[must_use]
    pub fn controller_name(&self) -> String {
        controller_name(&self.shared.guid)
    }

    // ========================================================================
    // Local endpoint lifecycle
    // ========================================================================

    /// Register a newly connected local client; returns its unique name.
    pub fn register_local_client(&self) -> Result<String> {
        if self.shared.is_stopping() {
            return Err(Error::Stopping);
        }
        let name = {
            let mut l = self.shared.lock();
            l.names.alloc(EndpointKind::Client)
        };
        log::debug!("[BUS] local client {} connected", name);
        self.local_name_owner_changed(&name, None, Some(&name));
        Ok(name)
    }

    /// A local client disconnected: retire its unique name, sweep its
    /// sessions, advertisements and discoveries, and tell the siblings.
    pub fn unregister_local_client(&self, name: &str) {
        log::debug!("[BUS] local client {} disconnected", name);
        let aliases = {
            let mut l = self.shared.lock();
            if l.names.remove(name).is_none() {
                log::warn!("[BUS] unregister of unknown endpoint {}", name);
                return;
            }
            l.state.routes.remove_session_routes(name, 0);
            l.names.remove_aliases_of(name)
        };
        for alias in &aliases {
            self.local_name_owner_changed(alias, Some(name), None);
        }
        self.local_name_owner_changed(name, Some(name), None);
    }

    /// Set or clear a well-known alias for a local endpoint, propagating the
    /// ownership change like any other name-table mutation.
    pub fn set_local_alias(&self, alias: &str, owner: Option<&str>) -> Result<()> {
        if !crate::bus::guid::is_legal_bus_name(alias) || alias.starts_with(':') {
            return Err(Error::IllegalName(alias.to_string()));
        }
        let (changed, old) = {
            let mut l = self.shared.lock();
            if let Some(owner) = owner {
                if l.names.kind_of(owner).is_none() {
                    return Err(Error::NoEndpoint(owner.to_string()));
                }
            }
            let old = l.names.alias_owner(alias).map(str::to_string);
            (l.names.set_alias(alias, owner), old)
        };
        if changed {
            self.local_name_owner_changed(alias, old.as_deref(), owner);
        }
        Ok(())
    }

    /// Resolve a bus name to `(uniqueName, kind)` (diagnostics and tests).
    #[must_use]
    pub fn resolve_endpoint(&self, name: &str) -> Option<(String, EndpointKind)> {
        self.shared.lock().resolve(name)
    }

    // ========================================================================
    // Bus-to-bus link lifecycle
    // ========================================================================

    /// Register a freshly established bus-to-bus link (either side). Creates
    /// the b2b endpoint, the virtual endpoint for the remote controller, and
    /// pushes our name roster over the link. Returns the link's unique name.
    pub fn add_b2b_link(&self, handle: B2bHandle) -> Result<String> {
        if self.shared.is_stopping() {
            return Err(Error::Stopping);
        }
        let link = Arc::clone(&handle.link);
        let remote_ctrl = controller_name(&handle.remote_guid);
        let name = {
            let mut l = self.shared.lock();
            let name = match handle.unique_name {
                Some(n) => {
                    if !l.names.insert(&n, EndpointKind::BusToBus) {
                        return Err(Error::IllegalName(format!("b2b name {n} already taken")));
                    }
                    n
                }
                None => l.names.alloc(EndpointKind::BusToBus),
            };
            let ep = crate::endpoint::B2bEndpoint::new(
                &name,
                Arc::clone(&link),
                handle.remote_guid.clone(),
            );
            l.state.b2bs.insert(name.clone(), ep);
            l.add_virtual(&remote_ctrl, &name);
            name
        };
        log::info!(
            "[B2B] link {} up (remote {})",
            name,
            handle.remote_guid.short()
        );
        link.start();
        self.exchange_names_on(&name);
        Ok(name)
    }

    /// A bus-to-bus link terminated. Sweeps the sessions it carried, the
    /// virtual endpoints it reached, and announces the departures.
    pub fn remove_b2b_link(&self, name: &str) {
        self.handle_b2b_loss(name);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Names of the live bus-to-bus links.
    #[must_use]
    pub fn b2b_links(&self) -> Vec<String> {
        self.shared.lock().state.b2bs.keys().cloned().collect()
    }

    /// True iff a session row `(endpoint, id)` exists.
    #[must_use]
    pub fn has_session(&self, endpoint: &str, id: crate::bus::SessionId) -> bool {
        self.shared.lock().state.sessions.find(endpoint, id).is_some()
    }

    /// Sweep the tables for broken cross-references. Returns one line per
    /// violation; empty means healthy. Diagnostics only.
    #[must_use]
    pub fn invariant_violations(&self) -> Vec<String> {
        let l = self.shared.lock();
        let mut out = Vec::new();

        // Live sessions keep at least one present participant (or are still
        // initializing).
        for row in l.state.sessions.iter() {
            if row.id == 0 || row.is_initializing {
                continue;
            }
            let host_present =
                !row.session_host.is_empty() && l.names.kind_of(&row.session_host).is_some();
            let member_present = row
                .members
                .iter()
                .any(|m| l.names.kind_of(m).is_some());
            if !host_present && !member_present {
                out.push(format!(
                    "session {:08x} of {} has no present participant",
                    row.id, row.endpoint_name
                ));
            }
        }

        // Routes only reference registered endpoints and live links.
        for (id, src, dst, via) in l.state.routes.iter() {
            if l.names.kind_of(src).is_none() {
                out.push(format!("route {:08x} references missing src {}", id, src));
            }
            if l.names.kind_of(dst).is_none() {
                out.push(format!("route {:08x} references missing dst {}", id, dst));
            }
            if let Some(b2b) = via {
                if !l.state.b2bs.contains_key(b2b) {
                    out.push(format!("route {:08x} references dead link {}", id, b2b));
                }
            }
        }

        // Advertisement owners exist.
        for (name, entry) in l.state.advertise.iter() {
            if l.names.kind_of(&entry.owner).is_none() {
                out.push(format!(
                    "advertisement {} owned by missing endpoint {}",
                    name, entry.owner
                ));
            }
        }

        // No virtual endpoint wears our GUID.
        for name in l.state.virtuals.keys() {
            if crate::bus::guid::name_owned_by(name, &self.shared.guid) {
                out.push(format!("virtual endpoint {} shares the local guid", name));
            }
        }

        out
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Latch shutdown: no new join/attach workers start, outstanding workers
    /// and the reaper are joined.
    pub fn shutdown(&self) {
        self.shared.latch_stopping();
        self.shared.alert_reaper();
        self.shared.tasks.drain();
        log::info!("[BUS] core {} stopped", self.shared.guid.short());
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`BusCore`].
pub struct BusCoreBuilder {
    guid: Option<BusGuid>,
    config: BusConfig,
    transports: Vec<Arc<dyn Transport>>,
    policy: Arc<dyn TransportPolicy>,
    sink: Option<Arc<dyn EventSink>>,
}

impl BusCoreBuilder {
    fn new() -> Self {
        Self {
            guid: None,
            config: BusConfig::default(),
            transports: Vec::new(),
            policy: Arc::new(AllowAllPolicy),
            sink: None,
        }
    }

    /// Fix the daemon GUID (random when unset).
    #[must_use]
    pub fn guid(mut self, guid: BusGuid) -> Self {
        self.guid = Some(guid);
        self
    }

    /// Override the runtime configuration.
    #[must_use]
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a transport plugin.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Install a transport permission policy (allow-all by default).
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn TransportPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Install the local event surface. Required.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the core and start its background reaper.
    pub fn build(self) -> Result<BusCore> {
        let sink = self
            .sink
            .ok_or_else(|| Error::InvalidState("an event sink is required".to_string()))?;
        let guid = self.guid.unwrap_or_else(BusGuid::generate);
        let shared = Shared::new(
            guid,
            self.config,
            TransportList::new(self.transports),
            self.policy,
            sink,
        );
        let core = BusCore { shared };
        crate::discovery::reaper::spawn(&core);
        log::info!("[BUS] core {} started", core.shared.guid.short());
        Ok(core)
    }
}
