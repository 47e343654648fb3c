// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Process-wide state under the two-lock discipline.
//!
//! Two locks guard everything the core mutates:
//!
//! 1. `NameTableLock` - the endpoint registry ([`NameTable`]).
//! 2. `StateLock` - session map, route table, advertise/discover maps,
//!    name-discovery map, virtual endpoints, bus-to-bus endpoints.
//!
//! Consumers always take the name-table lock first and release it last; the
//! [`Shared::lock`] helper encodes the order and [`Locked`]'s field order
//! encodes the reverse release. Locks are *released* around every outbound
//! call (RPC, transport connect, signal push, sleep); endpoint references are
//! names, re-resolved after every such gap.

use crate::bus::events::EventSink;
use crate::bus::BusGuid;
use crate::config::{BusConfig, ConfigCell};
use crate::discovery::maps::{AdvertiseMap, DiscoverMap};
use crate::discovery::name_map::NameMap;
use crate::endpoint::{B2bEndpoint, EndpointKind, LinkRef, NameTable, VirtualEndpoint};
use crate::router::RouteTable;
use crate::session::tasks::TaskRegistry;
use crate::session::SessionMap;
use crate::transport::{TransportList, TransportPolicy};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

// ============================================================================
// State-lock tables
// ============================================================================

/// Everything guarded by `StateLock`.
pub(crate) struct CoreState {
    pub sessions: SessionMap,
    pub routes: RouteTable,
    pub advertise: AdvertiseMap,
    pub discover: DiscoverMap,
    pub name_map: NameMap,
    pub virtuals: BTreeMap<String, VirtualEndpoint>,
    pub b2bs: BTreeMap<String, B2bEndpoint>,
}

impl CoreState {
    fn new() -> Self {
        Self {
            sessions: SessionMap::default(),
            routes: RouteTable::new(),
            advertise: AdvertiseMap::default(),
            discover: DiscoverMap::default(),
            name_map: NameMap::default(),
            virtuals: BTreeMap::new(),
            b2bs: BTreeMap::new(),
        }
    }

    /// Push references to every b2b link whose remote daemon differs from
    /// `exclude_guid` (the forward-to-other-siblings pattern). Waiters are
    /// held by the returned guards; push after releasing the locks.
    pub fn links_except_guid(&self, exclude_guid: Option<&BusGuid>) -> Vec<(String, LinkRef)> {
        self.b2bs
            .values()
            .filter(|ep| exclude_guid != Some(ep.remote_guid()))
            .map(|ep| (ep.unique_name().to_string(), ep.hold()))
            .collect()
    }

    /// Names of every b2b endpoint connected to the daemon `guid`.
    pub fn b2bs_with_guid(&self, guid: &BusGuid) -> Vec<String> {
        self.b2bs
            .values()
            .filter(|ep| ep.remote_guid() == guid)
            .map(|ep| ep.unique_name().to_string())
            .collect()
    }

    /// Push references to every link connected to the daemon `guid`.
    pub fn links_to_guid(&self, guid: &BusGuid) -> Vec<(String, LinkRef)> {
        self.b2bs
            .values()
            .filter(|ep| ep.remote_guid() == guid)
            .map(|ep| (ep.unique_name().to_string(), ep.hold()))
            .collect()
    }
}

// ============================================================================
// The two-lock helper
// ============================================================================

/// Both guards, held together. Field order matters: `state` drops first, so
/// the state lock is released before the name-table lock.
pub(crate) struct Locked<'a> {
    pub state: MutexGuard<'a, CoreState>,
    pub names: MutexGuard<'a, NameTable>,
}

impl Locked<'_> {
    /// Resolve a bus name (unique or alias) to `(uniqueName, kind)`.
    pub fn resolve(&self, name: &str) -> Option<(String, EndpointKind)> {
        self.names.resolve(name)
    }

    /// Register (or extend) the virtual endpoint for a remote client behind
    /// `b2b`. Returns true iff the tables changed.
    pub fn add_virtual(&mut self, unique_name: &str, b2b: &str) -> bool {
        if let Some(vep) = self.state.virtuals.get_mut(unique_name) {
            return vep.add_b2b(b2b);
        }
        self.names.insert(unique_name, EndpointKind::Virtual);
        self.state
            .virtuals
            .insert(unique_name.to_string(), VirtualEndpoint::new(unique_name, b2b));
        true
    }

    /// Destroy a virtual endpoint: aliases, registry entry, routes, row in
    /// the virtual table. Must be called before any lock release that could
    /// publish the (now unreachable) name.
    pub fn remove_virtual(&mut self, unique_name: &str) {
        log::debug!("[B2B] removing virtual endpoint {}", unique_name);
        self.names.remove_aliases_of(unique_name);
        self.names.remove(unique_name);
        self.state.routes.remove_session_routes(unique_name, 0);
        self.state.virtuals.remove(unique_name);
    }
}

// ============================================================================
// Shared daemon state
// ============================================================================

/// The daemon core's shared value: both lock-guarded tables plus the
/// immutable collaborators every subsystem needs.
pub(crate) struct Shared {
    pub guid: BusGuid,
    pub config: ConfigCell,
    pub names: Mutex<NameTable>,
    pub state: Mutex<CoreState>,
    pub transports: TransportList,
    pub policy: Arc<dyn TransportPolicy>,
    pub sink: Arc<dyn EventSink>,
    pub stopping: AtomicBool,
    pub tasks: Arc<TaskRegistry>,
    reaper_alert: OnceLock<crossbeam::channel::Sender<()>>,
}

impl Shared {
    pub fn new(
        guid: BusGuid,
        config: BusConfig,
        transports: TransportList,
        policy: Arc<dyn TransportPolicy>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            names: Mutex::new(NameTable::new(guid.clone())),
            guid,
            config: crate::config::config_cell(config),
            state: Mutex::new(CoreState::new()),
            transports,
            policy,
            sink,
            stopping: AtomicBool::new(false),
            tasks: TaskRegistry::new(),
            reaper_alert: OnceLock::new(),
        })
    }

    /// Acquire both locks in order (names, then state).
    pub fn lock(&self) -> Locked<'_> {
        let names = self.names.lock();
        let state = self.state.lock();
        Locked { state, names }
    }

    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn latch_stopping(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Wire up the reaper's alert channel (once, at startup).
    pub fn set_reaper_alert(&self, tx: crossbeam::channel::Sender<()>) {
        let _ = self.reaper_alert.set(tx);
    }

    /// Wake the TTL reaper so it reschedules against fresh records.
    pub fn alert_reaper(&self) {
        if let Some(tx) = self.reaper_alert.get() {
            let _ = tx.try_send(());
        }
    }

    /// Snapshot of the live config.
    pub fn config(&self) -> Arc<BusConfig> {
        self.config.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Result;
    use crate::protocol::opts::SessionOpts;
    use crate::transport::TransportMask;

    struct NullSink;

    impl EventSink for NullSink {
        fn accept_session_joiner(
            &self,
            _host: &str,
            _port: u16,
            _id: u32,
            _joiner: &str,
            _opts: &SessionOpts,
        ) -> Result<bool> {
            Ok(true)
        }
        fn session_joined(&self, _host: &str, _port: u16, _id: u32, _joiner: &str) {}
        fn session_lost(&self, _dest: &str, _id: u32) {}
        fn mp_session_changed(&self, _dest: &str, _id: u32, _member: &str, _added: bool) {}
        fn found_advertised_name(&self, _d: &str, _n: &str, _t: TransportMask, _p: &str) {}
        fn lost_advertised_name(&self, _d: &str, _n: &str, _t: TransportMask, _p: &str) {}
    }

    fn shared() -> Arc<Shared> {
        Shared::new(
            BusGuid::from_short("deadbeef").unwrap(),
            BusConfig::default(),
            TransportList::default(),
            Arc::new(crate::transport::AllowAllPolicy),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn virtual_endpoint_lifecycle() {
        let s = shared();
        let mut l = s.lock();
        assert!(l.add_virtual(":0a0a0a0a.2", ":deadbeef.5"));
        assert!(!l.add_virtual(":0a0a0a0a.2", ":deadbeef.5"));
        assert_eq!(
            l.resolve(":0a0a0a0a.2").map(|(_, k)| k),
            Some(EndpointKind::Virtual)
        );
        l.names.set_alias("com.remote.svc", Some(":0a0a0a0a.2"));
        l.remove_virtual(":0a0a0a0a.2");
        assert!(l.resolve(":0a0a0a0a.2").is_none());
        assert!(l.resolve("com.remote.svc").is_none());
    }

    #[test]
    fn stopping_latch() {
        let s = shared();
        assert!(!s.is_stopping());
        s.latch_stopping();
        assert!(s.is_stopping());
    }
}
