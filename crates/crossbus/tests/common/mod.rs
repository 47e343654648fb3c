// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Multi-daemon test harness.
//!
//! Builds several `BusCore` instances in one process and wires them with an
//! in-memory transport whose links call straight into the peer's handlers.
//! Each direction buffers outbound signals until the receiving side has
//! registered its bus-to-bus endpoint, mimicking socket buffering during
//! link bring-up.

#![allow(dead_code)] // not every test file uses every helper

use crossbus::bus::Result;
use crossbus::protocol::messages::{AttachSessionMsg, AttachSessionReply, NameEntry};
use crossbus::{
    B2bHandle, BusCore, BusGuid, EventSink, NameChangedMsg, PeerLink, RawStream, SessionId,
    SessionOpts, Transport, TransportMask, TRANSPORT_TCP,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

// ============================================================================
// Recording sink
// ============================================================================

/// Everything a local client would observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Joined {
        host: String,
        port: u16,
        id: SessionId,
        joiner: String,
    },
    Lost {
        dest: String,
        id: SessionId,
    },
    MpChanged {
        dest: String,
        id: SessionId,
        member: String,
        added: bool,
    },
    FoundName {
        dest: String,
        name: String,
        transport: TransportMask,
        prefix: String,
    },
    LostName {
        dest: String,
        name: String,
        transport: TransportMask,
        prefix: String,
    },
}

/// Sink that records events and answers accept probes from a flag.
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    cv: Condvar,
    accept: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            cv: Condvar::new(),
            accept: AtomicBool::new(true),
        })
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
        self.cv.notify_all();
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Wait until an event matching `pred` has been recorded.
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> Option<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(e) = events.iter().find(|e| pred(e)) {
                return Some(e.clone());
            }
            let left = deadline.checked_duration_since(Instant::now())?;
            let (guard, res) = self.cv.wait_timeout(events, left).unwrap();
            events = guard;
            if res.timed_out() {
                return events.iter().find(|e| pred(e)).cloned();
            }
        }
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn accept_session_joiner(
        &self,
        _host: &str,
        _port: u16,
        _id: SessionId,
        _joiner: &str,
        _opts: &SessionOpts,
    ) -> Result<bool> {
        Ok(self.accept.load(Ordering::SeqCst))
    }

    fn session_joined(&self, host: &str, port: u16, id: SessionId, joiner: &str) {
        self.push(Event::Joined {
            host: host.to_string(),
            port,
            id,
            joiner: joiner.to_string(),
        });
    }

    fn session_lost(&self, dest: &str, id: SessionId) {
        self.push(Event::Lost {
            dest: dest.to_string(),
            id,
        });
    }

    fn mp_session_changed(&self, dest: &str, id: SessionId, member: &str, added: bool) {
        self.push(Event::MpChanged {
            dest: dest.to_string(),
            id,
            member: member.to_string(),
            added,
        });
    }

    fn found_advertised_name(&self, dest: &str, name: &str, transport: TransportMask, prefix: &str) {
        self.push(Event::FoundName {
            dest: dest.to_string(),
            name: name.to_string(),
            transport,
            prefix: prefix.to_string(),
        });
    }

    fn lost_advertised_name(&self, dest: &str, name: &str, transport: TransportMask, prefix: &str) {
        self.push(Event::LostName {
            dest: dest.to_string(),
            name: name.to_string(),
            transport,
            prefix: prefix.to_string(),
        });
    }
}

// ============================================================================
// In-memory wire
// ============================================================================

enum Queued {
    Exchange(Vec<NameEntry>),
    NameChanged(NameChangedMsg),
    Detach(SessionId, String),
}

struct Inbox {
    ready: bool,
    queue: Vec<Queued>,
}

#[derive(Default)]
struct StreamSlots {
    created: bool,
    acceptor_end: Option<RawStream>,
    connector_end: Option<RawStream>,
}

/// Probe traffic counters, one per wire (shared by both link halves).
#[derive(Default)]
pub struct WireStats {
    pub probe_reqs: AtomicU64,
    pub probe_acks: AtomicU64,
}

/// One direction of a wire: a link held by `owner`, delivering to `peer`.
struct MemLink {
    owner: BusCore,
    peer: BusCore,
    /// Inbound buffer of the owner (drained by `start`).
    self_inbox: Arc<Mutex<Inbox>>,
    /// Inbound buffer of the peer (sends land here until it is ready).
    peer_inbox: Arc<Mutex<Inbox>>,
    stream: Arc<Mutex<StreamSlots>>,
    stats: Arc<WireStats>,
    is_acceptor: bool,
}

impl MemLink {
    fn deliver(&self, item: Queued) {
        let from = self.owner.guid().clone();
        match item {
            Queued::Exchange(entries) => self.peer.handle_exchange_names(&from, &entries),
            Queued::NameChanged(msg) => self.peer.handle_name_changed(&from, &msg),
            Queued::Detach(id, member) => self.peer.handle_detach_session(&from, id, &member),
        }
    }

    fn send(&self, item: Queued) {
        {
            let mut inbox = self.peer_inbox.lock().unwrap();
            if !inbox.ready {
                inbox.queue.push(item);
                return;
            }
        }
        self.deliver(item);
    }
}

impl PeerLink for MemLink {
    fn remote_guid(&self) -> BusGuid {
        self.peer.guid().clone()
    }

    fn start(&self) {
        // The owner registered its endpoint: drain everything the peer sent
        // while we were coming up.
        let queued: Vec<Queued> = {
            let mut inbox = self.self_inbox.lock().unwrap();
            inbox.ready = true;
            std::mem::take(&mut inbox.queue)
        };
        let from = self.peer.guid().clone();
        for item in queued {
            match item {
                Queued::Exchange(entries) => self.owner.handle_exchange_names(&from, &entries),
                Queued::NameChanged(msg) => self.owner.handle_name_changed(&from, &msg),
                Queued::Detach(id, member) => self.owner.handle_detach_session(&from, id, &member),
            }
        }
    }

    fn call_attach_session(
        &self,
        msg: &AttachSessionMsg,
        outgoing_session_id: SessionId,
        _timeout: Duration,
    ) -> Result<AttachSessionReply> {
        Ok(self.peer.handle_attach_session(msg, outgoing_session_id))
    }

    fn call_get_session_info(
        &self,
        session_host: &str,
        session_port: u16,
        opts: &SessionOpts,
    ) -> Result<Vec<String>> {
        Ok(self
            .peer
            .handle_get_session_info(session_host, session_port, opts))
    }

    fn send_detach_session(&self, id: SessionId, member: &str) -> Result<()> {
        self.send(Queued::Detach(id, member.to_string()));
        Ok(())
    }

    fn send_exchange_names(&self, entries: &[NameEntry]) -> Result<()> {
        self.send(Queued::Exchange(entries.to_vec()));
        Ok(())
    }

    fn send_name_changed(&self, alias: &str, old_owner: &str, new_owner: &str) -> Result<()> {
        self.send(Queued::NameChanged(NameChangedMsg {
            alias: alias.to_string(),
            old_owner: old_owner.to_string(),
            new_owner: new_owner.to_string(),
        }));
        Ok(())
    }

    fn send_probe_req(&self) -> Result<()> {
        self.stats.probe_reqs.fetch_add(1, Ordering::SeqCst);
        self.peer.handle_probe_req(self.owner.guid());
        Ok(())
    }

    fn send_probe_ack(&self) -> Result<()> {
        self.stats.probe_acks.fetch_add(1, Ordering::SeqCst);
        self.peer.handle_probe_ack(self.owner.guid());
        Ok(())
    }

    fn take_stream(&self) -> Result<RawStream> {
        let mut slots = self.stream.lock().unwrap();
        if !slots.created {
            let (a, b) = socket2::Socket::pair(socket2::Domain::UNIX, socket2::Type::STREAM, None)
                .map_err(crossbus::Error::Io)?;
            slots.acceptor_end = Some(a);
            slots.connector_end = Some(b);
            slots.created = true;
        }
        let end = if self.is_acceptor {
            slots.acceptor_end.take()
        } else {
            slots.connector_end.take()
        };
        end.ok_or(crossbus::Error::NotConnected)
    }

    fn set_link_timeout(&self, secs: u32) -> Result<u32> {
        Ok(secs)
    }
}

// ============================================================================
// Mesh and transport
// ============================================================================

/// Registry of daemons by bus address.
#[derive(Default)]
pub struct Mesh {
    daemons: Mutex<HashMap<String, BusCore>>,
}

impl Mesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, addr: &str, core: BusCore) {
        self.daemons.lock().unwrap().insert(addr.to_string(), core);
    }

    fn get(&self, addr: &str) -> Option<BusCore> {
        self.daemons.lock().unwrap().get(addr).cloned()
    }
}

/// The in-memory transport plugin, one per daemon.
pub struct MemTransport {
    mesh: Arc<Mesh>,
    addr: String,
    self_core: OnceLock<BusCore>,
    pub advertised: Mutex<Vec<(String, bool)>>,
    pub discovering: Mutex<Vec<(String, bool)>>,
    /// Probe counters of every wire this transport initiated.
    pub wires: Mutex<Vec<Arc<WireStats>>>,
}

impl MemTransport {
    pub fn new(mesh: &Arc<Mesh>, addr: &str) -> Arc<Self> {
        Arc::new(Self {
            mesh: Arc::clone(mesh),
            addr: addr.to_string(),
            self_core: OnceLock::new(),
            advertised: Mutex::new(Vec::new()),
            discovering: Mutex::new(Vec::new()),
            wires: Mutex::new(Vec::new()),
        })
    }

    /// Names with a currently enabled advertisement.
    pub fn active_advertisements(&self) -> Vec<String> {
        let mut active: Vec<String> = Vec::new();
        for (name, enabled) in self.advertised.lock().unwrap().iter() {
            if *enabled {
                active.push(name.clone());
            } else {
                active.retain(|n| n != name);
            }
        }
        active
    }

    /// Prefixes with currently enabled discovery.
    pub fn active_discoveries(&self) -> Vec<String> {
        let mut active: Vec<String> = Vec::new();
        for (prefix, enabled) in self.discovering.lock().unwrap().iter() {
            if *enabled {
                active.push(prefix.clone());
            } else {
                active.retain(|p| p != prefix);
            }
        }
        active
    }
}

impl Transport for MemTransport {
    fn mask(&self) -> TransportMask {
        TRANSPORT_TCP
    }

    fn name(&self) -> &str {
        "mem"
    }

    fn connect(&self, bus_addr: &str, _opts: &SessionOpts) -> Result<B2bHandle> {
        let target = self
            .mesh
            .get(bus_addr)
            .ok_or_else(|| crossbus::Error::ConnectFailed(bus_addr.to_string()))?;
        let me = self
            .self_core
            .get()
            .ok_or(crossbus::Error::NotConnected)?
            .clone();

        let inbox_acceptor = Arc::new(Mutex::new(Inbox {
            ready: false,
            queue: Vec::new(),
        }));
        let inbox_connector = Arc::new(Mutex::new(Inbox {
            ready: false,
            queue: Vec::new(),
        }));
        let stream = Arc::new(Mutex::new(StreamSlots::default()));
        let stats = Arc::new(WireStats::default());
        self.wires.lock().unwrap().push(Arc::clone(&stats));

        // Link held by the acceptor, delivering to us.
        let acceptor_link = Arc::new(MemLink {
            owner: target.clone(),
            peer: me.clone(),
            self_inbox: Arc::clone(&inbox_acceptor),
            peer_inbox: Arc::clone(&inbox_connector),
            stream: Arc::clone(&stream),
            stats: Arc::clone(&stats),
            is_acceptor: true,
        });
        // Link held by us, delivering to the acceptor.
        let connector_link = Arc::new(MemLink {
            owner: me.clone(),
            peer: target.clone(),
            self_inbox: inbox_connector,
            peer_inbox: inbox_acceptor,
            stream,
            stats,
            is_acceptor: false,
        });

        // The accepting daemon registers first and allocates the shared name.
        let name = target.add_b2b_link(B2bHandle {
            link: acceptor_link,
            remote_guid: me.guid().clone(),
            unique_name: None,
        })?;

        Ok(B2bHandle {
            link: connector_link,
            remote_guid: target.guid().clone(),
            unique_name: Some(name),
        })
    }

    fn listen_addrs(&self, _opts: &SessionOpts) -> Vec<String> {
        vec![self.addr.clone()]
    }

    fn enable_advertisement(&self, name: &str) -> Result<()> {
        self.advertised.lock().unwrap().push((name.to_string(), true));
        Ok(())
    }

    fn disable_advertisement(&self, name: &str, _last: bool) {
        self.advertised.lock().unwrap().push((name.to_string(), false));
    }

    fn enable_discovery(&self, prefix: &str) {
        self.discovering.lock().unwrap().push((prefix.to_string(), true));
    }

    fn disable_discovery(&self, prefix: &str) {
        self.discovering.lock().unwrap().push((prefix.to_string(), false));
    }
}

// ============================================================================
// Daemon bundle
// ============================================================================

/// One daemon with its sink and transport.
pub struct Daemon {
    pub core: BusCore,
    pub sink: Arc<RecordingSink>,
    pub transport: Arc<MemTransport>,
    pub addr: String,
}

impl Daemon {
    /// Build a daemon and register it in the mesh under `mem:<name>`.
    pub fn new(mesh: &Arc<Mesh>, name: &str) -> Daemon {
        let _ = env_logger::builder().is_test(true).try_init();
        let addr = format!("mem:{name}");
        let sink = RecordingSink::new();
        let transport = MemTransport::new(mesh, &addr);
        let core = BusCore::builder()
            .event_sink(Arc::clone(&sink) as Arc<dyn EventSink>)
            .transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .build()
            .expect("core builds");
        transport.self_core.set(core.clone()).ok().expect("fresh cell");
        mesh.register(&addr, core.clone());
        Daemon {
            core,
            sink,
            transport,
            addr,
        }
    }

    /// Connect this daemon to `other` (as the initiating side); returns the
    /// shared link name.
    pub fn connect_to(&self, other: &Daemon) -> String {
        let handle = self
            .transport
            .connect(&other.addr, &SessionOpts::messages())
            .expect("connect");
        let name = handle.unique_name.clone().expect("shared link name");
        self.core.add_b2b_link(handle).expect("register link");
        name
    }

    /// Feed an advertisement of `other` into this daemon's name map, the way
    /// the transport's discovery would.
    pub fn learn_name(&self, other: &Daemon, name: &str, ttl_ms: u32) {
        self.core.found_names(
            &other.addr,
            other.core.guid().short(),
            TRANSPORT_TCP,
            Some(std::slice::from_ref(&name.to_string())),
            ttl_ms,
        );
    }
}
