// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Transport plugin surface.
//!
//! Physical transports are external collaborators. The core drives them
//! through two small traits:
//!
//! - [`Transport`] - per-transport-technology plugin: connect to a bus
//!   address, report listen addresses, toggle discovery/advertisement.
//! - [`PeerLink`] - per-established-link surface: the daemon-to-daemon RPCs
//!   and signals, plus the raw-session teardown hooks.
//!
//! A [`TransportMask`] is a u16 bitmask; advertised names, discovery
//! requests and session options all carry one.

use crate::bus::{BusGuid, Result, SessionId};
use crate::protocol::messages::{AttachSessionMsg, AttachSessionReply, NameEntry};
use crate::protocol::opts::SessionOpts;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Transport masks
// ============================================================================

/// Bitmask selecting transport technologies.
pub type TransportMask = u16;

/// No transport.
pub const TRANSPORT_NONE: TransportMask = 0x0000;
/// The local (same host) transport.
pub const TRANSPORT_LOCAL: TransportMask = 0x0001;
/// Bluetooth.
pub const TRANSPORT_BLUETOOTH: TransportMask = 0x0002;
/// TCP.
pub const TRANSPORT_TCP: TransportMask = 0x0004;
/// UDP.
pub const TRANSPORT_UDP: TransportMask = 0x0008;
/// Wired LAN.
pub const TRANSPORT_LAN: TransportMask = 0x0010;
/// Any transport.
pub const TRANSPORT_ANY: TransportMask = 0xFFFF;

/// The remote (network) transports. Name-map records on these bits are
/// flushed when the last advertiser and the last discoverer are gone.
pub const TRANSPORT_REMOTE: TransportMask = TRANSPORT_TCP | TRANSPORT_UDP | TRANSPORT_LAN;

/// Pseudo bus address under which local advertisements are injected into the
/// name-discovery map.
pub const LOCAL_BUS_ADDR: &str = "local:";

// ============================================================================
// Raw streams
// ============================================================================

/// A connected byte-stream socket extracted from a torn-down link or created
/// for a raw session. Ownership of the descriptor follows the value.
pub type RawStream = socket2::Socket;

// ============================================================================
// Per-link surface
// ============================================================================

/// One established bus-to-bus link.
///
/// All methods may block on I/O and are only invoked with the core locks
/// released.
pub trait PeerLink: Send + Sync {
    /// Short GUID of the daemon on the other side.
    fn remote_guid(&self) -> BusGuid;

    /// The transport may begin delivering inbound traffic for this link.
    /// Called once, after the local bus-to-bus endpoint is registered.
    fn start(&self) {}

    /// `AttachSession` method call. `outgoing_session_id` rides the message
    /// header (non-zero for multipoint fan-out over an existing session).
    fn call_attach_session(
        &self,
        msg: &AttachSessionMsg,
        outgoing_session_id: SessionId,
        timeout: Duration,
    ) -> Result<AttachSessionReply>;

    /// `GetSessionInfo` method call; returns candidate bus addresses.
    fn call_get_session_info(
        &self,
        session_host: &str,
        session_port: u16,
        opts: &SessionOpts,
    ) -> Result<Vec<String>>;

    /// `DetachSession` signal.
    fn send_detach_session(&self, id: SessionId, member: &str) -> Result<()>;

    /// `ExchangeNames` signal.
    fn send_exchange_names(&self, entries: &[NameEntry]) -> Result<()>;

    /// `NameChanged` signal.
    fn send_name_changed(&self, alias: &str, old_owner: &str, new_owner: &str) -> Result<()>;

    /// `ProbeReq` signal: idle-link probe. Links whose transport keeps its
    /// own liveness state may leave the default no-op in place.
    fn send_probe_req(&self) -> Result<()> {
        Ok(())
    }

    /// `ProbeAck` signal: answer to an idle-link probe.
    fn send_probe_ack(&self) -> Result<()> {
        Ok(())
    }

    /// Arm the link to stop reading after the next reply it pushes. Required
    /// before negotiating a raw session over it, so no stream bytes are
    /// consumed by the message codec.
    fn pause_after_reply(&self) -> Result<()> {
        Ok(())
    }

    /// Tear the link down and hand over its connected socket. After this the
    /// link carries no further messages.
    fn take_stream(&self) -> Result<RawStream>;

    /// Request an idle-probe timeout (seconds); returns the granted value,
    /// 0 meaning "no timeout". Links that cannot probe return
    /// [`crate::bus::Error::Unsupported`].
    fn set_link_timeout(&self, secs: u32) -> Result<u32> {
        let _ = secs;
        Err(crate::bus::Error::Unsupported)
    }
}

/// Result of a successful transport connect (or accept).
pub struct B2bHandle {
    /// The established link.
    pub link: Arc<dyn PeerLink>,
    /// Short GUID of the remote daemon (learned during the link handshake).
    pub remote_guid: BusGuid,
    /// Unique name of the bus-to-bus endpoint. Both sides share one name,
    /// allocated by the accepting daemon; `None` asks the registering side to
    /// allocate it (accept path).
    pub unique_name: Option<String>,
}

// ============================================================================
// Transport plugins
// ============================================================================

/// One transport technology.
pub trait Transport: Send + Sync {
    /// The mask bit(s) this transport serves.
    fn mask(&self) -> TransportMask;

    /// Short name, also the bus-address scheme (e.g. `tcp` for
    /// `tcp:addr=x,port=y`).
    fn name(&self) -> &str;

    /// Whether this transport can carry daemon-to-daemon links.
    fn is_bus_to_bus(&self) -> bool {
        true
    }

    /// True iff this transport understands `bus_addr`.
    fn handles_addr(&self, bus_addr: &str) -> bool {
        bus_addr
            .split_once(':')
            .is_some_and(|(scheme, _)| scheme == self.name())
    }

    /// Establish a daemon-to-daemon link.
    fn connect(&self, bus_addr: &str, opts: &SessionOpts) -> Result<B2bHandle>;

    /// Bus addresses this daemon listens on, for `GetSessionInfo`.
    fn listen_addrs(&self, opts: &SessionOpts) -> Vec<String>;

    /// Start announcing `name` on this transport.
    fn enable_advertisement(&self, name: &str) -> Result<()>;

    /// Stop announcing `name`. `last` is true when the daemon-wide advertise
    /// map just became empty.
    fn disable_advertisement(&self, name: &str, last: bool);

    /// Start hunting for names matching `prefix`.
    fn enable_discovery(&self, prefix: &str);

    /// Stop hunting for `prefix`.
    fn disable_discovery(&self, prefix: &str);
}

/// Registry of transport plugins.
#[derive(Clone, Default)]
pub struct TransportList {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportList {
    #[must_use]
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// All registered transports.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports.iter()
    }

    /// The transport that understands `bus_addr`, if any.
    #[must_use]
    pub fn for_addr(&self, bus_addr: &str) -> Option<&Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.handles_addr(bus_addr))
    }

    /// Union of the registered transports' masks.
    #[must_use]
    pub fn mask(&self) -> TransportMask {
        self.transports.iter().fold(0, |m, t| m | t.mask())
    }
}

// ============================================================================
// Permission policy
// ============================================================================

/// Per-owner transport permission. The platform permission database is an
/// external collaborator; only the resulting masks enter the core (and feed
/// the transport-forbid map).
pub trait TransportPolicy: Send + Sync {
    /// The subset of `requested` that `owner` may use.
    fn allowed(&self, owner: &str, requested: TransportMask) -> TransportMask;
}

/// Policy that grants every request.
pub struct AllowAllPolicy;

impl TransportPolicy for AllowAllPolicy {
    fn allowed(&self, _owner: &str, requested: TransportMask) -> TransportMask {
        requested
    }
}
