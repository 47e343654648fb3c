// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! # crossbus - peer-to-peer message bus daemon core
//!
//! The session-and-routing core of a software bus daemon. It federates local
//! client connections and links to sibling daemons into one logical bus:
//! clients discover each other by well-known name, bind and join *sessions*
//! (logical channels with negotiated options), and exchange messages routed
//! through the daemon or over a raw socket handed off after setup.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Embedding daemon                             |
//! |     message codec | client IPC | transports | authentication        |
//! +---------------------------------------------------------------------+
//! |                           BusCore                                   |
//! |   SessionController -> RouteTable -> endpoint registry              |
//! |         |                                ^                          |
//! |   Discovery / AdvertiseMap        NameOwnerTracker                  |
//! +---------------------------------------------------------------------+
//! |  name table (unique names, aliases)  |  state (sessions, routes,    |
//! |  guarded by NameTableLock            |  maps) guarded by StateLock  |
//! +---------------------------------------------------------------------+
//! ```
//!
//! The codec, transports, authentication and the client-facing object system
//! are external collaborators reached through the traits in [`transport`] and
//! [`bus::EventSink`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use crossbus::{BusCore, SessionOpts};
//! # use crossbus::bus::Result;
//! # struct MySink;
//! # impl crossbus::bus::EventSink for MySink {
//! #     fn accept_session_joiner(&self, _: &str, _: u16, _: u32, _: &str, _: &SessionOpts) -> Result<bool> { Ok(true) }
//! #     fn session_joined(&self, _: &str, _: u16, _: u32, _: &str) {}
//! #     fn session_lost(&self, _: &str, _: u32) {}
//! #     fn mp_session_changed(&self, _: &str, _: u32, _: &str, _: bool) {}
//! #     fn found_advertised_name(&self, _: &str, _: &str, _: u16, _: &str) {}
//! #     fn lost_advertised_name(&self, _: &str, _: &str, _: u16, _: &str) {}
//! # }
//!
//! fn main() -> Result<()> {
//!     let core = BusCore::builder()
//!         .event_sink(std::sync::Arc::new(MySink))
//!         .build()?;
//!
//!     let host = core.register_local_client()?;
//!     let (_rc, port) = core.bind_session_port(&host, 0, SessionOpts::messages());
//!
//!     let joiner = core.register_local_client()?;
//!     let outcome = core.join_session(&joiner, &host, port, SessionOpts::messages());
//!     println!("joined session {:08x}", outcome.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bus`] - errors, GUIDs, the event surface, the [`BusCore`] facade
//! - [`protocol`] - session options, reply codes, inter-daemon messages
//! - [`session`] - session map, join/attach/leave, raw sessions
//! - [`router`] - the per-session route table
//! - [`endpoint`] - endpoint registry, virtual and bus-to-bus endpoints
//! - [`discovery`] - advertise/discover registries, TTL name map, reaper
//! - [`names`] - name-ownership propagation between daemons
//! - [`transport`] - transport plugin and per-link traits
//! - [`config`] - constants and runtime configuration

/// Public API home: errors, GUIDs, events, the core facade.
pub mod bus;
/// Global configuration (constants, runtime config cell).
pub mod config;
/// Name advertisement, discovery, and the TTL reaper.
pub mod discovery;
/// Endpoint registry: unique names, aliases, virtual and b2b endpoints.
pub mod endpoint;
/// Name-ownership propagation between sibling daemons.
pub mod names;
/// Wire-visible protocol surface (options, reply codes, messages).
pub mod protocol;
/// Per-session routing.
pub mod router;
/// The session subsystem (bind, join, attach, leave, raw sessions).
pub mod session;
/// Transport plugin surface.
pub mod transport;

pub use bus::{BusCore, BusCoreBuilder, BusGuid, Error, EventSink, Result, SessionId, SessionPort};
pub use protocol::{
    AttachSessionMsg, AttachSessionReply, BindReply, JoinReply, LeaveReply, NameChangedMsg,
    NameEntry, SessionOpts, TrafficType,
};
pub use session::JoinOutcome;
pub use transport::{
    B2bHandle, PeerLink, RawStream, Transport, TransportMask, TransportPolicy, TRANSPORT_ANY,
    TRANSPORT_LOCAL, TRANSPORT_TCP,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
