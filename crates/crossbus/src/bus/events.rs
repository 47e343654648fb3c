// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Local event surface.
//!
//! The core does not talk to clients directly; the embedding object system
//! implements [`EventSink`] and turns these upcalls into signals and method
//! calls on the client IPC transport. Every method is invoked with both core
//! locks released, so an implementation may call back into the core (the
//! accept callback commonly triggers `GetSessionFd` or `LeaveSession`).

use crate::bus::{Result, SessionId, SessionPort};
use crate::protocol::opts::SessionOpts;
use crate::transport::TransportMask;

/// Upcalls from the core to locally connected clients.
pub trait EventSink: Send + Sync {
    /// Ask the session host whether `joiner` may join. A `false` return
    /// rejects the join; an error fails it.
    fn accept_session_joiner(
        &self,
        host: &str,
        port: SessionPort,
        id: SessionId,
        joiner: &str,
        opts: &SessionOpts,
    ) -> Result<bool>;

    /// A joiner was admitted; delivered to the session host only.
    fn session_joined(&self, host: &str, port: SessionPort, id: SessionId, joiner: &str);

    /// The session is gone for `dest` (all other participants departed or the
    /// carrying link was lost). Synthesised exactly once per session per
    /// participant.
    fn session_lost(&self, dest: &str, id: SessionId);

    /// Multipoint roster delta delivered to `dest`.
    fn mp_session_changed(&self, dest: &str, id: SessionId, member: &str, added: bool);

    /// A name matching one of `dest`'s discovery prefixes appeared.
    fn found_advertised_name(
        &self,
        dest: &str,
        name: &str,
        transport: TransportMask,
        prefix: &str,
    );

    /// A previously reported name expired or was cancelled.
    fn lost_advertised_name(&self, dest: &str, name: &str, transport: TransportMask, prefix: &str);
}
