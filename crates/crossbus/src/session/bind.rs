// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Bind and unbind of session ports, per-session link timeouts, and the
//! idle-link probe exchange that backs them.

use crate::bus::{BusCore, BusGuid, SessionId, SessionPort};
use crate::config::SESSION_PORT_ANY;
use crate::endpoint::EndpointKind;
use crate::protocol::opts::{SessionOpts, TrafficType};
use crate::protocol::reply::{BindReply, SetLinkTimeoutReply, UnbindReply};
use crate::session::SessionEntry;

impl BusCore {
    /// `BindSessionPort`: reserve `(sender, port)` for incoming joins.
    /// `port == 0` asks for an unused port; the chosen port is returned.
    pub fn bind_session_port(
        &self,
        sender: &str,
        port: SessionPort,
        opts: SessionOpts,
    ) -> (BindReply, SessionPort) {
        let granted = self.shared.policy.allowed(sender, opts.transports);
        if granted == 0 {
            return (BindReply::Failed, port);
        }
        let opts = SessionOpts {
            transports: granted,
            ..opts
        };

        // Raw-unreliable is unsupported; raw-reliable cannot be multipoint.
        if opts.traffic == TrafficType::RawUnreliable
            || (opts.traffic == TrafficType::RawReliable && opts.is_multipoint)
        {
            return (BindReply::InvalidOpts, port);
        }

        let mut l = self.shared.lock();
        if l.names.kind_of(sender).is_none() {
            return (BindReply::Failed, port);
        }

        let port = if port == SESSION_PORT_ANY {
            let base = self.shared.config().auto_port_base;
            match l.state.sessions.next_free_port(sender, base) {
                Some(p) => p,
                None => return (BindReply::Failed, port),
            }
        } else {
            if l.state.sessions.find_reservation(sender, port).is_some() {
                return (BindReply::AlreadyExists, port);
            }
            port
        };

        l.state
            .sessions
            .insert(SessionEntry::reservation(sender, port, opts));
        log::debug!("[SESSION] BindSessionPort({}, {})", sender, port);
        (BindReply::Success, port)
    }

    /// `UnbindSessionPort`: drop the reservation `(sender, port)`.
    pub fn unbind_session_port(&self, sender: &str, port: SessionPort) -> UnbindReply {
        let mut l = self.shared.lock();
        if l.state.sessions.remove_reservation(sender, port).is_some() {
            log::debug!("[SESSION] UnbindSessionPort({}, {})", sender, port);
            UnbindReply::Success
        } else {
            UnbindReply::BadPort
        }
    }

    /// `SetLinkTimeout`: request idle-probe timeouts on every link carrying
    /// session `id` for `sender`. Returns the granted timeout (0 = none).
    pub fn set_link_timeout(
        &self,
        sender: &str,
        id: SessionId,
        timeout_secs: u32,
    ) -> (SetLinkTimeoutReply, u32) {
        let mut found_ep = false;
        let mut no_dest_support = false;
        let mut actual = timeout_secs;

        // Collect the links under lock, apply the timeouts with it released.
        let links = {
            let l = self.shared.lock();
            let Some(entry) = l.state.sessions.find(sender, id) else {
                return (SetLinkTimeoutReply::NoSession, 0);
            };
            if entry.opts.traffic != TrafficType::Messages {
                return (SetLinkTimeoutReply::NoSession, 0);
            }
            let mut participants = entry.members.clone();
            participants.push(entry.session_host.clone());
            let mut links = Vec::new();
            for member in &participants {
                match l.names.kind_of(member) {
                    Some(EndpointKind::Virtual) => {
                        if let Some(b2b) = l
                            .state
                            .virtuals
                            .get(member)
                            .and_then(|vep| vep.b2b_for_session(id))
                        {
                            if let Some(ep) = l.state.b2bs.get(b2b) {
                                links.push(ep.hold());
                                found_ep = true;
                            }
                        }
                    }
                    Some(kind) if kind.is_locally_served() => {
                        // Local clients have no per-session connection; grant
                        // the request silently.
                        found_ep = true;
                    }
                    _ => {}
                }
            }
            links
        };

        for link in links {
            match link.set_link_timeout(timeout_secs) {
                Ok(granted) => {
                    actual = if granted == 0 || actual == 0 {
                        0
                    } else {
                        actual.max(granted)
                    };
                }
                Err(crate::bus::Error::Unsupported) => no_dest_support = true,
                Err(e) => {
                    log::error!("[SESSION] SetLinkTimeout({}) failed: {}", id, e);
                    return (SetLinkTimeoutReply::Failed, 0);
                }
            }
        }

        if no_dest_support {
            (SetLinkTimeoutReply::NoDestSupport, 0)
        } else if !found_ep {
            (SetLinkTimeoutReply::NoSession, 0)
        } else {
            (SetLinkTimeoutReply::Success, actual)
        }
    }

    // ========================================================================
    // Idle-link probes
    // ========================================================================

    /// Send a `ProbeReq` on every live bus-to-bus link. The embedder drives
    /// this from its idle timer; a link whose push fails is treated as lost
    /// and swept. Returns the number of links probed.
    pub fn probe_links(&self) -> usize {
        let links = {
            let l = self.shared.lock();
            l.state.links_except_guid(None)
        };
        let mut probed = 0;
        let mut dead = Vec::new();
        for (name, link) in links {
            match link.send_probe_req() {
                Ok(()) => probed += 1,
                Err(e) => {
                    log::warn!("[B2B] probe of {} failed: {}", name, e);
                    dead.push(name);
                }
            }
        }
        for name in dead {
            self.remove_b2b_link(&name);
        }
        probed
    }

    /// Inbound `ProbeReq`: answer with a `ProbeAck` on every link to the
    /// probing daemon.
    pub fn handle_probe_req(&self, from_guid: &BusGuid) {
        let links = {
            let l = self.shared.lock();
            l.state.links_to_guid(from_guid)
        };
        for (name, link) in links {
            if let Err(e) = link.send_probe_ack() {
                log::warn!("[B2B] probe ack on {} failed: {}", name, e);
            }
        }
    }

    /// Inbound `ProbeAck`: the link answered; nothing to update beyond the
    /// transport's own liveness bookkeeping.
    pub fn handle_probe_ack(&self, from_guid: &BusGuid) {
        log::debug!("[B2B] probe ack from {}", from_guid.short());
    }
}
