// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Server-side `AttachSession`.
//!
//! A sibling daemon asks us to install one member into a session. Two cases:
//!
//! - **Local destination**: negotiate against the bind reservation (or the
//!   live multipoint entry), run the accept probe if we host the session,
//!   install the member and the routes, reply with the roster. The reply
//!   must travel back over the source link itself; the caller holds a waiter
//!   on it for the duration.
//! - **Forwarding**: we sit between the joiner and the destination. Reuse
//!   the session's existing link or connect via the supplied bus address,
//!   forward the attach, then install through-routes. If the negotiated
//!   session is raw, the middle node extracts both links' sockets after the
//!   reply and pumps bytes between them.

use crate::bus::{BusCore, Error, Result, SessionId};
use crate::endpoint::EndpointKind;
use crate::protocol::messages::{AttachSessionMsg, AttachSessionReply};
use crate::protocol::opts::{SessionOpts, TrafficType};
use crate::protocol::reply::JoinReply;
use crate::session::{generate_session_id, SessionEntry};
use std::time::Duration;

impl BusCore {
    /// Handle an inbound `AttachSession`. `incoming_session_id` is the
    /// session id carried in the message header (non-zero for multipoint
    /// fan-out riding an existing session). Blocking; dispatchers should use
    /// [`BusCore::spawn_attach_session`].
    pub fn handle_attach_session(
        &self,
        msg: &AttachSessionMsg,
        incoming_session_id: SessionId,
    ) -> AttachSessionReply {
        if self.shared.is_stopping() {
            return AttachSessionReply::error(JoinReply::Failed);
        }
        log::debug!(
            "[ATTACH] AttachSession(port={}, joiner={}, host={}, dest={}, srcB2B={}, addr=\"{}\")",
            msg.session_port,
            msg.joiner,
            msg.session_host,
            msg.dest,
            msg.src_b2b,
            msg.bus_addr
        );

        // The destination may not be registered yet if its own join is still
        // in flight (another daemon can know we are a member before we do).
        // Give it one settle interval.
        let mut dest = {
            let l = self.shared.lock();
            l.resolve(&msg.dest)
        };
        if !dest.as_ref().is_some_and(|(_, k)| k.is_locally_served()) {
            std::thread::sleep(Duration::from_millis(self.shared.config().dest_settle_ms));
            dest = {
                let l = self.shared.lock();
                l.resolve(&msg.dest)
            };
        }

        let reply = match dest {
            Some((dest_unique, kind)) if kind.is_locally_served() => {
                self.attach_local_dest(msg, &dest_unique)
            }
            _ => self.attach_forward(msg, incoming_session_id),
        };
        log::debug!(
            "[ATTACH] AttachSession(port={}) -> {:?} id={:08x}",
            msg.session_port,
            reply.reply,
            reply.id
        );
        reply
    }

    /// Handle an attach on a worker task; `on_done` must push the reply back
    /// over the link the request arrived on.
    pub fn spawn_attach_session<F>(
        &self,
        msg: AttachSessionMsg,
        incoming_session_id: SessionId,
        on_done: F,
    ) -> Result<()>
    where
        F: FnOnce(AttachSessionReply) + Send + 'static,
    {
        if self.shared.is_stopping() {
            return Err(Error::Stopping);
        }
        let core = self.clone();
        self.shared.tasks.spawn("attach-session", move || {
            let reply = core.handle_attach_session(&msg, incoming_session_id);
            on_done(reply);
        });
        Ok(())
    }

    /// `GetSessionInfo`: the bus addresses this daemon listens on for the
    /// requested transport set, in priority order.
    #[must_use]
    pub fn handle_get_session_info(
        &self,
        session_host: &str,
        session_port: u16,
        opts: &SessionOpts,
    ) -> Vec<String> {
        log::debug!(
            "[ATTACH] GetSessionInfo({}, {}, {:#x})",
            session_host,
            session_port,
            opts.transports
        );
        let mut addrs = Vec::new();
        for trans in self.shared.transports.iter() {
            if trans.mask() & opts.transports != 0 {
                addrs.extend(trans.listen_addrs(opts));
            }
        }
        addrs
    }

    // ========================================================================
    // Case A: destination is served by this daemon
    // ========================================================================

    fn attach_local_dest(&self, msg: &AttachSessionMsg, dest_unique: &str) -> AttachSessionReply {
        let src = msg.joiner.as_str();
        let mut new_row: Option<SessionId> = None;
        let mut creator_is_dest = false;
        let mut raw_finalize = false;

        let mut reply = {
            let mut l = self.shared.lock();
            let host_ep = l.resolve(&msg.session_host).map(|(unique, _)| unique);

            // Locate the session: a live row first (multipoint re-attach or
            // joiner-to-joiner fan-out), else the bind reservation.
            let mut located: Option<SessionEntry> = None;
            let mut verdict = JoinReply::Success;
            for row in l.state.sessions.rows_of(dest_unique) {
                if row.session_port != msg.session_port {
                    continue;
                }
                let creator = l.resolve(&row.session_host).map(|(unique, _)| unique);
                if creator.is_none() || creator != host_ep {
                    continue;
                }
                if row.id == 0 {
                    if located.is_none() {
                        located = Some(row.clone_meta());
                    }
                } else if row.opts.is_multipoint {
                    if row.members.iter().any(|m| m == src) {
                        verdict = JoinReply::AlreadyJoined;
                        located = None;
                        break;
                    }
                    located = Some(row.clone_meta());
                } else {
                    // A point-to-point session cannot be attached twice.
                    verdict = JoinReply::Failed;
                    located = None;
                    break;
                }
            }

            if verdict != JoinReply::Success {
                return AttachSessionReply::error(verdict);
            }
            let Some(mut sme) = located else {
                return AttachSessionReply::error(JoinReply::NoSession);
            };
            if !sme.opts.is_compatible(&msg.opts) {
                let mut r = AttachSessionReply::error(JoinReply::BadSessionOpts);
                r.opts = sme.opts;
                return r;
            }
            if sme.id == 0 {
                sme.id = generate_session_id(&l.state.sessions);
                let mut row = sme.clone_meta();
                row.endpoint_name = dest_unique.to_string();
                row.is_initializing = true;
                l.state.sessions.insert(row);
                new_row = Some(sme.id);
            }

            // The request must have arrived over a registered link.
            if !l.state.b2bs.contains_key(&msg.src_b2b) {
                log::error!("[ATTACH] cannot locate source link {}", msg.src_b2b);
                if let Some(id) = new_row {
                    l.state.sessions.erase(dest_unique, id);
                }
                return AttachSessionReply::error(JoinReply::Failed);
            }
            l.add_virtual(src, &msg.src_b2b);

            if sme.opts.traffic != TrafficType::Messages {
                if let Some(row) = l.state.sessions.find_mut(dest_unique, sme.id) {
                    row.streaming_b2b = Some(msg.src_b2b.clone());
                }
            }

            creator_is_dest = host_ep.as_deref() == Some(dest_unique);
            let mut reply = AttachSessionReply {
                reply: JoinReply::Success,
                id: sme.id,
                opts: sme.opts,
                members: Vec::new(),
            };

            // If we created the session, its host decides who gets in.
            if creator_is_dest {
                drop(l);
                let accepted = self.shared.sink.accept_session_joiner(
                    dest_unique,
                    msg.session_port,
                    sme.id,
                    src,
                    &msg.opts,
                );
                let mut l = self.shared.lock();
                match accepted {
                    Err(e) => {
                        log::error!("[ATTACH] accept probe failed: {}", e);
                        reply.reply = JoinReply::Failed;
                    }
                    Ok(false) => reply.reply = JoinReply::Rejected,
                    Ok(true) => {}
                }
                // Re-resolve after the probe gap.
                if reply.reply == JoinReply::Success {
                    if l.names.kind_of(dest_unique).is_none()
                        || !l.state.b2bs.contains_key(&msg.src_b2b)
                    {
                        log::error!("[ATTACH] participant disappeared during accept probe");
                        reply.reply = JoinReply::Failed;
                    } else {
                        l.add_virtual(src, &msg.src_b2b);
                    }
                }
                if reply.reply != JoinReply::Success {
                    if let Some(id) = new_row {
                        l.state.sessions.erase(dest_unique, id);
                        new_row = None;
                    }
                    return reply;
                }
                self.finish_local_attach(&mut l, msg, dest_unique, &sme, &mut reply);
                raw_finalize = reply.reply == JoinReply::Success
                    && reply.opts.traffic != TrafficType::Messages;
                reply
            } else {
                self.finish_local_attach(&mut l, msg, dest_unique, &sme, &mut reply);
                raw_finalize = reply.reply == JoinReply::Success
                    && reply.opts.traffic != TrafficType::Messages;
                reply
            }
        };

        // Clear (or roll back) the initializing marker now that the reply is
        // formed.
        {
            let mut l = self.shared.lock();
            if let Some(id) = new_row {
                if reply.reply == JoinReply::Success {
                    if let Some(row) = l.state.sessions.find_mut(dest_unique, id) {
                        row.is_initializing = false;
                    }
                } else {
                    l.state.sessions.erase(dest_unique, id);
                }
            }
        }

        // Tell the creator about the admitted joiner.
        if reply.reply == JoinReply::Success && creator_is_dest {
            self.shared
                .sink
                .session_joined(dest_unique, msg.session_port, reply.id, src);
        }
        if reply.reply == JoinReply::Success && reply.opts.is_multipoint {
            self.shared
                .sink
                .mp_session_changed(dest_unique, reply.id, src, true);
        }

        // Raw destination: once the reply is on the wire, tear the source
        // link down and stash its socket for GetSessionFd.
        if raw_finalize {
            let core = self.clone();
            let dest = dest_unique.to_string();
            let id = reply.id;
            self.shared.tasks.spawn("raw-finalize", move || {
                core.finalize_raw_dest(&dest, id);
            });
        }

        reply
    }

    /// Install the member and its routes on the located session row.
    fn finish_local_attach(
        &self,
        l: &mut crate::bus::shared::Locked<'_>,
        msg: &AttachSessionMsg,
        dest_unique: &str,
        sme: &SessionEntry,
        reply: &mut AttachSessionReply,
    ) {
        let src = msg.joiner.as_str();
        let Some(row) = l.state.sessions.find_mut(dest_unique, sme.id) else {
            reply.reply = JoinReply::Failed;
            return;
        };
        row.members.push(src.to_string());
        reply.id = row.id;
        reply.members = row.members.clone();

        if reply.opts.traffic == TrafficType::Messages {
            l.state
                .routes
                .add_route_pair(reply.id, dest_unique, src, Some(&msg.src_b2b), None);
            if let Some(vep) = l.state.virtuals.get_mut(src) {
                vep.add_session_ref(reply.id, &msg.src_b2b);
            }
        }
    }

    /// Post-reply raw handling on the destination daemon: extract the source
    /// link's socket into the session row.
    fn finalize_raw_dest(&self, dest_unique: &str, id: SessionId) {
        let (b2b, link) = {
            let mut l = self.shared.lock();
            let Some(row) = l.state.sessions.find_mut(dest_unique, id) else {
                log::error!("[ATTACH] no session row {} / {:08x} to finalize", dest_unique, id);
                return;
            };
            let Some(b2b) = row.streaming_b2b.take() else {
                return;
            };
            let link = l.state.b2bs.get(&b2b).map(crate::endpoint::B2bEndpoint::hold);
            (b2b, link)
        };
        let Some(link) = link else {
            log::error!("[ATTACH] streaming link {} vanished", b2b);
            return;
        };
        match link.take_stream() {
            Ok(sock) => {
                drop(link);
                {
                    let mut l = self.shared.lock();
                    if let Some(row) = l.state.sessions.find_mut(dest_unique, id) {
                        row.fd = Some(sock);
                    }
                }
                self.remove_b2b_link(&b2b);
            }
            Err(e) => {
                log::error!("[ATTACH] failed to shut down raw endpoint {}: {}", b2b, e);
            }
        }
    }

    // ========================================================================
    // Case B: we forward toward the destination
    // ========================================================================

    fn attach_forward(
        &self,
        msg: &AttachSessionMsg,
        incoming_session_id: SessionId,
    ) -> AttachSessionReply {
        let mut b2b_name = String::new();
        let mut ref_held = false;
        let mut verdict = JoinReply::Success;

        // Multipoint fan-out rides the link already carrying the session.
        if msg.bus_addr.is_empty() && incoming_session_id != 0 {
            let mut l = self.shared.lock();
            let vdest = l
                .resolve(&msg.dest)
                .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                .map(|(unique, _)| unique);
            if let Some(vdest) = vdest {
                let st = &mut *l.state;
                let b2b = st
                    .virtuals
                    .get(&vdest)
                    .and_then(|vep| vep.b2b_for_session(incoming_session_id))
                    .map(str::to_string);
                if let Some(b2b) = b2b {
                    if let Some(ep) = st.b2bs.get_mut(&b2b) {
                        ep.increment_ref();
                        ref_held = true;
                        b2b_name = b2b;
                    }
                }
            }
        } else if !msg.bus_addr.is_empty() {
            // Connect toward the destination's daemon.
            match self.shared.transports.for_addr(&msg.bus_addr) {
                None => verdict = JoinReply::Unreachable,
                Some(trans) => match trans.connect(&msg.bus_addr, &msg.opts) {
                    Ok(handle) => match self.add_b2b_link(handle) {
                        Ok(name) => {
                            let mut l = self.shared.lock();
                            if let Some(ep) = l.state.b2bs.get_mut(&name) {
                                ep.increment_ref();
                                ref_held = true;
                                b2b_name = name;
                            }
                        }
                        Err(e) => {
                            log::error!("[ATTACH] registering link failed: {}", e);
                            verdict = JoinReply::ConnectFailed;
                        }
                    },
                    Err(e) => {
                        log::error!("[ATTACH] connect({}) failed: {}", msg.bus_addr, e);
                        verdict = JoinReply::ConnectFailed;
                    }
                },
            }
        }

        if b2b_name.is_empty() {
            if verdict == JoinReply::Success {
                verdict = JoinReply::NoSession;
            }
            return AttachSessionReply::error(verdict);
        }

        // Forward downstream, with our link name as the source.
        let link = {
            let l = self.shared.lock();
            l.state.b2bs.get(&b2b_name).map(crate::endpoint::B2bEndpoint::hold)
        };
        let Some(link) = link else {
            return self.forward_cleanup(&b2b_name, ref_held, JoinReply::Failed);
        };
        if msg.opts.traffic != TrafficType::Messages {
            if let Err(e) = link.pause_after_reply() {
                log::error!("[ATTACH] failed to arm raw teardown downstream: {}", e);
                drop(link);
                return self.forward_cleanup(&b2b_name, ref_held, JoinReply::Failed);
            }
        }
        let forwarded = AttachSessionMsg {
            src_b2b: b2b_name.clone(),
            ..msg.clone()
        };
        let timeout = Duration::from_millis(self.shared.config().attach_rpc_timeout_ms);
        let result = link.call_attach_session(&forwarded, incoming_session_id, timeout);
        drop(link);

        let mut reply = match result {
            Ok(r) if r.reply == JoinReply::Success => r,
            Ok(r) => {
                log::error!("[ATTACH] downstream attach refused: {:?}", r.reply);
                return self.forward_cleanup(&b2b_name, ref_held, JoinReply::Failed);
            }
            Err(e) => {
                log::error!("[ATTACH] downstream attach failed: {}", e);
                return self.forward_cleanup(&b2b_name, ref_held, JoinReply::Failed);
            }
        };

        // Wait for the destination to become routable over the downstream
        // link, then install the through-routes.
        let wait = self.wait_for_route(&msg.dest, &b2b_name);
        if wait != JoinReply::Success {
            return self.forward_cleanup(&b2b_name, ref_held, wait);
        }
        let installed = {
            let mut l = self.shared.lock();
            let vdest = l
                .resolve(&msg.dest)
                .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                .map(|(unique, _)| unique);
            match vdest {
                _ if !l.state.b2bs.contains_key(&msg.src_b2b) => {
                    log::error!("[ATTACH] source link {} disappeared", msg.src_b2b);
                    false
                }
                None => {
                    log::error!("[ATTACH] destination {} not routable after forward", msg.dest);
                    false
                }
                Some(vdest) => {
                    l.add_virtual(&msg.joiner, &msg.src_b2b);
                    l.state.routes.add_route_pair(
                        reply.id,
                        &vdest,
                        &msg.joiner,
                        Some(&msg.src_b2b),
                        Some(&b2b_name),
                    );
                    let st = &mut *l.state;
                    if let Some(vep) = st.virtuals.get_mut(&vdest) {
                        vep.add_session_ref(reply.id, &b2b_name);
                    }
                    if let Some(vep) = st.virtuals.get_mut(&msg.joiner) {
                        vep.add_session_ref(reply.id, &msg.src_b2b);
                    }
                    if ref_held {
                        if let Some(ep) = st.b2bs.get_mut(&b2b_name) {
                            ep.decrement_ref();
                        }
                        ref_held = false;
                    }
                    true
                }
            }
        };
        if !installed {
            return self.forward_cleanup(&b2b_name, ref_held, JoinReply::Failed);
        }

        // Raw middle-man: once the reply is pushed upstream, splice the two
        // links together with a byte pump.
        if reply.opts.traffic != TrafficType::Messages {
            let core = self.clone();
            let upstream = msg.src_b2b.clone();
            let downstream = b2b_name.clone();
            let id = reply.id;
            self.shared.tasks.spawn("raw-relay", move || {
                core.splice_raw_relay(id, &upstream, &downstream);
            });
        }

        reply.reply = JoinReply::Success;
        reply
    }

    fn forward_cleanup(
        &self,
        b2b_name: &str,
        ref_held: bool,
        verdict: JoinReply,
    ) -> AttachSessionReply {
        if ref_held {
            let mut l = self.shared.lock();
            if let Some(ep) = l.state.b2bs.get_mut(b2b_name) {
                ep.decrement_ref();
            }
        }
        AttachSessionReply::error(verdict)
    }

    /// Middle-node raw splice: extract both links' sockets and pump.
    fn splice_raw_relay(&self, id: SessionId, upstream: &str, downstream: &str) {
        let (up, down) = {
            let l = self.shared.lock();
            (
                l.state.b2bs.get(upstream).map(crate::endpoint::B2bEndpoint::hold),
                l.state.b2bs.get(downstream).map(crate::endpoint::B2bEndpoint::hold),
            )
        };
        let (Some(up), Some(down)) = (up, down) else {
            log::error!("[ATTACH] raw relay links vanished for {:08x}", id);
            return;
        };
        let streams = (up.take_stream(), down.take_stream());
        drop(up);
        drop(down);
        match streams {
            (Ok(a), Ok(b)) => {
                if let Err(e) = crate::session::raw::spawn_stream_pump(id, a, b) {
                    log::error!("[ATTACH] raw relay creation failed: {}", e);
                }
                self.remove_b2b_link(upstream);
                self.remove_b2b_link(downstream);
            }
            (a, b) => {
                if let Err(e) = a.and(b) {
                    log::error!("[ATTACH] raw relay extraction failed: {}", e);
                }
            }
        }
    }
}
