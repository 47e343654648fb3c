// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Client-side session join.
//!
//! A join may block for seconds (accept probe, transport connect, the
//! cross-daemon attach handshake), so the dispatcher hands each one to a
//! worker via [`BusCore::spawn_join_session`]. The state machine:
//!
//! 1. Resolve the host (local, virtual, or unknown) and refuse self-joins.
//! 2. Local host: negotiate against the bind reservation, run the accept
//!    probe, install routes (or a socketpair for raw sessions).
//! 3. Remote host: find a bus address (name map, then `GetSessionInfo`),
//!    connect, wait for the name exchange to make the host routable over the
//!    new link, send `AttachSession`, install routes; raw sessions then tear
//!    the link down into its socket.
//! 4. Multipoint: fan the attach out to every other existing member and
//!    catch the new joiner up with the roster.
//!
//! Locks are released around every callback, RPC, connect and sleep; all
//! endpoint references are re-resolved afterwards.

use crate::bus::{BusCore, Error, Result, SessionId, SessionPort};
use crate::config::WAIT_ROUTE_POLL_MS;
use crate::endpoint::EndpointKind;
use crate::protocol::messages::AttachSessionMsg;
use crate::protocol::opts::{SessionOpts, TrafficType};
use crate::protocol::reply::JoinReply;
use crate::session::raw::socket_pair;
use crate::session::{generate_session_id, SessionEntry};
use std::time::{Duration, Instant};

/// Result of a join.
#[derive(Clone, Debug)]
pub struct JoinOutcome {
    pub reply: JoinReply,
    pub id: SessionId,
    pub opts: SessionOpts,
}

impl JoinOutcome {
    fn failed(reply: JoinReply) -> Self {
        Self {
            reply,
            id: 0,
            opts: SessionOpts::messages(),
        }
    }
}

/// Intermediate result of the host-specific half of a join.
struct JoinProgress {
    reply: JoinReply,
    id: SessionId,
    opts_out: SessionOpts,
    /// Roster including the new joiner (fan-out input).
    members: Vec<String>,
    /// Link carrying the session for a remote host; empty for a local host.
    b2b_name: String,
}

impl JoinProgress {
    fn failed(reply: JoinReply) -> Self {
        Self {
            reply,
            id: 0,
            opts_out: SessionOpts::messages(),
            members: Vec::new(),
            b2b_name: String::new(),
        }
    }
}

impl BusCore {
    /// `JoinSession`, blocking. Prefer [`BusCore::spawn_join_session`] from a
    /// message dispatcher.
    pub fn join_session(
        &self,
        sender: &str,
        session_host: &str,
        session_port: SessionPort,
        opts_in: SessionOpts,
    ) -> JoinOutcome {
        if self.shared.is_stopping() {
            return JoinOutcome::failed(JoinReply::Failed);
        }
        let granted = self.shared.policy.allowed(sender, opts_in.transports);
        if granted == 0 {
            return JoinOutcome::failed(JoinReply::Failed);
        }
        let opts_in = SessionOpts {
            transports: granted,
            ..opts_in
        };
        log::debug!(
            "[JOIN] JoinSession({}, {}, {}) traffic={:?}",
            sender,
            session_host,
            session_port,
            opts_in.traffic
        );

        // Resolve the host and refuse joining one of our own bound ports.
        let host = {
            let l = self.shared.lock();
            let host = l.resolve(session_host);
            if let Some((host_unique, _)) = &host {
                for reservation in l.state.sessions.reservations_of(sender) {
                    let res_host = l
                        .resolve(&reservation.session_host)
                        .map(|(unique, _)| unique);
                    if res_host.as_deref() == Some(host_unique.as_str()) {
                        log::debug!("[JOIN] {} cannot join its own session", sender);
                        return JoinOutcome::failed(JoinReply::AlreadyJoined);
                    }
                }
            }
            host
        };

        let progress = match host {
            Some((host_unique, kind)) if matches!(kind, EndpointKind::Client | EndpointKind::Null) => {
                self.join_to_local_host(sender, &host_unique, session_port, &opts_in)
            }
            _ => self.join_to_remote_host(sender, session_host, session_port, opts_in),
        };

        let progress = if progress.reply == JoinReply::Success && progress.opts_out.is_multipoint {
            self.fan_out_to_members(sender, session_host, session_port, progress)
        } else {
            progress
        };

        let outcome = JoinOutcome {
            reply: progress.reply,
            id: progress.id,
            opts: progress.opts_out,
        };
        log::debug!(
            "[JOIN] JoinSession({}, {}) -> {:?} id={:08x}",
            sender,
            session_port,
            outcome.reply,
            outcome.id
        );

        // Catch the new joiner up on the current roster.
        if outcome.reply == JoinReply::Success && outcome.opts.is_multipoint {
            let roster = {
                let l = self.shared.lock();
                l.state
                    .sessions
                    .find(sender, outcome.id)
                    .map(|row| (row.session_host.clone(), row.members.clone()))
            };
            if let Some((host, members)) = roster {
                self.shared
                    .sink
                    .mp_session_changed(sender, outcome.id, &host, true);
                for member in members {
                    if member != sender {
                        self.shared
                            .sink
                            .mp_session_changed(sender, outcome.id, &member, true);
                    }
                }
            }
        }
        outcome
    }

    /// Run a join on a worker task; `on_done` receives the outcome (the
    /// dispatcher turns it into the method reply).
    pub fn spawn_join_session<F>(
        &self,
        sender: String,
        session_host: String,
        session_port: SessionPort,
        opts: SessionOpts,
        on_done: F,
    ) -> Result<()>
    where
        F: FnOnce(JoinOutcome) + Send + 'static,
    {
        if self.shared.is_stopping() {
            return Err(Error::Stopping);
        }
        let core = self.clone();
        self.shared.tasks.spawn("join-session", move || {
            let outcome = core.join_session(&sender, &session_host, session_port, opts);
            on_done(outcome);
        });
        Ok(())
    }

    // ========================================================================
    // Local host
    // ========================================================================

    fn join_to_local_host(
        &self,
        sender: &str,
        host_unique: &str,
        port: SessionPort,
        opts_in: &SessionOpts,
    ) -> JoinProgress {
        // Negotiate against the host's session rows.
        let (mut sme, new_id, has_placeholder) = {
            let mut l = self.shared.lock();
            let mut found: Option<SessionEntry> = None;
            for row in l.state.sessions.rows_of(host_unique) {
                if row.session_port != port {
                    continue;
                }
                if row.id != 0 {
                    if row.members.iter().any(|m| m == sender) {
                        return JoinProgress::failed(JoinReply::AlreadyJoined);
                    }
                    if row.opts.is_multipoint {
                        // Join the live multipoint session.
                        found = Some(row.clone_meta());
                    }
                } else if found.is_none() {
                    found = Some(row.clone_meta());
                }
            }
            if l.names.kind_of(sender).is_none() {
                return JoinProgress::failed(JoinReply::Failed);
            }
            let Some(mut sme) = found else {
                return JoinProgress::failed(JoinReply::NoSession);
            };
            if !sme.opts.is_compatible(opts_in) {
                return JoinProgress::failed(JoinReply::BadSessionOpts);
            }
            let new_id = if sme.id == 0 {
                generate_session_id(&l.state.sessions)
            } else {
                sme.id
            };
            sme.id = new_id;

            // Install the host-side row before the accept probe: the probe
            // may legally trigger GetSessionFd or LeaveSession.
            let mut has_placeholder = false;
            if l.state.sessions.find(host_unique, new_id).is_none() {
                let mut placeholder = sme.clone_meta();
                placeholder.endpoint_name = host_unique.to_string();
                l.state.sessions.insert(placeholder);
                has_placeholder = true;
            }
            (sme, new_id, has_placeholder)
        };

        // Accept probe, locks released.
        let accepted = self
            .shared
            .sink
            .accept_session_joiner(host_unique, port, new_id, sender, opts_in);

        let mut l = self.shared.lock();
        let reply = match accepted {
            Err(e) => {
                log::error!("[JOIN] accept probe failed: {}", e);
                JoinReply::Failed
            }
            Ok(false) => JoinReply::Rejected,
            Ok(true) if l.names.kind_of(sender).is_none() => {
                log::error!("[JOIN] joiner {} disappeared while joining", sender);
                JoinReply::Failed
            }
            Ok(true) => JoinReply::Success,
        };
        if reply != JoinReply::Success {
            if has_placeholder {
                l.state.sessions.erase(host_unique, new_id);
            }
            return JoinProgress::failed(reply);
        }

        match sme.opts.traffic {
            TrafficType::Messages => {
                l.state
                    .routes
                    .add_route_pair(new_id, sender, host_unique, None, None);
                let Some(host_row) = l.state.sessions.find_mut(host_unique, new_id) else {
                    return JoinProgress::failed(JoinReply::Failed);
                };
                host_row.members.push(sender.to_string());
                let members = host_row.members.clone();
                let opts_out = host_row.opts;
                let mut joiner_row = host_row.clone_meta();
                joiner_row.endpoint_name = sender.to_string();
                l.state.sessions.insert(joiner_row);
                drop(l);

                self.shared
                    .sink
                    .session_joined(host_unique, port, new_id, sender);
                if opts_out.is_multipoint {
                    self.shared
                        .sink
                        .mp_session_changed(host_unique, new_id, sender, true);
                }
                JoinProgress {
                    reply: JoinReply::Success,
                    id: new_id,
                    opts_out,
                    members,
                    b2b_name: String::new(),
                }
            }
            TrafficType::RawReliable if !sme.opts.is_multipoint => {
                match socket_pair() {
                    Ok((host_fd, joiner_fd)) => {
                        let Some(host_row) = l.state.sessions.find_mut(host_unique, new_id) else {
                            return JoinProgress::failed(JoinReply::Failed);
                        };
                        host_row.fd = Some(host_fd);
                        host_row.members.push(sender.to_string());
                        let opts_out = host_row.opts;
                        let mut joiner_row = sme.clone_meta();
                        joiner_row.endpoint_name = sender.to_string();
                        joiner_row.members = vec![sender.to_string()];
                        joiner_row.fd = Some(joiner_fd);
                        l.state.sessions.insert(joiner_row);
                        drop(l);

                        self.shared
                            .sink
                            .session_joined(host_unique, port, new_id, sender);
                        JoinProgress {
                            reply: JoinReply::Success,
                            id: new_id,
                            opts_out,
                            members: vec![sender.to_string()],
                            b2b_name: String::new(),
                        }
                    }
                    Err(e) => {
                        log::error!("[JOIN] socket pair failed: {}", e);
                        if has_placeholder {
                            l.state.sessions.erase(host_unique, new_id);
                        }
                        JoinProgress::failed(JoinReply::Failed)
                    }
                }
            }
            _ => {
                // Raw multipoint and raw-unreliable are not joinable.
                if has_placeholder {
                    l.state.sessions.erase(host_unique, new_id);
                }
                JoinProgress::failed(JoinReply::BadSessionOpts)
            }
        }
    }

    // ========================================================================
    // Remote host
    // ========================================================================

    fn join_to_remote_host(
        &self,
        sender: &str,
        session_host: &str,
        port: SessionPort,
        mut opts_in: SessionOpts,
    ) -> JoinProgress {
        let mut b2b_name = String::new();
        let mut bus_addr = String::new();
        let mut ref_held = false;

        // Reuse the link of an existing multipoint session with this host.
        {
            let mut l = self.shared.lock();
            let vhost = l
                .resolve(session_host)
                .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                .map(|(unique, _)| unique);
            if let (Some(vname), true) = (&vhost, opts_in.is_multipoint) {
                let st = &mut *l.state;
                let existing = st
                    .sessions
                    .iter()
                    .find(|row| {
                        row.id != 0 && row.session_host == *vname && row.session_port == port
                    })
                    .map(|row| (row.id, row.opts));
                if let Some((id, opts)) = existing {
                    if !opts.is_compatible(&opts_in) {
                        // One link cannot carry two option sets for one id.
                        return JoinProgress::failed(JoinReply::BadSessionOpts);
                    }
                    let b2b = st
                        .virtuals
                        .get(vname)
                        .and_then(|vep| vep.b2b_for_session(id))
                        .map(str::to_string);
                    if let Some(b2b) = b2b {
                        if let Some(ep) = st.b2bs.get_mut(&b2b) {
                            ep.increment_ref();
                            ref_held = true;
                            b2b_name = b2b;
                        }
                    }
                }
            }
        }

        // Discover a bus address and connect.
        let mut reply = JoinReply::Success;
        if b2b_name.is_empty() {
            let (mut bus_addrs, gsi_link) = {
                let l = self.shared.lock();
                let addrs: Vec<String> = l
                    .state
                    .name_map
                    .first_match(session_host, opts_in.transports)
                    .map(|rec| vec![rec.bus_addr.clone()])
                    .unwrap_or_default();
                let gsi_link = if addrs.is_empty() {
                    l.resolve(session_host)
                        .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                        .and_then(|(unique, _)| {
                            l.state
                                .virtuals
                                .get(&unique)
                                .and_then(|vep| vep.b2b_for_session(0))
                                .and_then(|b2b| l.state.b2bs.get(b2b))
                                .map(crate::endpoint::B2bEndpoint::hold)
                        })
                } else {
                    None
                };
                (addrs, gsi_link)
            };

            // No advertisement: ask the host's daemon directly.
            if let Some(link) = gsi_link {
                match link.call_get_session_info(session_host, port, &opts_in) {
                    Ok(addrs) => bus_addrs = addrs,
                    Err(e) => log::error!("[JOIN] GetSessionInfo failed: {}", e),
                }
            }

            if bus_addrs.is_empty() {
                return JoinProgress::failed(JoinReply::NoSession);
            }

            // Try candidates in priority order until a connect succeeds.
            for addr in &bus_addrs {
                let Some(trans) = self.shared.transports.for_addr(addr) else {
                    continue;
                };
                if trans.mask() & opts_in.transports == 0 {
                    log::debug!("[JOIN] skipping unpermitted transport {}", trans.name());
                    continue;
                }
                match trans.connect(addr, &opts_in) {
                    Ok(handle) => match self.add_b2b_link(handle) {
                        Ok(name) => {
                            let held = {
                                let mut l = self.shared.lock();
                                match l.state.b2bs.get_mut(&name) {
                                    Some(ep) => {
                                        ep.increment_ref();
                                        true
                                    }
                                    None => false,
                                }
                            };
                            if !held {
                                reply = JoinReply::ConnectFailed;
                                continue;
                            }
                            ref_held = true;
                            b2b_name = name;
                            bus_addr = addr.clone();
                            opts_in.transports = trans.mask();
                            reply = JoinReply::Success;
                            break;
                        }
                        Err(e) => {
                            log::error!("[JOIN] registering link for {} failed: {}", addr, e);
                            reply = JoinReply::ConnectFailed;
                        }
                    },
                    Err(e) => {
                        log::error!("[JOIN] connect({}) failed: {}", addr, e);
                        reply = JoinReply::ConnectFailed;
                    }
                }
            }
            if b2b_name.is_empty() {
                if reply == JoinReply::Success {
                    reply = JoinReply::Unreachable;
                }
                return JoinProgress::failed(reply);
            }
        }

        // Wait for the name exchange to make the host routable over the new
        // link.
        if reply == JoinReply::Success {
            reply = self.wait_for_route(session_host, &b2b_name);
        }

        // Send the attach and install the session.
        let mut progress = JoinProgress::failed(reply);
        if reply == JoinReply::Success {
            progress = self.attach_to_remote_host(
                sender,
                session_host,
                port,
                &opts_in,
                &b2b_name,
                &bus_addr,
            );
            progress.b2b_name = b2b_name.clone();
        }

        if ref_held {
            let mut l = self.shared.lock();
            if let Some(ep) = l.state.b2bs.get_mut(&b2b_name) {
                ep.decrement_ref();
            }
        }
        progress
    }

    /// Poll (locks released across each sleep) until `session_host` resolves
    /// to a virtual endpoint routable via `b2b_name`, or the deadline lapses.
    pub(crate) fn wait_for_route(&self, session_host: &str, b2b_name: &str) -> JoinReply {
        let deadline =
            Instant::now() + Duration::from_millis(self.shared.config().wait_route_timeout_ms);
        loop {
            {
                let l = self.shared.lock();
                if l.state.b2bs.get(b2b_name).is_none() {
                    log::error!("[JOIN] link {} disappeared during join", b2b_name);
                    return JoinReply::Failed;
                }
                let routable = l
                    .resolve(session_host)
                    .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                    .is_some_and(|(unique, _)| {
                        l.state
                            .virtuals
                            .get(&unique)
                            .is_some_and(|vep| vep.can_use_route(b2b_name))
                    });
                if routable {
                    return JoinReply::Success;
                }
            }
            if Instant::now() >= deadline {
                log::error!(
                    "[JOIN] timed out waiting for {} to appear on {}",
                    session_host,
                    b2b_name
                );
                return JoinReply::Failed;
            }
            std::thread::sleep(Duration::from_millis(WAIT_ROUTE_POLL_MS));
        }
    }

    fn attach_to_remote_host(
        &self,
        sender: &str,
        session_host: &str,
        port: SessionPort,
        opts_in: &SessionOpts,
        b2b_name: &str,
        bus_addr: &str,
    ) -> JoinProgress {
        let raw_requested = opts_in.traffic != TrafficType::Messages;
        let link = {
            let l = self.shared.lock();
            match l.state.b2bs.get(b2b_name) {
                Some(ep) => ep.hold(),
                None => return JoinProgress::failed(JoinReply::Failed),
            }
        };
        if raw_requested {
            if let Err(e) = link.pause_after_reply() {
                log::error!("[JOIN] failed to arm raw teardown: {}", e);
                return JoinProgress::failed(JoinReply::Failed);
            }
        }
        let msg = AttachSessionMsg {
            session_port: port,
            joiner: sender.to_string(),
            session_host: session_host.to_string(),
            dest: session_host.to_string(),
            src_b2b: b2b_name.to_string(),
            bus_addr: bus_addr.to_string(),
            opts: *opts_in,
        };
        let timeout = Duration::from_millis(self.shared.config().attach_rpc_timeout_ms);
        let attach = link.call_attach_session(&msg, 0, timeout);
        drop(link);

        let attach = match attach {
            Ok(r) if r.reply == JoinReply::Success => r,
            Ok(r) => {
                log::error!("[JOIN] AttachSession refused: {:?}", r.reply);
                return JoinProgress::failed(r.reply);
            }
            Err(e) => {
                log::error!("[JOIN] AttachSession failed: {}", e);
                return JoinProgress::failed(JoinReply::Failed);
            }
        };

        // Re-acquire and re-resolve everything the RPC gap may have changed.
        let mut created = false;
        let mut reply = JoinReply::Success;
        {
            let mut l = self.shared.lock();
            let host_unique = l
                .resolve(session_host)
                .filter(|(_, kind)| *kind == EndpointKind::Virtual)
                .map(|(unique, _)| unique);
            let Some(host_unique) = host_unique else {
                log::error!("[JOIN] host {} not found after attach", session_host);
                return JoinProgress::failed(JoinReply::Failed);
            };
            if l.state.b2bs.get(b2b_name).is_none() {
                log::error!("[JOIN] link {} disappeared during attach", b2b_name);
                return JoinProgress::failed(JoinReply::Failed);
            }
            if l.names.kind_of(sender).is_none() {
                return JoinProgress::failed(JoinReply::Failed);
            }
            l.state
                .routes
                .add_route_pair(attach.id, sender, &host_unique, Some(b2b_name), None);
            if let Some(vep) = l.state.virtuals.get_mut(&host_unique) {
                vep.add_session_ref(attach.id, b2b_name);
            }
            l.state.sessions.insert(SessionEntry {
                endpoint_name: sender.to_string(),
                id: attach.id,
                session_host: host_unique,
                session_port: port,
                opts: attach.opts,
                members: attach.members.clone(),
                fd: None,
                streaming_b2b: None,
                is_initializing: false,
            });
            created = true;
        }

        // Raw session: tear the link down into its socket.
        if attach.opts.traffic != TrafficType::Messages {
            let stream = {
                let l = self.shared.lock();
                l.state.b2bs.get(b2b_name).map(crate::endpoint::B2bEndpoint::hold)
            };
            let stream = match stream {
                Some(link) => link.take_stream(),
                None => Err(Error::NotConnected),
            };
            match stream {
                Ok(sock) => {
                    {
                        let mut l = self.shared.lock();
                        if let Some(row) = l.state.sessions.find_mut(sender, attach.id) {
                            row.fd = Some(sock);
                        }
                    }
                    // The link now belongs to the raw stream; reap the bus
                    // state it carried.
                    self.remove_b2b_link(b2b_name);
                }
                Err(e) => {
                    log::error!("[JOIN] raw teardown of {} failed: {}", b2b_name, e);
                    reply = JoinReply::Failed;
                }
            }
        }

        if reply != JoinReply::Success && created {
            let mut l = self.shared.lock();
            l.state.sessions.erase(sender, attach.id);
            crate::session::detach::remove_session_routes_and_refs(&mut l, sender, attach.id);
            return JoinProgress::failed(reply);
        }

        JoinProgress {
            reply,
            id: attach.id,
            opts_out: attach.opts,
            members: attach.members,
            b2b_name: b2b_name.to_string(),
        }
    }

    // ========================================================================
    // Multipoint fan-out
    // ========================================================================

    /// Attach the new joiner to every other existing member, installing the
    /// corresponding routes; locally resident members get their roster update
    /// directly.
    fn fan_out_to_members(
        &self,
        sender: &str,
        session_host: &str,
        port: SessionPort,
        mut progress: JoinProgress,
    ) -> JoinProgress {
        let id = progress.id;
        let timeout = Duration::from_millis(self.shared.config().attach_rpc_timeout_ms);
        for member in progress.members.clone() {
            if member == sender {
                continue;
            }
            let kind = {
                let l = self.shared.lock();
                l.names.kind_of(&member)
            };
            match kind {
                Some(EndpointKind::Virtual) => {
                    // Forward the attach over the link already carrying the
                    // session (local creator), or the joiner's new link.
                    let (m_b2b, guard) = {
                        let l = self.shared.lock();
                        let m_b2b = if progress.b2b_name.is_empty() {
                            l.state
                                .virtuals
                                .get(&member)
                                .and_then(|vep| vep.b2b_for_session(id))
                                .map(str::to_string)
                        } else {
                            Some(progress.b2b_name.clone())
                        };
                        let guard = m_b2b
                            .as_ref()
                            .and_then(|n| l.state.b2bs.get(n))
                            .map(crate::endpoint::B2bEndpoint::hold);
                        (m_b2b, guard)
                    };
                    let (Some(m_b2b), Some(guard)) = (m_b2b, guard) else {
                        log::error!(
                            "[JOIN] unable to attach existing member {} to {:08x}",
                            member,
                            id
                        );
                        continue;
                    };
                    if progress.b2b_name.is_empty() {
                        progress.b2b_name = m_b2b.clone();
                    }
                    let msg = AttachSessionMsg {
                        session_port: port,
                        joiner: sender.to_string(),
                        session_host: session_host.to_string(),
                        dest: member.clone(),
                        src_b2b: m_b2b.clone(),
                        bus_addr: String::new(),
                        opts: progress.opts_out,
                    };
                    let result = guard.call_attach_session(&msg, id, timeout);
                    drop(guard);
                    let ok = match result {
                        Ok(r) if r.reply == JoinReply::Success && r.id == id => true,
                        Ok(r) => {
                            log::error!(
                                "[JOIN] attach of {:08x} to {} refused ({:?}, id={:08x})",
                                id,
                                member,
                                r.reply,
                                r.id
                            );
                            false
                        }
                        Err(e) => {
                            log::error!("[JOIN] attach of {:08x} to {} failed: {}", id, member, e);
                            false
                        }
                    };
                    if ok {
                        let mut l = self.shared.lock();
                        if l.names.kind_of(sender).is_some()
                            && l.names.kind_of(&member).is_some()
                            && l.state.b2bs.contains_key(&m_b2b)
                        {
                            l.state
                                .routes
                                .add_route_pair(id, sender, &member, Some(&m_b2b), None);
                            if let Some(vep) = l.state.virtuals.get_mut(&member) {
                                vep.add_session_ref(id, &m_b2b);
                            }
                        }
                    }
                }
                Some(k) if k.is_locally_served() => {
                    // No attach is sent for a local member; update its roster
                    // and notify it directly.
                    {
                        let mut l = self.shared.lock();
                        if let Some(row) = l.state.sessions.find_mut(&member, id) {
                            row.members.push(sender.to_string());
                        }
                        l.state.routes.add_route_pair(id, sender, &member, None, None);
                    }
                    self.shared.sink.mp_session_changed(&member, id, sender, true);
                }
                _ => {}
            }
        }
        progress
    }
}
