// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Session teardown: leave, inbound detach, endpoint departure and
//! bus-to-bus link loss.
//!
//! All four paths funnel into one sweep over the session map that removes
//! the departing party, empties rosters, detects lost sessions and collects
//! the `SessionLost` / `MPSessionChanged` notifications to fire once the
//! locks are released.

use crate::bus::{BusCore, BusGuid, SessionId};
use crate::protocol::reply::LeaveReply;
use crate::session::raw::shutdown_socket;
use std::collections::BTreeSet;

/// What a sweep is reacting to.
pub(crate) enum SweepScope<'a> {
    /// `ep` left session `id` (LeaveSession or inbound DetachSession).
    Session { ep: &'a str, id: SessionId },
    /// The link `b2b` died; sweep the sessions that reached `vep` only
    /// through it.
    ViaLink { vep: &'a str, b2b: &'a str },
    /// The endpoint `ep` is gone entirely (local client departure or virtual
    /// endpoint destruction).
    Departed { ep: &'a str },
}

impl BusCore {
    /// `LeaveSession`: withdraw `sender` from session `id`, broadcast the
    /// detach to every sibling, and reap the local state.
    pub fn leave_session(&self, sender: &str, id: SessionId) -> LeaveReply {
        log::debug!("[SESSION] LeaveSession({}, {:08x})", sender, id);
        if id == 0 {
            return LeaveReply::NoSession;
        }
        let links = {
            let mut l = self.shared.lock();
            let Some(entry) = l.state.sessions.find_mut(sender, id) else {
                return LeaveReply::NoSession;
            };
            if let Some(fd) = entry.fd.take() {
                shutdown_socket(&fd);
            }
            l.state.links_except_guid(None)
        };

        // Tell the daemons of all session participants.
        for (name, link) in links {
            if let Err(e) = link.send_detach_session(id, sender) {
                log::error!("[SESSION] failed to send DetachSession to {}: {}", name, e);
            }
        }

        self.sweep_session_refs(SweepScope::Session { ep: sender, id });

        let mut l = self.shared.lock();
        remove_session_routes_and_refs(&mut l, sender, id);
        LeaveReply::Success
    }

    /// Inbound `DetachSession` signal: a remote participant left. Signals
    /// originating from this daemon are echoes and ignored.
    pub fn handle_detach_session(&self, from_guid: &BusGuid, id: SessionId, member: &str) {
        if from_guid == &self.shared.guid {
            return;
        }
        log::debug!(
            "[SESSION] DetachSession({:08x}, {}) from {}",
            id,
            member,
            from_guid.short()
        );
        self.sweep_session_refs(SweepScope::Session { ep: member, id });
        let mut l = self.shared.lock();
        remove_session_routes_and_refs(&mut l, member, id);
    }

    /// A bus-to-bus link terminated. For every virtual endpoint it carried:
    /// reap the sessions reachable only through it, shrink its route set,
    /// destroy it if nothing remains, and announce each departure to the
    /// other siblings.
    pub(crate) fn handle_b2b_loss(&self, b2b_name: &str) {
        log::info!("[B2B] link {} lost", b2b_name);
        let (remote_guid, vep_names) = {
            let l = self.shared.lock();
            let Some(ep) = l.state.b2bs.get(b2b_name) else {
                log::warn!("[B2B] loss of unknown link {}", b2b_name);
                return;
            };
            if ep.has_waiters() {
                log::debug!("[B2B] {} still has waiters at loss", b2b_name);
            }
            let names: Vec<String> = l.state.virtuals.keys().cloned().collect();
            (ep.remote_guid().clone(), names)
        };

        for vep_name in vep_names {
            // Reap the sessions that depended on this link. Locks are
            // released around the notification fan-out inside.
            self.sweep_session_refs(SweepScope::ViaLink {
                vep: &vep_name,
                b2b: b2b_name,
            });

            // Shrink the route set; destroy the endpoint before releasing the
            // lock if it emptied, then announce the departure.
            let links = {
                let mut l = self.shared.lock();
                let Some(vep) = l.state.virtuals.get_mut(&vep_name) else {
                    continue;
                };
                if !vep.remove_b2b(b2b_name) {
                    continue;
                }
                l.remove_virtual(&vep_name);
                l.state.links_except_guid(Some(&remote_guid))
            };
            for (name, link) in links {
                if let Err(e) = link.send_name_changed(&vep_name, &vep_name, "") {
                    log::error!("[B2B] failed to send NameChanged to {}: {}", name, e);
                }
            }
        }

        let mut l = self.shared.lock();
        l.state.routes.remove_routes_via(b2b_name);
        l.state.b2bs.remove(b2b_name);
        l.names.remove(b2b_name);
    }

    /// Sweep for a locally departed endpoint (its rows are removed outright,
    /// any id).
    pub(crate) fn sweep_departed_endpoint(&self, ep: &str) {
        self.sweep_session_refs(SweepScope::Departed { ep });
    }

    /// The common sweep. Mutates the session map under both locks, then
    /// fires the collected notifications with them released.
    pub(crate) fn sweep_session_refs(&self, scope: SweepScope<'_>) {
        let mut lost: Vec<(String, SessionId)> = Vec::new();
        let mut changed: Vec<(String, SessionId, String)> = Vec::new();
        {
            let mut l = self.shared.lock();
            let subject: String = match &scope {
                SweepScope::Session { ep, .. } | SweepScope::Departed { ep } => (*ep).to_string(),
                SweepScope::ViaLink { vep, .. } => (*vep).to_string(),
            };
            let via_ids: Option<BTreeSet<SessionId>> = match &scope {
                SweepScope::ViaLink { vep, b2b } => {
                    let Some(v) = l.state.virtuals.get(*vep) else {
                        return;
                    };
                    if !l.state.b2bs.contains_key(*b2b) {
                        log::warn!("[SESSION] sweep via unknown link {}", b2b);
                        return;
                    }
                    Some(v.sessions_uniquely_via(b2b).into_iter().collect())
                }
                _ => None,
            };

            for key in l.state.sessions.keys() {
                let (owner, id) = (key.0.clone(), key.1);
                let applies = match &scope {
                    SweepScope::Session { id: sid, .. } => id == *sid,
                    SweepScope::ViaLink { .. } => {
                        id != 0 && via_ids.as_ref().is_some_and(|s| s.contains(&id))
                    }
                    SweepScope::Departed { .. } => true,
                };
                if !applies {
                    continue;
                }
                if owner == subject {
                    // Rows keyed by the departing party are removed outright.
                    l.state.sessions.erase(&owner, id);
                    continue;
                }
                let Some(rows) = l.state.sessions.rows_mut(&key) else {
                    continue;
                };
                rows.retain_mut(|row| {
                    if row.session_host == subject {
                        row.session_host.clear();
                        if row.opts.is_multipoint {
                            changed.push((owner.clone(), id, subject.clone()));
                        }
                    } else if let Some(pos) = row.members.iter().position(|m| *m == subject) {
                        row.members.remove(pos);
                        if row.opts.is_multipoint {
                            changed.push((owner.clone(), id, subject.clone()));
                        }
                    }
                    if id != 0 && row.is_lost() {
                        lost.push((owner.clone(), id));
                        // Raw rows (fd held) never reach here; initializing
                        // rows are preserved for the attach in flight.
                        return row.is_initializing;
                    }
                    true
                });
                l.state.sessions.prune(&key);
            }
        }

        for (dest, id) in lost {
            log::debug!("[SESSION] SessionLost({:08x}) -> {}", id, dest);
            self.shared.sink.session_lost(&dest, id);
        }
        for (dest, id, member) in changed {
            self.shared.sink.mp_session_changed(&dest, id, &member, false);
        }
    }
}

/// Remove every route of `(endpoint, id)` and drop the session bindings the
/// removed routes held on virtual endpoints.
pub(crate) fn remove_session_routes_and_refs(
    l: &mut crate::bus::shared::Locked<'_>,
    endpoint: &str,
    id: SessionId,
) {
    let removed = l.state.routes.remove_session_routes(endpoint, id);
    for (rid, src, dst) in removed {
        for ep in [&src, &dst] {
            if let Some(vep) = l.state.virtuals.get_mut(ep.as_str()) {
                vep.remove_session_ref(rid);
            }
        }
    }
}
