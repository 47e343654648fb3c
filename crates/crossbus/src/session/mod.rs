// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! The session subsystem.
//!
//! The session map is keyed by `(endpointUniqueName, sessionId)`. Entries
//! with id 0 are *bind reservations* (a host's announced willingness to
//! accept joins on a port); several reservations may share the key, one per
//! bound port. A live session has a non-zero id and exactly one entry per
//! local participant.
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                       SessionController                      |
//! |  bind/unbind      join (worker)      attach (worker)         |
//! |        |               |                   |                 |
//! |        v               v                   v                 |
//! |  +--------------------------------------------------------+  |
//! |  |   SessionMap  <->  RouteTable  <->  virtual endpoints  |  |
//! |  +--------------------------------------------------------+  |
//! |        |                                                     |
//! |        +--> leave / detach / b2b-loss sweep / raw pump       |
//! +--------------------------------------------------------------+
//! ```
//!
//! All mutation happens under the two process-wide locks; every outbound
//! call (accept probe, AttachSession RPC, signals) releases them, and every
//! endpoint reference is re-resolved by name afterwards.

mod attach;
mod bind;
mod detach;
mod join;
mod raw;
pub(crate) mod tasks;

pub use join::JoinOutcome;
pub use raw::spawn_stream_pump;

use crate::bus::{SessionId, SessionPort};
use crate::protocol::opts::SessionOpts;
use crate::transport::RawStream;
use std::collections::BTreeMap;

// ============================================================================
// Session entries
// ============================================================================

/// One row of the session map.
#[derive(Debug)]
pub struct SessionEntry {
    /// Owner of this row (the local participant it describes).
    pub endpoint_name: String,
    /// Session id; 0 marks a bind reservation.
    pub id: SessionId,
    /// Unique name of the session's creator. Emptied when the host departs.
    pub session_host: String,
    /// The bound port.
    pub session_port: SessionPort,
    /// Negotiated options.
    pub opts: SessionOpts,
    /// Joiner roster (host not included). The host-side row lists every
    /// joiner known to the host; joiner-side rows carry the roster reported
    /// at join time.
    pub members: Vec<String>,
    /// For raw sessions, the socket owned after handoff.
    pub fd: Option<RawStream>,
    /// Transient: the bus-to-bus endpoint being converted to raw.
    pub streaming_b2b: Option<String>,
    /// True while an AttachSession is mid-flight; protects the row from
    /// cleanup sweeps.
    pub is_initializing: bool,
}

impl SessionEntry {
    /// A fresh bind reservation.
    #[must_use]
    pub fn reservation(host: &str, port: SessionPort, opts: SessionOpts) -> Self {
        Self {
            endpoint_name: host.to_string(),
            id: 0,
            session_host: host.to_string(),
            session_port: port,
            opts,
            members: Vec::new(),
            fd: None,
            streaming_b2b: None,
            is_initializing: false,
        }
    }

    /// Copy the metadata of this row (sockets do not clone; the copy carries
    /// no fd).
    #[must_use]
    pub fn clone_meta(&self) -> Self {
        Self {
            endpoint_name: self.endpoint_name.clone(),
            id: self.id,
            session_host: self.session_host.clone(),
            session_port: self.session_port,
            opts: self.opts,
            members: self.members.clone(),
            fd: None,
            streaming_b2b: self.streaming_b2b.clone(),
            is_initializing: self.is_initializing,
        }
    }

    /// A session is lost for this row when it has no raw socket and either no
    /// members remain or a single member remains with no host.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.fd.is_none()
            && (self.members.is_empty()
                || (self.members.len() == 1 && self.session_host.is_empty()))
    }
}

// ============================================================================
// Session map
// ============================================================================

type SessionKey = (String, SessionId);

/// Multi-valued map keyed by `(endpointName, sessionId)`. Only id-0 keys
/// (bind reservations) ever hold more than one row.
#[derive(Default)]
pub struct SessionMap {
    entries: BTreeMap<SessionKey, Vec<SessionEntry>>,
}

impl SessionMap {
    pub fn insert(&mut self, entry: SessionEntry) {
        self.entries
            .entry((entry.endpoint_name.clone(), entry.id))
            .or_default()
            .push(entry);
    }

    /// First row under `(name, id)`.
    #[must_use]
    pub fn find(&self, name: &str, id: SessionId) -> Option<&SessionEntry> {
        self.entries
            .get(&(name.to_string(), id))
            .and_then(|v| v.first())
    }

    pub fn find_mut(&mut self, name: &str, id: SessionId) -> Option<&mut SessionEntry> {
        self.entries
            .get_mut(&(name.to_string(), id))
            .and_then(|v| v.first_mut())
    }

    /// The bind reservation of `host` for `port`.
    #[must_use]
    pub fn find_reservation(&self, host: &str, port: SessionPort) -> Option<&SessionEntry> {
        self.entries
            .get(&(host.to_string(), 0))
            .and_then(|v| v.iter().find(|e| e.session_port == port))
    }

    /// Remove the bind reservation of `host` for `port`.
    pub fn remove_reservation(&mut self, host: &str, port: SessionPort) -> Option<SessionEntry> {
        let key = (host.to_string(), 0);
        let slot = self.entries.get_mut(&key)?;
        let pos = slot.iter().position(|e| e.session_port == port)?;
        let entry = slot.remove(pos);
        if slot.is_empty() {
            self.entries.remove(&key);
        }
        Some(entry)
    }

    /// Remove every row under `(name, id)`.
    pub fn erase(&mut self, name: &str, id: SessionId) -> Vec<SessionEntry> {
        self.entries
            .remove(&(name.to_string(), id))
            .unwrap_or_default()
    }

    /// All reservations of `host` (id-0 rows).
    #[must_use]
    pub fn reservations_of(&self, host: &str) -> Vec<&SessionEntry> {
        self.entries
            .get(&(host.to_string(), 0))
            .map_or_else(Vec::new, |v| v.iter().collect())
    }

    /// All rows owned by `name`, any id.
    #[must_use]
    pub fn rows_of(&self, name: &str) -> Vec<&SessionEntry> {
        self.entries
            .range((name.to_string(), 0)..)
            .take_while(|((n, _), _)| n == name)
            .flat_map(|(_, v)| v.iter())
            .collect()
    }

    /// True iff any row (either side) carries session `id`.
    #[must_use]
    pub fn id_in_use(&self, id: SessionId) -> bool {
        id != 0 && self.entries.keys().any(|(_, rid)| *rid == id)
    }

    /// Pick an unused port for `host`, scanning upward from `base`, wrapping,
    /// never assigning zero. `None` when the reservation space is full.
    #[must_use]
    pub fn next_free_port(&self, host: &str, base: SessionPort) -> Option<SessionPort> {
        let used: std::collections::BTreeSet<SessionPort> = self
            .reservations_of(host)
            .iter()
            .map(|e| e.session_port)
            .collect();
        if used.len() >= usize::from(u16::MAX) {
            return None;
        }
        let mut candidate = base;
        loop {
            if candidate != 0 && !used.contains(&candidate) {
                return Some(candidate);
            }
            candidate = candidate.wrapping_add(1);
            if candidate == base {
                return None;
            }
        }
    }

    /// Iterate all rows.
    pub fn iter(&self) -> impl Iterator<Item = &SessionEntry> {
        self.entries.values().flatten()
    }

    /// Snapshot of all keys (for sweeps that mutate while iterating).
    #[must_use]
    pub fn keys(&self) -> Vec<SessionKey> {
        self.entries.keys().cloned().collect()
    }

    /// Mutable access to the rows under a snapshotted key.
    pub fn rows_mut(&mut self, key: &SessionKey) -> Option<&mut Vec<SessionEntry>> {
        self.entries.get_mut(key)
    }

    /// Drop a key whose row vector emptied during a sweep.
    pub fn prune(&mut self, key: &SessionKey) {
        if self.entries.get(key).is_some_and(Vec::is_empty) {
            self.entries.remove(key);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Session id generation
// ============================================================================

/// Draw a session id: uniformly random, never zero, redrawn while it collides
/// with any session this daemon already carries.
pub(crate) fn generate_session_id(sessions: &SessionMap) -> SessionId {
    loop {
        let id = fastrand::u32(..);
        if id != 0 && !sessions.id_in_use(id) {
            return id;
        }
    }
}
