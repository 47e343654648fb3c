// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Virtual endpoints.
//!
//! A virtual endpoint names a remote client and records which bus-to-bus
//! links reach it. Session id 0 holds the session-less routes installed by
//! name exchange; non-zero ids are bound when a session is installed and
//! select the link that session's traffic must use.

use crate::bus::SessionId;
use std::collections::BTreeMap;

/// A remote client reachable via one or more bus-to-bus links.
#[derive(Clone, Debug)]
pub struct VirtualEndpoint {
    unique_name: String,
    /// Session id -> bus-to-bus endpoint names. Id 0 carries the default
    /// (session-less) routes in arrival order.
    routes: BTreeMap<SessionId, Vec<String>>,
}

impl VirtualEndpoint {
    /// Create with one session-less route.
    #[must_use]
    pub fn new(unique_name: &str, b2b: &str) -> Self {
        let mut routes = BTreeMap::new();
        routes.insert(0, vec![b2b.to_string()]);
        Self {
            unique_name: unique_name.to_string(),
            routes,
        }
    }

    #[inline]
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Add a session-less route. Returns true iff the route set changed.
    pub fn add_b2b(&mut self, b2b: &str) -> bool {
        let slot = self.routes.entry(0).or_default();
        if slot.iter().any(|n| n == b2b) {
            return false;
        }
        slot.push(b2b.to_string());
        true
    }

    /// Remove `b2b` from every session's route set. Returns true iff the
    /// endpoint has no routes left (and must be destroyed before the state
    /// lock is released).
    pub fn remove_b2b(&mut self, b2b: &str) -> bool {
        self.routes.retain(|_, links| {
            links.retain(|n| n != b2b);
            !links.is_empty()
        });
        self.routes.is_empty()
    }

    /// Bind a session to a link.
    pub fn add_session_ref(&mut self, id: SessionId, b2b: &str) {
        let slot = self.routes.entry(id).or_default();
        if !slot.iter().any(|n| n == b2b) {
            slot.push(b2b.to_string());
        }
    }

    /// Drop a session binding.
    pub fn remove_session_ref(&mut self, id: SessionId) {
        if id != 0 {
            self.routes.remove(&id);
        }
    }

    /// The link bound for `id`, falling back to the first session-less route.
    #[must_use]
    pub fn b2b_for_session(&self, id: SessionId) -> Option<&str> {
        self.routes
            .get(&id)
            .and_then(|links| links.first())
            .or_else(|| self.routes.get(&0).and_then(|links| links.first()))
            .map(String::as_str)
    }

    /// True iff `b2b` appears anywhere in the route set.
    #[must_use]
    pub fn can_use_route(&self, b2b: &str) -> bool {
        self.routes.values().any(|links| links.iter().any(|n| n == b2b))
    }

    /// Session ids (non-zero) whose only route is `b2b`. Losing that link
    /// loses those sessions.
    #[must_use]
    pub fn sessions_uniquely_via(&self, b2b: &str) -> Vec<SessionId> {
        self.routes
            .iter()
            .filter(|(id, links)| **id != 0 && links.len() == 1 && links[0] == b2b)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every distinct link name in the route set.
    #[must_use]
    pub fn b2b_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.values().flatten().cloned().collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
