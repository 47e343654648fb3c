// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! The session route table.
//!
//! A route entry is `(sessionId, src, dst) -> viaB2B?`: traffic from `src`
//! within the session egresses toward `dst`, over the named bus-to-bus link
//! when `dst` is virtual. Entries store endpoint *names*; callers re-resolve
//! through the registry under lock on every use.

use crate::bus::SessionId;
use std::collections::BTreeMap;

/// Egress decision for one (session, src, dst) triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTarget {
    /// Destination endpoint name.
    pub dst: String,
    /// Bus-to-bus link to use; `None` for locally served destinations.
    pub via_b2b: Option<String>,
}

/// Route registry for all live sessions.
#[derive(Default)]
pub struct RouteTable {
    routes: BTreeMap<(SessionId, String, String), Option<String>>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one directed route. Idempotent; re-insertion overwrites the
    /// link choice.
    pub fn add_route(&mut self, id: SessionId, src: &str, dst: &str, via_b2b: Option<&str>) {
        self.routes.insert(
            (id, src.to_string(), dst.to_string()),
            via_b2b.map(str::to_string),
        );
    }

    /// Install both directions between `a` and `b`.
    pub fn add_route_pair(
        &mut self,
        id: SessionId,
        a: &str,
        b: &str,
        via_to_b: Option<&str>,
        via_to_a: Option<&str>,
    ) {
        self.add_route(id, a, b, via_to_b);
        self.add_route(id, b, a, via_to_a);
    }

    /// Egress for traffic from `src` to `dst` in session `id`.
    #[must_use]
    pub fn egress(&self, id: SessionId, src: &str, dst: &str) -> Option<RouteTarget> {
        self.routes
            .get(&(id, src.to_string(), dst.to_string()))
            .map(|via| RouteTarget {
                dst: dst.to_string(),
                via_b2b: via.clone(),
            })
    }

    /// All destinations reachable from `src` in session `id` (the fan-out set
    /// of a session-cast).
    #[must_use]
    pub fn targets_from(&self, id: SessionId, src: &str) -> Vec<RouteTarget> {
        self.routes
            .range((id, src.to_string(), String::new())..)
            .take_while(|((rid, rsrc, _), _)| *rid == id && rsrc == src)
            .map(|((_, _, dst), via)| RouteTarget {
                dst: dst.clone(),
                via_b2b: via.clone(),
            })
            .collect()
    }

    /// Remove every route involving `endpoint` (as source or destination) for
    /// session `id`; `id == 0` removes across all sessions. Returns the
    /// removed entries.
    pub fn remove_session_routes(
        &mut self,
        endpoint: &str,
        id: SessionId,
    ) -> Vec<(SessionId, String, String)> {
        let mut removed = Vec::new();
        self.routes.retain(|(rid, src, dst), _| {
            let id_match = id == 0 || *rid == id;
            let involved = src == endpoint || dst == endpoint;
            if id_match && involved {
                removed.push((*rid, src.clone(), dst.clone()));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove every route whose egress link is `b2b`. Returns the removed
    /// entries.
    pub fn remove_routes_via(&mut self, b2b: &str) -> Vec<(SessionId, String, String)> {
        let mut removed = Vec::new();
        self.routes.retain(|(rid, src, dst), via| {
            if via.as_deref() == Some(b2b) {
                removed.push((*rid, src.clone(), dst.clone()));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of installed routes (diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// True iff any route of session `id` exists.
    #[must_use]
    pub fn has_session(&self, id: SessionId) -> bool {
        self.routes.keys().any(|(rid, _, _)| *rid == id)
    }

    /// Iterate all entries (diagnostics, invariant checks).
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &str, &str, Option<&str>)> {
        self.routes
            .iter()
            .map(|((id, src, dst), via)| (*id, src.as_str(), dst.as_str(), via.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut rt = RouteTable::new();
        rt.add_route(7, ":a.2", ":b.3", Some(":a.9"));
        rt.add_route(7, ":a.2", ":b.3", Some(":a.9"));
        assert_eq!(rt.len(), 1);
        assert_eq!(
            rt.egress(7, ":a.2", ":b.3"),
            Some(RouteTarget {
                dst: ":b.3".to_string(),
                via_b2b: Some(":a.9".to_string())
            })
        );
    }

    #[test]
    fn pair_installs_both_directions() {
        let mut rt = RouteTable::new();
        rt.add_route_pair(7, ":a.2", ":b.3", Some(":a.9"), None);
        assert!(rt.egress(7, ":a.2", ":b.3").is_some());
        let back = rt.egress(7, ":b.3", ":a.2").expect("reverse route");
        assert_eq!(back.via_b2b, None);
    }

    #[test]
    fn remove_by_endpoint_and_session() {
        let mut rt = RouteTable::new();
        rt.add_route_pair(7, ":a.2", ":b.3", None, None);
        rt.add_route_pair(8, ":a.2", ":c.4", None, None);
        let removed = rt.remove_session_routes(":a.2", 7);
        assert_eq!(removed.len(), 2);
        assert!(rt.has_session(8));
        assert!(!rt.has_session(7));

        // Wildcard removes the rest.
        rt.remove_session_routes(":a.2", 0);
        assert!(rt.is_empty());
    }

    #[test]
    fn remove_via_link_removes_exactly_those() {
        let mut rt = RouteTable::new();
        rt.add_route_pair(7, ":a.2", ":b.3", Some(":a.9"), None);
        rt.add_route_pair(8, ":a.2", ":c.4", Some(":a.10"), None);
        let removed = rt.remove_routes_via(":a.9");
        assert_eq!(removed.len(), 1);
        assert!(rt.egress(7, ":b.3", ":a.2").is_some());
        assert!(rt.egress(7, ":a.2", ":b.3").is_none());
        assert!(rt.has_session(8));
    }

    #[test]
    fn targets_from_lists_fanout() {
        let mut rt = RouteTable::new();
        rt.add_route(7, ":a.2", ":b.3", None);
        rt.add_route(7, ":a.2", ":c.4", Some(":a.9"));
        rt.add_route(9, ":a.2", ":d.5", None);
        let targets = rt.targets_from(7, ":a.2");
        assert_eq!(targets.len(), 2);
    }
}
