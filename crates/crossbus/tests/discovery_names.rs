// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Advertise/discover registries, the TTL name map and its reaper.

mod common;

use common::{Daemon, Event, Mesh};
use crossbus::config::TTL_INFINITE_MS;
use crossbus::protocol::reply::{
    AdvertiseReply, CancelAdvertiseReply, CancelFindReply, FindReply,
};
use crossbus::{
    BusCore, EventSink, SessionOpts, Transport, TransportMask, TransportPolicy, TRANSPORT_LOCAL,
    TRANSPORT_TCP,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn advertise_cancel_round_trips_through_the_transport() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let owner = d.core.register_local_client().unwrap();

    assert_eq!(
        d.core.advertise_name(&owner, "com.example.a", TRANSPORT_TCP),
        AdvertiseReply::Success
    );
    assert_eq!(
        d.transport.active_advertisements(),
        vec!["com.example.a".to_string()]
    );
    assert_eq!(d.core.advertised_names(), vec!["com.example.a".to_string()]);

    assert_eq!(
        d.core
            .cancel_advertise_name(&owner, "com.example.a", TRANSPORT_TCP),
        CancelAdvertiseReply::Success
    );
    assert!(d.transport.active_advertisements().is_empty());
    assert!(d.core.advertised_names().is_empty());

    // Cancelling again has nothing to remove.
    assert_eq!(
        d.core
            .cancel_advertise_name(&owner, "com.example.a", TRANSPORT_TCP),
        CancelAdvertiseReply::Failed
    );
    d.core.shutdown();
}

#[test]
fn overlapping_advertisement_is_reported() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let a = d.core.register_local_client().unwrap();
    let b = d.core.register_local_client().unwrap();

    assert_eq!(
        d.core.advertise_name(&a, "com.example.a", TRANSPORT_TCP),
        AdvertiseReply::Success
    );
    assert_eq!(
        d.core.advertise_name(&a, "com.example.a", TRANSPORT_TCP),
        AdvertiseReply::AlreadyAdvertising
    );
    // A different owner may advertise the same name.
    assert_eq!(
        d.core.advertise_name(&b, "com.example.a", TRANSPORT_TCP),
        AdvertiseReply::Success
    );
    d.core.shutdown();
}

#[test]
fn local_advertisement_reaches_local_discoverers() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let owner = d.core.register_local_client().unwrap();
    let finder = d.core.register_local_client().unwrap();

    assert_eq!(
        d.core.find_advertised_name(&finder, "com.example."),
        FindReply::Success
    );
    assert_eq!(
        d.core.find_advertised_name(&finder, "com.example."),
        FindReply::AlreadyDiscovering
    );

    assert_eq!(
        d.core
            .advertise_name(&owner, "com.example.here", TRANSPORT_LOCAL | TRANSPORT_TCP),
        AdvertiseReply::Success
    );
    d.sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::FoundName { dest, name, transport, .. }
                if *dest == finder && name == "com.example.here" && *transport == TRANSPORT_LOCAL)
        })
        .expect("local discoverer saw the advertisement");

    d.core
        .cancel_advertise_name(&owner, "com.example.here", TRANSPORT_LOCAL | TRANSPORT_TCP);
    d.sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::LostName { dest, name, .. }
                if *dest == finder && name == "com.example.here")
        })
        .expect("local discoverer saw the name go away");
    d.core.shutdown();
}

#[test]
fn find_replays_existing_names_once_per_transport() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let finder = d.core.register_local_client().unwrap();

    // The same name from two daemons on the same transport.
    d.core.found_names(
        "mem:a",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.dup".to_string()]),
        TTL_INFINITE_MS,
    );
    d.core.found_names(
        "mem:b",
        "0000bbbb",
        TRANSPORT_TCP,
        Some(&["com.example.dup".to_string()]),
        TTL_INFINITE_MS,
    );

    assert_eq!(
        d.core.find_advertised_name(&finder, "com.example."),
        FindReply::Success
    );
    // Catch-up is deduplicated per (name, transport).
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        d.sink.count(|e| matches!(e, Event::FoundName { name, .. }
            if name == "com.example.dup")),
        1
    );
    d.core.shutdown();
}

#[test]
fn finite_ttl_records_are_reaped() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let finder = d.core.register_local_client().unwrap();
    d.core.find_advertised_name(&finder, "com.example.");

    d.core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.brief".to_string()]),
        100,
    );
    d.sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::FoundName { name, .. } if name == "com.example.brief")
        })
        .expect("fresh record reported");
    d.sink
        .wait_for(Duration::from_secs(3), |e| {
            matches!(e, Event::LostName { dest, name, .. }
                if *dest == finder && name == "com.example.brief")
        })
        .expect("record expired within a reaper cycle");
    d.core.shutdown();
}

#[test]
fn infinite_ttl_records_survive_the_reaper() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let finder = d.core.register_local_client().unwrap();
    d.core.find_advertised_name(&finder, "com.example.");

    d.core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.forever".to_string()]),
        TTL_INFINITE_MS,
    );
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(
        d.sink
            .count(|e| matches!(e, Event::LostName { name, .. } if name == "com.example.forever")),
        0
    );
    d.core.shutdown();
}

#[test]
fn ttl_zero_flushes_a_record() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let finder = d.core.register_local_client().unwrap();
    d.core.find_advertised_name(&finder, "com.example.");

    d.core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.gone".to_string()]),
        TTL_INFINITE_MS,
    );
    d.core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.gone".to_string()]),
        0,
    );
    d.sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::LostName { name, .. } if name == "com.example.gone")
        })
        .expect("flush reported as a lost name");
    d.core.shutdown();
}

#[test]
fn cancel_find_toggles_transport_discovery_and_flushes() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let finder = d.core.register_local_client().unwrap();

    d.core.find_advertised_name(&finder, "com.example.");
    assert_eq!(
        d.transport.active_discoveries(),
        vec!["com.example.".to_string()]
    );

    // A remote record sits in the name map...
    d.core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.x".to_string()]),
        TTL_INFINITE_MS,
    );

    assert_eq!(
        d.core.cancel_find_advertised_name(&finder, "com.example."),
        CancelFindReply::Success
    );
    assert!(d.transport.active_discoveries().is_empty());

    // ...and was flushed when the last discoverer left: a fresh discoverer
    // sees no catch-up.
    d.core.find_advertised_name(&finder, "com.example.");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        d.sink
            .count(|e| matches!(e, Event::FoundName { name, .. } if name == "com.example.x")),
        0
    );
    d.core.shutdown();
}

// A policy that forbids every remote transport.
struct NoRemotePolicy;

impl TransportPolicy for NoRemotePolicy {
    fn allowed(&self, _owner: &str, requested: TransportMask) -> TransportMask {
        requested & TRANSPORT_LOCAL
    }
}

struct QuietSink;

impl EventSink for QuietSink {
    fn accept_session_joiner(
        &self,
        _: &str,
        _: u16,
        _: u32,
        _: &str,
        _: &SessionOpts,
    ) -> crossbus::bus::Result<bool> {
        Ok(true)
    }
    fn session_joined(&self, _: &str, _: u16, _: u32, _: &str) {}
    fn session_lost(&self, _: &str, _: u32) {}
    fn mp_session_changed(&self, _: &str, _: u32, _: &str, _: bool) {}
    fn found_advertised_name(&self, _: &str, _: &str, _: TransportMask, _: &str) {
        panic!("forbidden transport leaked a FoundAdvertisedName");
    }
    fn lost_advertised_name(&self, _: &str, _: &str, _: TransportMask, _: &str) {}
}

#[test]
fn forbidden_transports_withhold_matches() {
    let mesh = Mesh::new();
    let transport = common::MemTransport::new(&mesh, "mem:solo");
    let core = BusCore::builder()
        .event_sink(Arc::new(QuietSink))
        .transport(transport.clone() as Arc<dyn Transport>)
        .policy(Arc::new(NoRemotePolicy))
        .build()
        .unwrap();
    let finder = core.register_local_client().unwrap();

    assert_eq!(core.find_advertised_name(&finder, "com.example."), FindReply::Success);
    // Discovery was not enabled on the forbidden transport.
    assert!(transport.active_discoveries().is_empty());

    // A record arriving on the forbidden transport is withheld.
    core.found_names(
        "mem:far",
        "0000aaaa",
        TRANSPORT_TCP,
        Some(&["com.example.hidden".to_string()]),
        TTL_INFINITE_MS,
    );
    std::thread::sleep(Duration::from_millis(50));
    core.shutdown();
}
