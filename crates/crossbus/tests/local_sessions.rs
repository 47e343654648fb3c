// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Same-daemon session lifecycle: bind/unbind, point-to-point joins, raw
//! socketpair sessions, self-join refusal and the reply-code edges.

mod common;

use common::{Daemon, Event, Mesh};
use crossbus::protocol::reply::{BindReply, LeaveReply, UnbindReply};
use crossbus::{JoinReply, SessionOpts, TrafficType};
use std::io::{Read, Write};
use std::sync::mpsc;
use std::time::Duration;

#[test]
fn local_point_to_point_join_and_leave() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();

    let (rc, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());
    assert_eq!(rc, BindReply::Success);
    assert!(port >= 10_000);

    let outcome = d.core.join_session(&joiner, &host, port, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::Success);
    assert_ne!(outcome.id, 0);
    assert_eq!(outcome.opts.traffic, TrafficType::Messages);

    let joined = d
        .sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::Joined { host: h, joiner: j, .. } if *h == host && *j == joiner)
        })
        .expect("host saw SessionJoined");
    if let Event::Joined { port: p, id, .. } = joined {
        assert_eq!(p, port);
        assert_eq!(id, outcome.id);
    }
    assert!(d.core.has_session(&host, outcome.id));
    assert!(d.core.has_session(&joiner, outcome.id));
    assert!(d.core.invariant_violations().is_empty());

    assert_eq!(d.core.leave_session(&joiner, outcome.id), LeaveReply::Success);
    d.sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::Lost { dest, id } if *dest == host && *id == outcome.id)
        })
        .expect("host saw SessionLost");
    assert!(!d.core.has_session(&host, outcome.id));
    assert!(!d.core.has_session(&joiner, outcome.id));
    assert!(d.core.invariant_violations().is_empty());

    d.core.shutdown();
}

#[test]
fn local_raw_session_hands_off_sockets() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();

    let (rc, port) = d
        .core
        .bind_session_port(&host, 0, SessionOpts::raw_reliable());
    assert_eq!(rc, BindReply::Success);

    let outcome = d
        .core
        .join_session(&joiner, &host, port, SessionOpts::raw_reliable());
    assert_eq!(outcome.reply, JoinReply::Success);
    assert_eq!(outcome.opts.traffic, TrafficType::RawReliable);

    let host_fd = d.core.get_session_fd(&host, outcome.id).expect("host fd");
    let joiner_fd = d.core.get_session_fd(&joiner, outcome.id).expect("joiner fd");

    (&host_fd).write_all(b"over the wire").unwrap();
    let mut buf = [0u8; 13];
    (&joiner_fd).read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"over the wire");

    // Ownership moved to the callers; the rows are gone.
    assert!(!d.core.has_session(&host, outcome.id));
    assert!(!d.core.has_session(&joiner, outcome.id));
    d.core.shutdown();
}

#[test]
fn self_join_is_refused() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());

    let outcome = d.core.join_session(&host, &host, port, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::AlreadyJoined);
    assert_eq!(outcome.id, 0);
    assert_eq!(d.sink.count(|e| matches!(e, Event::Joined { .. })), 0);
    d.core.shutdown();
}

#[test]
fn bind_reply_codes() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();

    // Unsupported traffic types are refused at bind time.
    let raw_unreliable = SessionOpts {
        traffic: TrafficType::RawUnreliable,
        ..SessionOpts::messages()
    };
    assert_eq!(
        d.core.bind_session_port(&host, 7, raw_unreliable).0,
        BindReply::InvalidOpts
    );
    let raw_multipoint = SessionOpts {
        is_multipoint: true,
        ..SessionOpts::raw_reliable()
    };
    assert_eq!(
        d.core.bind_session_port(&host, 7, raw_multipoint).0,
        BindReply::InvalidOpts
    );

    assert_eq!(
        d.core.bind_session_port(&host, 7, SessionOpts::messages()).0,
        BindReply::Success
    );
    assert_eq!(
        d.core.bind_session_port(&host, 7, SessionOpts::messages()).0,
        BindReply::AlreadyExists
    );
    d.core.shutdown();
}

#[test]
fn unbind_removes_exactly_one_reservation() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let (_, p1) = d.core.bind_session_port(&host, 0, SessionOpts::messages());
    let (_, p2) = d.core.bind_session_port(&host, 0, SessionOpts::messages());
    assert_ne!(p1, p2);

    assert_eq!(d.core.unbind_session_port(&host, p1), UnbindReply::Success);
    assert_eq!(d.core.unbind_session_port(&host, p1), UnbindReply::BadPort);
    assert_eq!(d.core.unbind_session_port(&host, p2), UnbindReply::Success);
    d.core.shutdown();
}

#[test]
fn join_without_reservation_is_no_session() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();

    let outcome = d.core.join_session(&joiner, &host, 4321, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::NoSession);

    // An entirely unknown host is equally unjoinable.
    let outcome = d
        .core
        .join_session(&joiner, ":00000000.9", 4321, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::NoSession);
    d.core.shutdown();
}

#[test]
fn host_can_reject_joiners() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());

    d.sink.set_accept(false);
    let outcome = d.core.join_session(&joiner, &host, port, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::Rejected);
    assert_eq!(d.sink.count(|e| matches!(e, Event::Joined { .. })), 0);
    assert!(d.core.invariant_violations().is_empty());

    // The reservation is intact; an accepted join still works.
    d.sink.set_accept(true);
    let outcome = d.core.join_session(&joiner, &host, port, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::Success);
    d.core.shutdown();
}

#[test]
fn incompatible_opts_are_refused() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());

    let outcome = d
        .core
        .join_session(&joiner, &host, port, SessionOpts::raw_reliable());
    assert_eq!(outcome.reply, JoinReply::BadSessionOpts);
    d.core.shutdown();
}

#[test]
fn multipoint_rejoin_is_already_joined() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::multipoint());

    let first = d.core.join_session(&joiner, &host, port, SessionOpts::multipoint());
    assert_eq!(first.reply, JoinReply::Success);
    let second = d.core.join_session(&joiner, &host, port, SessionOpts::multipoint());
    assert_eq!(second.reply, JoinReply::AlreadyJoined);
    d.core.shutdown();
}

#[test]
fn local_multipoint_roster_updates() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let j1 = d.core.register_local_client().unwrap();
    let j2 = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::multipoint());

    let first = d.core.join_session(&j1, &host, port, SessionOpts::multipoint());
    assert_eq!(first.reply, JoinReply::Success);
    let second = d.core.join_session(&j2, &host, port, SessionOpts::multipoint());
    assert_eq!(second.reply, JoinReply::Success);
    assert_eq!(first.id, second.id);

    // The host hears about both joins, j1 about j2's arrival, and j2 gets a
    // catch-up for the host and j1.
    assert!(d
        .sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::MpChanged { dest, member, added: true, .. }
                if *dest == j1 && *member == j2)
        })
        .is_some());
    assert!(d
        .sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::MpChanged { dest, member, added: true, .. }
                if *dest == j2 && *member == host)
        })
        .is_some());
    assert!(d
        .sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::MpChanged { dest, member, added: true, .. }
                if *dest == j2 && *member == j1)
        })
        .is_some());

    // j2 leaving fans a removal delta to the remaining members.
    assert_eq!(d.core.leave_session(&j2, second.id), LeaveReply::Success);
    assert!(d
        .sink
        .wait_for(Duration::from_secs(1), |e| {
            matches!(e, Event::MpChanged { dest, member, added: false, .. }
                if *dest == j1 && *member == j2)
        })
        .is_some());
    d.core.shutdown();
}

#[test]
fn join_runs_on_a_worker_task() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());

    let (tx, rx) = mpsc::channel();
    d.core
        .spawn_join_session(
            joiner.clone(),
            host.clone(),
            port,
            SessionOpts::messages(),
            move |outcome| {
                tx.send(outcome).unwrap();
            },
        )
        .unwrap();
    let outcome = rx.recv_timeout(Duration::from_secs(5)).expect("join completes");
    assert_eq!(outcome.reply, JoinReply::Success);
    d.core.shutdown();
}

#[test]
fn shutdown_refuses_new_joins() {
    let mesh = Mesh::new();
    let d = Daemon::new(&mesh, "d1");
    let host = d.core.register_local_client().unwrap();
    let joiner = d.core.register_local_client().unwrap();
    let (_, port) = d.core.bind_session_port(&host, 0, SessionOpts::messages());

    d.core.shutdown();
    let outcome = d.core.join_session(&joiner, &host, port, SessionOpts::messages());
    assert_eq!(outcome.reply, JoinReply::Failed);
    assert!(d
        .core
        .spawn_join_session(joiner, host, port, SessionOpts::messages(), |_| {})
        .is_err());
}
