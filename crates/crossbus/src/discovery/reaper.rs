// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! TTL reaper for the name-discovery map.
//!
//! One background task sleeps until the next scheduled expiry, wakes, sweeps
//! the map, fires `LostAdvertisedName` per removed record, and reschedules.
//! New records alert it through a channel so a short-lived record cannot be
//! stranded behind a long sleep.

use crate::bus::BusCore;
use crossbeam::channel::{bounded, Receiver};
use std::time::Instant;

/// Spawn the reaper on the core's task registry and wire its alert channel.
pub(crate) fn spawn(core: &BusCore) {
    let (tx, rx) = bounded::<()>(1);
    core.shared.set_reaper_alert(tx);
    let core = core.clone();
    let registry = std::sync::Arc::clone(&core.shared.tasks);
    registry.spawn("name-reaper", move || reaper_loop(&core, &rx));
}

fn reaper_loop(core: &BusCore, alert: &Receiver<()>) {
    log::debug!("[REAPER] started");
    while !core.shared.is_stopping() {
        let (lost, next) = {
            let mut l = core.shared.lock();
            l.state.name_map.reap(Instant::now())
        };
        for (name, transport) in lost {
            log::debug!("[REAPER] expiring discovered name {}", name);
            core.notify_lost_name(&name, transport);
        }
        // Sleep until the next expiry, an alert, or shutdown.
        let woke = match next {
            Some(wait) => alert.recv_timeout(wait),
            None => alert
                .recv()
                .map_err(|_| crossbeam::channel::RecvTimeoutError::Disconnected),
        };
        if matches!(woke, Err(crossbeam::channel::RecvTimeoutError::Disconnected)) {
            break;
        }
    }
    log::debug!("[REAPER] stopped");
}
