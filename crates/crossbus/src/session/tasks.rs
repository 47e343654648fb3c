// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Worker-task registry.
//!
//! Join and attach operations can block for seconds on remote daemons, so
//! each runs on its own short-lived thread; reentrant calls (the accept
//! probe, nested AttachSession) land on the dispatcher while the initiator is
//! parked. The registry tracks live workers so shutdown can drain them.

use crate::config::SHUTDOWN_JOIN_POLL_MS;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Live worker threads, keyed by a monotonic task id.
pub(crate) struct TaskRegistry {
    next_id: AtomicU64,
    tasks: DashMap<u64, JoinHandle<()>>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            tasks: DashMap::new(),
        })
    }

    /// Spawn a named worker and track it until it finishes. The worker
    /// removes its own registry entry on exit.
    pub fn spawn<F>(self: &Arc<Self>, name: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                f();
                registry.tasks.remove(&id);
            });
        match handle {
            Ok(h) => {
                self.tasks.insert(id, h);
            }
            Err(e) => {
                log::error!("[SESSION] failed to spawn worker {}: {}", name, e);
            }
        }
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Block until every tracked worker has exited. Callers latch the
    /// stopping flag first so no new workers appear.
    pub fn drain(&self) {
        loop {
            let ids: Vec<u64> = self.tasks.iter().map(|e| *e.key()).collect();
            for id in ids {
                if let Some((_, handle)) = self.tasks.remove(&id) {
                    let _ = handle.join();
                }
            }
            if self.tasks.is_empty() {
                return;
            }
            std::thread::sleep(Duration::from_millis(SHUTDOWN_JOIN_POLL_MS));
        }
    }
}
