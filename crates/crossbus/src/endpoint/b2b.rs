// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Bus-to-bus endpoint records.
//!
//! Each record pairs the shared link name with the [`PeerLink`] object and
//! two counters: `refs` (sessions being set up over the link; a referenced
//! link is not torn down) and `waiters` (in-flight pushes with the locks
//! released; a link with waiters must not be destroyed underneath them).

use crate::bus::guid::controller_name;
use crate::bus::BusGuid;
use crate::transport::PeerLink;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A registered link to a sibling daemon.
pub struct B2bEndpoint {
    unique_name: String,
    link: Arc<dyn PeerLink>,
    remote_guid: BusGuid,
    remote_name: String,
    refs: i32,
    waiters: Arc<AtomicU32>,
}

impl B2bEndpoint {
    #[must_use]
    pub fn new(unique_name: &str, link: Arc<dyn PeerLink>, remote_guid: BusGuid) -> Self {
        let remote_name = controller_name(&remote_guid);
        Self {
            unique_name: unique_name.to_string(),
            link,
            remote_guid,
            remote_name,
            refs: 0,
            waiters: Arc::new(AtomicU32::new(0)),
        }
    }

    #[inline]
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Short GUID of the daemon on the far side.
    #[inline]
    #[must_use]
    pub fn remote_guid(&self) -> &BusGuid {
        &self.remote_guid
    }

    /// Unique name of the remote bus controller (`:<remoteGuid>.1`).
    #[inline]
    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn increment_ref(&mut self) {
        self.refs += 1;
    }

    pub fn decrement_ref(&mut self) {
        self.refs -= 1;
        if self.refs < 0 {
            log::warn!(
                "[B2B] ref count of {} dropped below zero",
                self.unique_name
            );
        }
    }

    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> i32 {
        self.refs
    }

    #[inline]
    #[must_use]
    pub fn has_waiters(&self) -> bool {
        self.waiters.load(Ordering::Acquire) > 0
    }

    /// Take a push reference: the link plus a waiter held for as long as the
    /// returned [`LinkRef`] lives. Call under lock, push after releasing.
    #[must_use]
    pub fn hold(&self) -> LinkRef {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        LinkRef {
            link: Arc::clone(&self.link),
            waiters: Arc::clone(&self.waiters),
        }
    }
}

/// RAII waiter on a bus-to-bus link.
pub struct LinkRef {
    link: Arc<dyn PeerLink>,
    waiters: Arc<AtomicU32>,
}

impl LinkRef {
    #[inline]
    #[must_use]
    pub fn link(&self) -> &Arc<dyn PeerLink> {
        &self.link
    }
}

impl Drop for LinkRef {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::ops::Deref for LinkRef {
    type Target = dyn PeerLink;

    fn deref(&self) -> &Self::Target {
        self.link.as_ref()
    }
}
