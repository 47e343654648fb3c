// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Global configuration - single source of truth.
//!
//! This module centralizes the protocol constants and runtime configuration of
//! the daemon core. **Never hardcode these values elsewhere!**
//!
//! - **Level 1 (Static)**: compile-time constants (ports, deadlines, poll
//!   intervals).
//! - **Level 2 (Dynamic)**: [`BusConfig`] held in an `ArcSwap` cell so the
//!   embedder can adjust deadlines at runtime without locking.

use arc_swap::ArcSwap;
use std::sync::Arc;

// =======================================================================
// Session ports
// =======================================================================

/// Wildcard session port: ask the daemon to pick an unused port.
pub const SESSION_PORT_ANY: u16 = 0;

/// First candidate when auto-assigning a session port.
///
/// The scan walks the 16-bit space upward from here, wrapping, and never
/// assigns zero.
pub const AUTO_SESSION_PORT_BASE: u16 = 10_000;

// =======================================================================
// Join / attach deadlines
// =======================================================================

/// How long a join waits for the remote daemon's name exchange to make the
/// session host reachable through a freshly connected bus-to-bus link.
pub const WAIT_ROUTE_TIMEOUT_MS: u64 = 30_000;

/// Poll interval of the wait-for-route loop. Both core locks are released
/// across every sleep.
pub const WAIT_ROUTE_POLL_MS: u64 = 10;

/// Deadline for an `AttachSession` method call to a sibling daemon.
pub const ATTACH_RPC_TIMEOUT_MS: u64 = 30_000;

/// One-shot settle delay when an `AttachSession` arrives for a destination
/// that is not (yet) registered locally. Another daemon can know we are a
/// multipoint member before our own join has finished installing the endpoint.
pub const DEST_SETTLE_MS: u64 = 500;

// =======================================================================
// Raw sessions
// =======================================================================

/// Deadline for `GetSessionFd` to observe the handed-off socket.
pub const SESSION_FD_TIMEOUT_MS: u64 = 5_000;

/// Poll interval of the `GetSessionFd` wait loop.
pub const SESSION_FD_POLL_MS: u64 = 5;

/// Chunk size of the raw relay pump between two torn-down bus-to-bus links.
pub const RAW_PUMP_CHUNK: usize = 4096;

// =======================================================================
// Name discovery
// =======================================================================

/// TTL sentinel for name-map records that never expire (locally injected
/// advertisements).
pub const TTL_INFINITE_MS: u32 = u32::MAX;

// =======================================================================
// Shutdown
// =======================================================================

/// Poll interval while waiting for outstanding join/attach workers to drain.
pub const SHUTDOWN_JOIN_POLL_MS: u64 = 50;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Tunable runtime knobs. Defaults mirror the static constants above.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Wait-for-route deadline (ms). See [`WAIT_ROUTE_TIMEOUT_MS`].
    pub wait_route_timeout_ms: u64,
    /// AttachSession RPC deadline (ms).
    pub attach_rpc_timeout_ms: u64,
    /// GetSessionFd deadline (ms).
    pub session_fd_timeout_ms: u64,
    /// Destination settle delay for early AttachSession arrivals (ms).
    pub dest_settle_ms: u64,
    /// First candidate for auto-assigned session ports.
    pub auto_port_base: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            wait_route_timeout_ms: WAIT_ROUTE_TIMEOUT_MS,
            attach_rpc_timeout_ms: ATTACH_RPC_TIMEOUT_MS,
            session_fd_timeout_ms: SESSION_FD_TIMEOUT_MS,
            dest_settle_ms: DEST_SETTLE_MS,
            auto_port_base: AUTO_SESSION_PORT_BASE,
        }
    }
}

/// Lock-free cell holding the live [`BusConfig`].
pub type ConfigCell = ArcSwap<BusConfig>;

/// Create a config cell seeded with `cfg`.
pub fn config_cell(cfg: BusConfig) -> ConfigCell {
    ArcSwap::from(Arc::new(cfg))
}
