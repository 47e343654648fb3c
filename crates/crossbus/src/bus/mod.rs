// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Public API home: errors, GUIDs, the local event surface, and the
//! [`BusCore`] facade.
//!
//! Client-visible failures of the bus methods (join, bind, advertise, ...)
//! are expressed through the reply-code enums in [`crate::protocol::reply`];
//! [`Error`] covers internal and transport-level failures only.

mod daemon;
mod events;
pub mod guid;
pub(crate) mod shared;

pub use daemon::{BusCore, BusCoreBuilder};
pub use events::EventSink;
pub use guid::BusGuid;

/// Session identifier. Zero marks a bind reservation, never a live session.
pub type SessionId = u32;

/// Session port bound by a host. Zero is the "any" wildcard in requests.
pub type SessionPort = u16;

/// Errors returned by crossbus core operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Validation
    // ========================================================================
    /// Request arguments are ill-formed.
    BadArgs(String),
    /// A bus or unique name violates the naming rules.
    IllegalName(String),
    /// The operation is not valid in the current state.
    InvalidState(String),

    // ========================================================================
    // Endpoints / sessions
    // ========================================================================
    /// No endpoint with the given name.
    NoEndpoint(String),
    /// No session entry for the given (endpoint, id).
    NoSession,
    /// The endpoint is not (or no longer) connected.
    NotConnected,
    /// No route for the requested destination.
    NoRoute(String),

    // ========================================================================
    // Transport
    // ========================================================================
    /// Underlying I/O failure.
    Io(std::io::Error),
    /// No registered transport supports the requested mask or address.
    NoTransport(String),
    /// Transport connect failed.
    ConnectFailed(String),
    /// Pushing a message over a link failed.
    SendFailed(String),
    /// The link does not support the requested operation.
    Unsupported,

    // ========================================================================
    // Remote / lifecycle
    // ========================================================================
    /// The remote daemon answered with an error reply code.
    ReplyError(u32),
    /// A deadline elapsed.
    Timeout,
    /// The daemon is shutting down; no new work is accepted.
    Stopping,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadArgs(msg) => write!(f, "Bad arguments: {}", msg),
            Error::IllegalName(name) => write!(f, "Illegal name: {}", name),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NoEndpoint(name) => write!(f, "No such endpoint: {}", name),
            Error::NoSession => write!(f, "No such session"),
            Error::NotConnected => write!(f, "Endpoint not connected"),
            Error::NoRoute(dst) => write!(f, "No route to {}", dst),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NoTransport(what) => write!(f, "No transport for {}", what),
            Error::ConnectFailed(addr) => write!(f, "Connect failed: {}", addr),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::Unsupported => write!(f, "Unsupported operation"),
            Error::ReplyError(code) => write!(f, "Remote replied with error code {}", code),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Stopping => write!(f, "Daemon is stopping"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
