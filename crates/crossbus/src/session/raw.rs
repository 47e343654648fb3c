// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 crossbus contributors

//! Raw-socket sessions.
//!
//! A raw session exists to hand each participant a connected socket; after
//! setup no bus routing is involved. For local pairs the daemon creates a
//! socketpair at join time. For remote raw sessions the negotiated
//! bus-to-bus link is torn down into its socket, and a forwarding daemon in
//! the middle runs a byte pump between its two links.

use crate::bus::{BusCore, Error, Result, SessionId};
use crate::config::{RAW_PUMP_CHUNK, SESSION_FD_POLL_MS};
use crate::transport::RawStream;
use socket2::{Domain, Socket, Type};
use std::io::{Read, Write};
use std::net::Shutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Create the connected pair for a local raw session.
pub(crate) fn socket_pair() -> Result<(RawStream, RawStream)> {
    let (a, b) = Socket::pair(Domain::UNIX, Type::STREAM, None)?;
    Ok((a, b))
}

impl BusCore {
    /// `GetSessionFd`: wait (bounded) for the raw session's socket to land in
    /// `sender`'s session entry, then transfer ownership to the caller. The
    /// entry is removed; its removal was deferred until now.
    pub fn get_session_fd(&self, sender: &str, id: SessionId) -> Result<RawStream> {
        let deadline =
            Instant::now() + Duration::from_millis(self.shared.config().session_fd_timeout_ms);
        loop {
            {
                let mut l = self.shared.lock();
                let Some(entry) = l.state.sessions.find_mut(sender, id) else {
                    return Err(Error::NoSession);
                };
                if entry.opts.traffic == crate::protocol::opts::TrafficType::Messages {
                    return Err(Error::NoSession);
                }
                if let Some(fd) = entry.fd.take() {
                    l.state.sessions.erase(sender, id);
                    log::debug!("[SESSION] GetSessionFd({}, {}) handed off", sender, id);
                    return Ok(fd);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            std::thread::sleep(Duration::from_millis(SESSION_FD_POLL_MS));
        }
    }
}

/// Shut down and close a raw session socket (leave path).
pub(crate) fn shutdown_socket(sock: &RawStream) {
    let _ = sock.shutdown(Shutdown::Both);
}

/// Start the bidirectional byte pump of a raw middle-man between two
/// extracted sockets. Runs on two detached threads; each direction copies
/// chunks of [`RAW_PUMP_CHUNK`] bytes until EOF or error.
pub fn spawn_stream_pump(id: SessionId, a: RawStream, b: RawStream) -> Result<()> {
    let a = Arc::new(a);
    let b = Arc::new(b);
    spawn_pump_half(id, "fwd", Arc::clone(&a), Arc::clone(&b))?;
    spawn_pump_half(id, "rev", b, a)?;
    Ok(())
}

fn spawn_pump_half(
    id: SessionId,
    dir: &'static str,
    from: Arc<RawStream>,
    to: Arc<RawStream>,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("{id:08x}-pump-{dir}"))
        .spawn(move || {
            let mut buf = vec![0u8; RAW_PUMP_CHUNK];
            loop {
                let n = match (&*from).read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if (&*to).write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            let _ = to.shutdown(Shutdown::Write);
            log::debug!("[SESSION] raw pump {:08x} ({}) finished", id, dir);
        })
        .map_err(Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn socket_pair_carries_bytes() {
        let (a, b) = socket_pair().unwrap();
        (&a).write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        (&b).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn pump_relays_both_directions() {
        let (client_a, pump_a) = socket_pair().unwrap();
        let (pump_b, client_b) = socket_pair().unwrap();
        spawn_stream_pump(0x42, pump_a, pump_b).unwrap();

        (&client_a).write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        (&client_b).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        (&client_b).write_all(b"world").unwrap();
        (&client_a).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }
}
