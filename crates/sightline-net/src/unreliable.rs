//! Unreliable datagram channel.
//!
//! A plain connectionless socket, polled non-blockingly once per tick.
//! Carries only `HANDSHAKE`/`HANDSHAKE_REPLY` and `BATCH_ENTITY_UPDATE`:
//! traffic that is frequent, latest-value-wins, and tolerant of loss.
//! Paying reliable-transport overhead for it would only add latency.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use tracing::{debug, warn};

use crate::error::NetError;
use crate::socket;
use crate::wire::Message;

/// Datagram receive buffer size: one MTU.
pub const DATAGRAM_MTU: usize = 1500;

/// Non-blocking datagram endpoint for snapshot traffic.
pub struct UnreliableSocket {
    socket: UdpSocket,
    recv_buf: Box<[u8; DATAGRAM_MTU]>,
}

impl UnreliableSocket {
    /// Bind the datagram socket. Failure here is fatal at startup.
    pub fn bind(addr: SocketAddr) -> Result<Self, NetError> {
        let socket = socket::create_datagram(addr)?;
        Ok(Self {
            socket,
            recv_buf: Box::new([0u8; DATAGRAM_MTU]),
        })
    }

    /// The locally bound address (useful when binding port 0 in tests).
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }

    /// Encode and send one message to `to`.
    ///
    /// A transient send failure is logged and swallowed: this channel is
    /// lossy by contract and the next tick sends a fresher snapshot anyway.
    pub fn send(&self, msg: &Message, to: SocketAddr) {
        let bytes = msg.encode();
        match self.socket.send_to(&bytes, to) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(%to, "datagram send would block, dropping snapshot");
            }
            Err(e) => {
                warn!(%to, error = %e, "datagram send failed");
            }
        }
    }

    /// Receive the next pending datagram, if any.
    ///
    /// Returns `None` once the socket is drained for this tick. Malformed
    /// datagrams are logged and skipped so one bad packet cannot stop the
    /// session from ticking.
    pub fn poll_recv(&mut self) -> Option<(SocketAddr, Message)> {
        loop {
            match self.socket.recv_from(&mut self.recv_buf[..]) {
                Ok((len, from)) => match Message::decode(&self.recv_buf[..len]) {
                    Ok(msg) => return Some((from, msg)),
                    Err(e) => {
                        warn!(%from, error = %e, "dropping malformed datagram");
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    // Surface as a log line, never a panic mid-loop. On
                    // Windows a previous send to a dead port can surface
                    // here as ECONNRESET; treat it like loss.
                    debug!(error = %e, "datagram recv error");
                    return None;
                }
            }
        }
    }
}
