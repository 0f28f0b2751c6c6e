//! Cross-platform socket creation and configuration.
//!
//! All sockets in the session are non-blocking: the transports are polled
//! once per simulation tick from the host's frame loop, so nothing here may
//! ever block. Options (TCP_NODELAY, SO_REUSEADDR) are applied through
//! `socket2` before the socket is handed to the transport.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};

use crate::error::NetError;

/// Socket options applied to every channel endpoint.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm on the reliable channel. Default: true —
    /// lifecycle messages are small and latency-sensitive.
    pub tcp_nodelay: bool,
    /// Enable `SO_REUSEADDR` on listening sockets. Default: true on
    /// Linux/macOS, false on Windows.
    pub reuse_addr: bool,
    /// Accept-queue depth for the reliable listener. Default: 32, matching
    /// the peer cap of the research sessions.
    pub listen_backlog: i32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            reuse_addr: !cfg!(target_os = "windows"),
            listen_backlog: 32,
        }
    }
}

fn new_socket(addr: SocketAddr, kind: socket2::Type) -> io::Result<socket2::Socket> {
    let domain = if addr.is_ipv6() {
        socket2::Domain::IPV6
    } else {
        socket2::Domain::IPV4
    };
    let protocol = if kind == socket2::Type::STREAM {
        socket2::Protocol::TCP
    } else {
        socket2::Protocol::UDP
    };
    socket2::Socket::new(domain, kind, Some(protocol))
}

/// Create a non-blocking reliable listener bound to `addr`.
pub fn create_listener(addr: SocketAddr, config: &SocketConfig) -> Result<TcpListener, NetError> {
    let bind = || -> io::Result<TcpListener> {
        let socket = new_socket(addr, socket2::Type::STREAM)?;
        if config.reuse_addr {
            socket.set_reuse_address(true)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.listen_backlog)?;
        Ok(socket.into())
    };
    bind().map_err(|source| NetError::Bind { addr, source })
}

/// Begin a non-blocking connect to `addr`.
///
/// The returned stream is usually still connecting (`EINPROGRESS`); the
/// caller polls writability each tick to detect completion.
pub fn start_connect(addr: SocketAddr, config: &SocketConfig) -> Result<TcpStream, NetError> {
    let connect = || -> io::Result<TcpStream> {
        let socket = new_socket(addr, socket2::Type::STREAM)?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(config.tcp_nodelay)?;
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            // In-flight is the expected outcome for a non-blocking connect.
            Err(e) if connect_in_progress(&e) => {}
            Err(e) => return Err(e),
        }
        Ok(socket.into())
    };
    connect().map_err(|source| NetError::Connect { addr, source })
}

/// Apply per-connection options to an accepted reliable stream.
pub fn configure_accepted(stream: &TcpStream, config: &SocketConfig) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(config.tcp_nodelay)
}

/// Create the non-blocking datagram socket bound to `addr`.
pub fn create_datagram(addr: SocketAddr) -> Result<UdpSocket, NetError> {
    let bind = || -> io::Result<UdpSocket> {
        let socket = new_socket(addr, socket2::Type::DGRAM)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(socket.into())
    };
    bind().map_err(|source| NetError::Bind { addr, source })
}

#[cfg(unix)]
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}

#[cfg(not(unix))]
fn connect_in_progress(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
