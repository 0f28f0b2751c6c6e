//! Reliable, ordered, connection-oriented control channel.
//!
//! Carries only registration and entity-lifecycle messages, where loss or
//! reordering would corrupt the identity map. Frames are length-prefixed
//! (`u32` big-endian payload length) on a TCP byte stream; the prefix is
//! transport-local and never visible to the wire codec.
//!
//! Both endpoints are non-blocking and polled with zero timeout once per
//! simulation tick, per the session's cooperative single-threaded model.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::socket::{self, SocketConfig};
use crate::wire::Message;

/// Largest frame the channel will carry. Control messages are tiny; anything
/// near this limit is a protocol violation.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

const FRAME_HEADER_BYTES: usize = 4;
const READ_CHUNK_BYTES: usize = 4096;

/// Unique identifier for a reliable connection within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Events produced by [`ReliableListener::poll`].
#[derive(Debug)]
pub enum ReliableEvent {
    /// A new client finished its TCP handshake.
    Connected {
        /// Handle for addressing this client.
        connection: ConnectionId,
        /// The client's remote address (reliable side).
        addr: SocketAddr,
    },
    /// A complete, well-formed message arrived.
    Message {
        /// The sending connection.
        connection: ConnectionId,
        /// The decoded message.
        message: Message,
    },
    /// The connection closed or failed.
    Disconnected {
        /// The departed connection.
        connection: ConnectionId,
    },
}

/// Events produced by [`ReliableClient::poll`].
#[derive(Debug)]
pub enum ReliableClientEvent {
    /// The outbound connect completed.
    Connected {
        /// The server's reliable address.
        addr: SocketAddr,
    },
    /// A complete, well-formed message arrived from the server.
    Message(Message),
    /// The connection closed or failed.
    Disconnected,
}

// ---------------------------------------------------------------------------
// Channel: one framed non-blocking stream
// ---------------------------------------------------------------------------

/// A framed stream with inbound reassembly and outbound spill buffers.
struct Channel {
    stream: TcpStream,
    addr: SocketAddr,
    inbox: Vec<u8>,
    outbox: Vec<u8>,
}

impl Channel {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            inbox: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Queue an encoded message and opportunistically flush.
    fn send(&mut self, msg: &Message) -> Result<(), NetError> {
        let payload = msg.encode();
        if payload.len() > MAX_FRAME_BYTES {
            return Err(NetError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_BYTES,
            });
        }
        self.outbox
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.outbox.extend_from_slice(&payload);
        // Best effort now; poll() retries whatever is left.
        let _ = self.flush();
        Ok(())
    }

    /// Write buffered bytes until the socket would block.
    /// Returns `false` once the stream is dead.
    fn flush(&mut self) -> bool {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => return false,
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(addr = %self.addr, error = %e, "reliable write failed");
                    return false;
                }
            }
        }
        true
    }

    /// Drain readable bytes and decode complete frames into `messages`.
    /// Returns `false` once the stream is dead.
    fn service(&mut self, messages: &mut Vec<Message>) -> bool {
        if !self.flush() {
            return false;
        }
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return false,
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(addr = %self.addr, error = %e, "reliable read failed");
                    return false;
                }
            }
        }
        loop {
            match self.take_frame() {
                Ok(Some(frame)) => match Message::decode(&frame) {
                    Ok(msg) => messages.push(msg),
                    // A malformed payload inside a well-delimited frame is
                    // dropped; the stream itself is still in sync.
                    Err(e) => warn!(addr = %self.addr, error = %e, "dropping malformed frame"),
                },
                Ok(None) => break,
                Err(()) => {
                    warn!(addr = %self.addr, "oversized frame, closing connection");
                    return false;
                }
            }
        }
        true
    }

    /// Extract one complete frame from the inbox, if present.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, ()> {
        if self.inbox.len() < FRAME_HEADER_BYTES {
            return Ok(None);
        }
        let len =
            u32::from_be_bytes([self.inbox[0], self.inbox[1], self.inbox[2], self.inbox[3]])
                as usize;
        if len > MAX_FRAME_BYTES {
            return Err(());
        }
        if self.inbox.len() < FRAME_HEADER_BYTES + len {
            return Ok(None);
        }
        let frame = self.inbox[FRAME_HEADER_BYTES..FRAME_HEADER_BYTES + len].to_vec();
        self.inbox.drain(..FRAME_HEADER_BYTES + len);
        Ok(Some(frame))
    }
}

// ---------------------------------------------------------------------------
// Server listener
// ---------------------------------------------------------------------------

/// Server-side reliable endpoint: accepts connections and multiplexes
/// framed messages across them.
pub struct ReliableListener {
    listener: TcpListener,
    config: SocketConfig,
    connections: HashMap<ConnectionId, Channel>,
    next_id: u64,
}

impl ReliableListener {
    /// Bind the listening socket. Failure here is fatal at startup.
    pub fn bind(addr: SocketAddr, config: SocketConfig) -> Result<Self, NetError> {
        let listener = socket::create_listener(addr, &config)?;
        Ok(Self {
            listener,
            config,
            connections: HashMap::new(),
            next_id: 1,
        })
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The remote address of a live connection.
    pub fn peer_addr(&self, connection: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&connection).map(|c| c.addr)
    }

    /// Service the listener and every connection with zero timeout,
    /// appending resulting events in order.
    pub fn poll(&mut self, events: &mut Vec<ReliableEvent>) {
        // Accept everything pending.
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = socket::configure_accepted(&stream, &self.config) {
                        warn!(%addr, error = %e, "failed to configure accepted stream");
                        continue;
                    }
                    let connection = ConnectionId(self.next_id);
                    self.next_id += 1;
                    info!(%connection, %addr, "reliable connection accepted");
                    self.connections.insert(connection, Channel::new(stream, addr));
                    events.push(ReliableEvent::Connected { connection, addr });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }

        // Service each connection; collect the dead.
        let mut dead = Vec::new();
        let mut inbound = Vec::new();
        for (&connection, channel) in &mut self.connections {
            inbound.clear();
            let alive = channel.service(&mut inbound);
            for message in inbound.drain(..) {
                events.push(ReliableEvent::Message {
                    connection,
                    message,
                });
            }
            if !alive {
                dead.push(connection);
            }
        }
        for connection in dead {
            if let Some(channel) = self.connections.remove(&connection) {
                info!(%connection, addr = %channel.addr, "reliable connection closed");
            }
            events.push(ReliableEvent::Disconnected { connection });
        }
    }

    /// Send one message to one connection.
    pub fn send(&mut self, connection: ConnectionId, msg: &Message) -> Result<(), NetError> {
        let channel = self
            .connections
            .get_mut(&connection)
            .ok_or(NetError::UnknownConnection(connection.0))?;
        channel.send(msg)
    }

    /// Send one message to every connection except `exclude`.
    ///
    /// Send failures are logged per peer and do not abort the fan-out; a
    /// failing peer is torn down by the next poll.
    pub fn broadcast(&mut self, msg: &Message, exclude: Option<ConnectionId>) {
        for (&connection, channel) in &mut self.connections {
            if Some(connection) == exclude {
                continue;
            }
            if let Err(e) = channel.send(msg) {
                warn!(%connection, error = %e, "broadcast send failed");
            }
        }
    }

    /// Forcibly close one connection. No disconnect event is emitted;
    /// callers evicting a client do their own bookkeeping.
    pub fn close(&mut self, connection: ConnectionId) {
        if let Some(channel) = self.connections.remove(&connection) {
            info!(%connection, addr = %channel.addr, "reliable connection evicted");
        }
    }
}

// ---------------------------------------------------------------------------
// Client endpoint
// ---------------------------------------------------------------------------

enum ClientState {
    /// Non-blocking connect in flight; completion detected by polling.
    Connecting(TcpStream),
    Connected(Channel),
    Disconnected,
}

/// Client-side reliable endpoint.
pub struct ReliableClient {
    remote: SocketAddr,
    state: ClientState,
}

impl ReliableClient {
    /// Begin a non-blocking connect to the server's reliable port.
    pub fn connect(remote: SocketAddr, config: &SocketConfig) -> Result<Self, NetError> {
        let stream = socket::start_connect(remote, config)?;
        Ok(Self {
            remote,
            state: ClientState::Connecting(stream),
        })
    }

    /// Whether the connect has completed and the channel is usable.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected(_))
    }

    /// Service the connection with zero timeout, appending events in order.
    pub fn poll(&mut self, events: &mut Vec<ReliableClientEvent>) {
        if matches!(self.state, ClientState::Connecting(_)) {
            self.poll_connecting(events);
            return;
        }
        if let ClientState::Connected(channel) = &mut self.state {
            let mut inbound = Vec::new();
            let alive = channel.service(&mut inbound);
            for message in inbound {
                events.push(ReliableClientEvent::Message(message));
            }
            if !alive {
                info!(addr = %self.remote, "reliable connection closed");
                self.state = ClientState::Disconnected;
                events.push(ReliableClientEvent::Disconnected);
            }
        }
    }

    /// Detect completion of the in-flight non-blocking connect: a finished
    /// connect gives the socket a peer address; a failed one parks its
    /// error on the socket for `take_error`.
    fn poll_connecting(&mut self, events: &mut Vec<ReliableClientEvent>) {
        let ClientState::Connecting(stream) = &self.state else {
            return;
        };
        let connected = stream.peer_addr().is_ok();
        let failure = if connected {
            None
        } else {
            stream.take_error().ok().flatten()
        };

        if connected {
            let state = std::mem::replace(&mut self.state, ClientState::Disconnected);
            let ClientState::Connecting(stream) = state else {
                return;
            };
            let addr = self.remote;
            info!(%addr, "reliable connection established");
            self.state = ClientState::Connected(Channel::new(stream, addr));
            events.push(ReliableClientEvent::Connected { addr });
        } else if let Some(e) = failure {
            warn!(addr = %self.remote, error = %e, "reliable connect failed");
            self.state = ClientState::Disconnected;
            events.push(ReliableClientEvent::Disconnected);
        }
        // Still in progress otherwise; try again next tick.
    }

    /// Send one message to the server.
    pub fn send(&mut self, msg: &Message) -> Result<(), NetError> {
        match &mut self.state {
            ClientState::Connected(channel) => channel.send(msg),
            _ => Err(NetError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::PlayerGuid;
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    fn tick_until<F: FnMut() -> bool>(mut done: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for event");
            sleep(Duration::from_millis(2));
        }
    }

    fn connected_pair() -> (ReliableListener, ReliableClient, ConnectionId) {
        let config = SocketConfig::default();
        let mut listener =
            ReliableListener::bind("127.0.0.1:0".parse().unwrap(), config.clone()).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = ReliableClient::connect(addr, &config).unwrap();

        let mut server_conn = None;
        let mut client_up = false;
        tick_until(|| {
            let mut sev = Vec::new();
            listener.poll(&mut sev);
            for ev in sev {
                if let ReliableEvent::Connected { connection, .. } = ev {
                    server_conn = Some(connection);
                }
            }
            let mut cev = Vec::new();
            client.poll(&mut cev);
            for ev in cev {
                if matches!(ev, ReliableClientEvent::Connected { .. }) {
                    client_up = true;
                }
            }
            server_conn.is_some() && client_up
        });
        (listener, client, server_conn.unwrap())
    }

    #[test]
    fn connect_and_exchange_messages() {
        let (mut listener, mut client, conn) = connected_pair();
        let guid = PlayerGuid::generate();

        client
            .send(&Message::RegisterClient {
                guid,
                unreliable_port: 9001,
            })
            .unwrap();

        let mut got = None;
        tick_until(|| {
            let mut sev = Vec::new();
            listener.poll(&mut sev);
            for ev in sev {
                if let ReliableEvent::Message { connection, message } = ev {
                    assert_eq!(connection, conn);
                    got = Some(message);
                }
            }
            got.is_some()
        });
        assert_eq!(
            got.unwrap(),
            Message::RegisterClient {
                guid,
                unreliable_port: 9001
            }
        );

        listener
            .send(conn, &Message::CreateEntity { guid })
            .unwrap();
        let mut reply = None;
        tick_until(|| {
            let mut cev = Vec::new();
            client.poll(&mut cev);
            for ev in cev {
                if let ReliableClientEvent::Message(message) = ev {
                    reply = Some(message);
                }
            }
            reply.is_some()
        });
        assert_eq!(reply.unwrap(), Message::CreateEntity { guid });
    }

    #[test]
    fn client_drop_produces_disconnect_event() {
        let (mut listener, client, conn) = connected_pair();
        drop(client);

        let mut disconnected = None;
        tick_until(|| {
            let mut sev = Vec::new();
            listener.poll(&mut sev);
            for ev in sev {
                if let ReliableEvent::Disconnected { connection } = ev {
                    disconnected = Some(connection);
                }
            }
            disconnected.is_some()
        });
        assert_eq!(disconnected.unwrap(), conn);
        assert_eq!(listener.connection_count(), 0);
    }

    #[test]
    fn broadcast_skips_the_excluded_connection() {
        let config = SocketConfig::default();
        let mut listener =
            ReliableListener::bind("127.0.0.1:0".parse().unwrap(), config.clone()).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut first = ReliableClient::connect(addr, &config).unwrap();
        let mut second = ReliableClient::connect(addr, &config).unwrap();

        let mut conns = Vec::new();
        tick_until(|| {
            let mut sev = Vec::new();
            listener.poll(&mut sev);
            for ev in sev {
                if let ReliableEvent::Connected { connection, .. } = ev {
                    conns.push(connection);
                }
            }
            let mut cev = Vec::new();
            first.poll(&mut cev);
            second.poll(&mut cev);
            conns.len() == 2 && first.is_connected() && second.is_connected()
        });

        listener.broadcast(&Message::HandshakeReply, Some(conns[0]));

        let mut received = 0;
        let mut count_inbound = |client: &mut ReliableClient| {
            let mut cev = Vec::new();
            client.poll(&mut cev);
            cev.iter()
                .filter(|ev| matches!(ev, ReliableClientEvent::Message(_)))
                .count()
        };
        tick_until(|| {
            received += count_inbound(&mut first) + count_inbound(&mut second);
            received == 1
        });
        // The excluded peer stays silent.
        sleep(Duration::from_millis(50));
        received += count_inbound(&mut first) + count_inbound(&mut second);
        assert_eq!(received, 1, "exactly one of the two peers was addressed");
    }

    #[test]
    fn send_to_unknown_connection_is_an_error() {
        let config = SocketConfig::default();
        let mut listener =
            ReliableListener::bind("127.0.0.1:0".parse().unwrap(), config).unwrap();
        let err = listener.send(ConnectionId(42), &Message::Handshake);
        assert!(matches!(err, Err(NetError::UnknownConnection(42))));
    }

    #[test]
    fn send_before_connect_completes_is_an_error() {
        let config = SocketConfig::default();
        let listener =
            ReliableListener::bind("127.0.0.1:0".parse().unwrap(), config.clone()).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = ReliableClient::connect(addr, &config).unwrap();
        assert!(matches!(
            client.send(&Message::Handshake),
            Err(NetError::NotConnected)
        ));
    }
}
