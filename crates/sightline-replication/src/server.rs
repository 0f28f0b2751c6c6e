//! Authoritative server session and per-tick driver.
//!
//! The server owns the reliable listener, the datagram socket, the identity
//! registry, and the replication manager in one object created at startup
//! and torn down at shutdown — no ambient socket state. Its [`tick`]
//! (once per simulation frame) drains all pending datagrams, services the
//! reliable channel with zero timeout, sweeps liveness, and fans one
//! snapshot batch out to every registered client.
//!
//! [`tick`]: ServerSession::tick

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use sightline_net::{
    ConnectionId, Message, NetError, PlayerGuid, RegistrationStatus, ReliableEvent,
    ReliableListener, SocketConfig, UnreliableSocket,
};

use crate::error::SessionError;
use crate::manager::{BatchScope, ReplicationEvent, ReplicationManager};
use crate::registry::ClientRegistry;
use crate::scene::PlaceholderScene;

/// Server session settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Reliable bind address (port `P`); the datagram socket binds `P + 1`.
    pub bind_addr: SocketAddr,
    /// Evict clients silent for longer than this. Zero disables eviction.
    pub liveness_timeout: Duration,
    /// Reject registrations beyond this many players. Zero removes the cap.
    pub max_players: u32,
    /// Socket options for both channels.
    pub socket: SocketConfig,
}

impl ServerConfig {
    /// Settings for a server bound at `bind_addr`, with a 30 s liveness
    /// timeout and a 32-player cap.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            liveness_timeout: Duration::from_secs(30),
            max_players: 32,
            socket: SocketConfig::default(),
        }
    }
}

impl TryFrom<&sightline_config::Config> for ServerConfig {
    type Error = SessionError;

    /// Build session settings from the persisted `hosting` section.
    fn try_from(cfg: &sightline_config::Config) -> Result<Self, SessionError> {
        let host: std::net::IpAddr =
            cfg.hosting
                .bind_address
                .parse()
                .map_err(|source| SessionError::InvalidAddress {
                    addr: cfg.hosting.bind_address.clone(),
                    source,
                })?;
        let mut config = Self::new(SocketAddr::new(host, cfg.hosting.bind_port));
        config.liveness_timeout = Duration::from_secs(cfg.hosting.liveness_timeout_secs.into());
        config.max_players = cfg.hosting.max_players;
        Ok(config)
    }
}

/// The authoritative server's network session.
pub struct ServerSession {
    listener: ReliableListener,
    unreliable: UnreliableSocket,
    registry: ClientRegistry,
    manager: ReplicationManager,
    liveness_timeout: Duration,
    max_players: u32,
}

impl ServerSession {
    /// Bind both channels. Either bind failing is fatal at startup.
    pub fn new(config: ServerConfig) -> Result<Self, NetError> {
        let listener = ReliableListener::bind(config.bind_addr, config.socket.clone())?;
        // The unreliable socket always sits one port above the reliable one,
        // so the pair needs a single configured port.
        let mut datagram_addr = listener.local_addr()?;
        datagram_addr.set_port(datagram_addr.port() + 1);
        let unreliable = UnreliableSocket::bind(datagram_addr)?;
        info!(reliable = %listener.local_addr()?, datagram = %datagram_addr, "server listening");
        Ok(Self {
            listener,
            unreliable,
            registry: ClientRegistry::new(),
            manager: ReplicationManager::new(BatchScope::Relay),
            liveness_timeout: config.liveness_timeout,
            max_players: config.max_players,
        })
    }

    /// The reliable channel's bound address.
    pub fn reliable_addr(&self) -> Result<SocketAddr, NetError> {
        self.listener.local_addr()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `guid` is currently registered.
    pub fn is_registered(&self, guid: PlayerGuid) -> bool {
        self.registry.get(guid).is_some()
    }

    /// Replication events accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<ReplicationEvent> {
        self.manager.drain_events()
    }

    /// Change the liveness timeout of a running server. Zero disables
    /// eviction.
    pub fn set_liveness_timeout(&mut self, timeout: Duration) {
        self.liveness_timeout = timeout;
    }

    /// Run one simulation tick.
    pub fn tick<S: PlaceholderScene>(&mut self, scene: &mut S) {
        let now = Instant::now();
        self.drain_unreliable(scene, now);
        self.service_reliable(scene, now);
        self.sweep_liveness(scene, now);
        self.send_snapshots(scene);
    }

    fn drain_unreliable<S: PlaceholderScene>(&mut self, scene: &mut S, now: Instant) {
        while let Some((from, msg)) = self.unreliable.poll_recv() {
            match msg {
                Message::Handshake => {
                    debug!(client = %from, "replying to handshake");
                    self.unreliable.send(&Message::HandshakeReply, from);
                }
                Message::BatchEntityUpdate(records) => {
                    self.registry.refresh_by_addr(from, now);
                    self.manager.apply_batch(&records, scene);
                }
                other => {
                    debug!(client = %from, message = ?other, "unexpected datagram dropped");
                }
            }
        }
    }

    fn service_reliable<S: PlaceholderScene>(&mut self, scene: &mut S, now: Instant) {
        let mut events = Vec::new();
        self.listener.poll(&mut events);
        for event in events {
            match event {
                ReliableEvent::Connected { connection, addr } => {
                    // Identity arrives with REGISTER_CLIENT; nothing to do yet.
                    debug!(%connection, client = %addr, "awaiting registration");
                }
                ReliableEvent::Message {
                    connection,
                    message,
                } => {
                    self.registry.refresh_by_connection(connection, now);
                    match message {
                        Message::RegisterClient {
                            guid,
                            unreliable_port,
                        } => self.handle_register(connection, guid, unreliable_port, scene, now),
                        other => {
                            warn!(%connection, message = ?other, "unexpected control message dropped");
                        }
                    }
                }
                ReliableEvent::Disconnected { connection } => {
                    self.teardown_connection(connection, scene);
                }
            }
        }
    }

    /// Register one client and bring it up to date:
    /// reply, create its placeholder, announce it to everyone else, and
    /// replay the existing roster to it. Only identity is replayed — the
    /// newcomer's transforms arrive with the next snapshot batch.
    fn handle_register<S: PlaceholderScene>(
        &mut self,
        connection: ConnectionId,
        guid: PlayerGuid,
        unreliable_port: u16,
        scene: &mut S,
        now: Instant,
    ) {
        let Some(peer) = self.listener.peer_addr(connection) else {
            warn!(%connection, "registration from a vanished connection");
            return;
        };
        // Host from the reliable connection, port from the payload.
        let unreliable_addr = SocketAddr::new(peer.ip(), unreliable_port);

        if self.max_players != 0 && self.registry.len() as u32 >= self.max_players {
            warn!(%connection, %guid, cap = self.max_players, "server full, rejecting registration");
            self.send_rejection(connection, guid);
            return;
        }

        if let Err(e) = self
            .registry
            .register(connection, guid, unreliable_addr, now)
        {
            warn!(%connection, %guid, error = %e, "registration rejected");
            self.send_rejection(connection, guid);
            return;
        }

        info!(%connection, %guid, datagram = %unreliable_addr, "client registered");

        // Reply first: the client must see its own confirmation before any
        // CREATE_ENTITY for a peer.
        let reply = Message::RegistrationReply {
            guid,
            status: RegistrationStatus::Success,
        };
        if let Err(e) = self.listener.send(connection, &reply) {
            warn!(%connection, error = %e, "failed to send registration reply");
        }

        self.manager.create_remote(guid, scene);

        // Announce the newcomer to everyone else, and replay the existing
        // roster back to the newcomer.
        self.listener
            .broadcast(&Message::CreateEntity { guid }, Some(connection));
        let roster: Vec<_> = self
            .registry
            .iter()
            .filter(|c| c.guid != guid)
            .map(|c| c.guid)
            .collect();
        for other_guid in roster {
            if let Err(e) = self
                .listener
                .send(connection, &Message::CreateEntity { guid: other_guid })
            {
                warn!(%connection, error = %e, "failed to replay roster entry");
            }
        }
    }

    fn send_rejection(&mut self, connection: ConnectionId, guid: PlayerGuid) {
        let reply = Message::RegistrationReply {
            guid,
            status: RegistrationStatus::Rejected,
        };
        if let Err(e) = self.listener.send(connection, &reply) {
            warn!(%connection, error = %e, "failed to send rejection");
        }
    }

    fn teardown_connection<S: PlaceholderScene>(&mut self, connection: ConnectionId, scene: &mut S) {
        let Some(client) = self.registry.remove_by_connection(connection) else {
            debug!(%connection, "unregistered connection closed");
            return;
        };
        info!(%connection, guid = %client.guid, "client disconnected");
        self.manager.destroy_remote(client.guid, scene);
        self.broadcast_destroy(client.guid);
    }

    fn sweep_liveness<S: PlaceholderScene>(&mut self, scene: &mut S, now: Instant) {
        if self.liveness_timeout.is_zero() {
            return;
        }
        for guid in self.registry.expired(self.liveness_timeout, now) {
            let Some(client) = self.registry.remove(guid) else {
                continue;
            };
            warn!(%guid, timeout = ?self.liveness_timeout, "evicting silent client");
            self.listener.close(client.connection);
            self.manager.destroy_remote(guid, scene);
            self.broadcast_destroy(guid);
        }
    }

    fn broadcast_destroy(&mut self, guid: PlayerGuid) {
        self.listener
            .broadcast(&Message::DestroyEntity { guid }, None);
    }

    /// Emit this tick's relay batch to every registered client.
    fn send_snapshots<S: PlaceholderScene>(&mut self, scene: &S) {
        if self.registry.is_empty() {
            return;
        }
        let batch = self.manager.build_batch(scene);
        for client in self.registry.iter() {
            self.unreliable.send(&batch, client.unreliable_addr);
        }
    }
}
