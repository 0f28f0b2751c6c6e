//! Client bootstrap and per-tick driver.
//!
//! Each client runs a small state machine to discover the server, register,
//! and begin exchanging snapshots:
//!
//! ```text
//! Init -> AwaitHandshakeReply -> ConnectingReliable
//!      -> AwaitRegistrationReply -> Active
//! ```
//!
//! `Init` probes the server's datagram port; the probe is re-sent on a
//! retry interval so a lost datagram cannot stall the bootstrap forever.
//! Once `Active`, the client sends one snapshot batch per tick and reacts
//! to `CREATE_ENTITY`/`DESTROY_ENTITY` for the rest of the session.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use sightline_net::{
    Message, PlayerGuid, RegistrationStatus, ReliableClient, ReliableClientEvent, SocketConfig,
    UnreliableSocket,
};

use crate::error::SessionError;
use crate::manager::{BatchScope, ReplicationEvent, ReplicationManager};
use crate::scene::PlaceholderScene;

/// Bootstrap progress. Terminal steady state is [`HandshakePhase::Active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Nothing sent yet.
    Init,
    /// `HANDSHAKE` sent; waiting for the server's datagram reply.
    AwaitHandshakeReply,
    /// Non-blocking reliable connect in flight.
    ConnectingReliable,
    /// `REGISTER_CLIENT` sent; waiting for the server's verdict.
    AwaitRegistrationReply,
    /// Registered; exchanging snapshots every tick.
    Active,
    /// The session failed (rejected registration or lost connection).
    Failed,
}

/// Client session settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The server's reliable address; its datagram port is this port + 1.
    pub server_addr: SocketAddr,
    /// How often to re-send `HANDSHAKE` while undiscovered.
    pub handshake_retry: Duration,
    /// Minimum spacing between outbound snapshot batches. Zero sends one
    /// batch every tick.
    pub snapshot_interval: Duration,
    /// Socket options for both channels.
    pub socket: SocketConfig,
}

impl ClientConfig {
    /// Settings for a server at `server_addr`, with a 500 ms handshake retry
    /// and one snapshot per tick.
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            handshake_retry: Duration::from_millis(500),
            snapshot_interval: Duration::ZERO,
            socket: SocketConfig::default(),
        }
    }

    fn server_unreliable_addr(&self) -> SocketAddr {
        let mut addr = self.server_addr;
        addr.set_port(self.server_addr.port() + 1);
        addr
    }
}

impl TryFrom<&sightline_config::Config> for ClientConfig {
    type Error = SessionError;

    /// Build session settings from the persisted `network` section.
    fn try_from(cfg: &sightline_config::Config) -> Result<Self, SessionError> {
        let host: std::net::IpAddr =
            cfg.network
                .server_address
                .parse()
                .map_err(|source| SessionError::InvalidAddress {
                    addr: cfg.network.server_address.clone(),
                    source,
                })?;
        let mut config = Self::new(SocketAddr::new(host, cfg.network.server_port));
        config.handshake_retry = Duration::from_millis(cfg.network.handshake_retry_ms);
        if cfg.network.snapshot_rate_hz > 0 {
            config.snapshot_interval = Duration::from_secs(1) / cfg.network.snapshot_rate_hz;
        }
        Ok(config)
    }
}

/// One client's network session: both channels, the bootstrap state
/// machine, and the replication manager, driven by [`ClientSession::tick`].
pub struct ClientSession {
    guid: PlayerGuid,
    config: ClientConfig,
    phase: HandshakePhase,
    unreliable: UnreliableSocket,
    unreliable_port: u16,
    reliable: Option<ReliableClient>,
    manager: ReplicationManager,
    last_handshake: Option<Instant>,
    last_snapshot: Option<Instant>,
}

impl ClientSession {
    /// Bind the datagram socket and prepare the bootstrap. Fails only on a
    /// bind error, which is fatal at startup.
    pub fn new(guid: PlayerGuid, config: ClientConfig) -> Result<Self, SessionError> {
        let bind_addr: SocketAddr = if config.server_addr.is_ipv6() {
            "[::]:0".parse().expect("static addr")
        } else {
            "0.0.0.0:0".parse().expect("static addr")
        };
        let unreliable = UnreliableSocket::bind(bind_addr)?;
        let unreliable_port = unreliable.local_addr()?.port();
        let mut manager = ReplicationManager::new(BatchScope::OwnedOnly);
        manager.register_owned(guid);
        info!(%guid, server = %config.server_addr, "client session created");
        Ok(Self {
            guid,
            config,
            phase: HandshakePhase::Init,
            unreliable,
            unreliable_port,
            reliable: None,
            manager,
            last_handshake: None,
            last_snapshot: None,
        })
    }

    /// This client's identity.
    pub fn guid(&self) -> PlayerGuid {
        self.guid
    }

    /// Current bootstrap phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Whether the session reached its steady state.
    pub fn is_active(&self) -> bool {
        self.phase == HandshakePhase::Active
    }

    /// Replication events accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<ReplicationEvent> {
        self.manager.drain_events()
    }

    /// Access to the replication state (placeholder bookkeeping).
    pub fn manager(&self) -> &ReplicationManager {
        &self.manager
    }

    /// Run one simulation tick: drain both channels, advance the bootstrap,
    /// and (when active) emit exactly one outbound snapshot batch.
    ///
    /// Errors report session-ending conditions; the transports themselves
    /// never abort the loop over one bad packet.
    pub fn tick<S: PlaceholderScene>(&mut self, scene: &mut S) -> Result<(), SessionError> {
        if self.phase == HandshakePhase::Failed {
            return Ok(());
        }

        self.drain_unreliable(scene);
        self.advance_handshake()?;
        self.service_reliable(scene)?;

        if self.phase == HandshakePhase::Active && self.snapshot_due() {
            let batch = self.manager.build_batch(scene);
            self.unreliable
                .send(&batch, self.config.server_unreliable_addr());
            self.last_snapshot = Some(Instant::now());
        }
        Ok(())
    }

    fn snapshot_due(&self) -> bool {
        self.last_snapshot
            .is_none_or(|at| at.elapsed() >= self.config.snapshot_interval)
    }

    fn drain_unreliable<S: PlaceholderScene>(&mut self, scene: &mut S) {
        while let Some((from, msg)) = self.unreliable.poll_recv() {
            match msg {
                Message::HandshakeReply => {
                    if self.phase == HandshakePhase::AwaitHandshakeReply {
                        info!(server = %from, "server discovered, connecting reliably");
                        match ReliableClient::connect(self.config.server_addr, &self.config.socket)
                        {
                            Ok(client) => {
                                self.reliable = Some(client);
                                self.phase = HandshakePhase::ConnectingReliable;
                            }
                            Err(e) => {
                                warn!(error = %e, "reliable connect failed to start");
                                self.phase = HandshakePhase::Failed;
                            }
                        }
                    }
                }
                Message::BatchEntityUpdate(records) => {
                    self.manager.apply_batch(&records, scene);
                }
                other => {
                    debug!(%from, message = ?other, "unexpected datagram dropped");
                }
            }
        }
    }

    fn advance_handshake(&mut self) -> Result<(), SessionError> {
        let due = match self.phase {
            HandshakePhase::Init => true,
            HandshakePhase::AwaitHandshakeReply => self
                .last_handshake
                .is_none_or(|at| at.elapsed() >= self.config.handshake_retry),
            _ => false,
        };
        if due {
            debug!(server = %self.config.server_unreliable_addr(), "sending handshake");
            self.unreliable
                .send(&Message::Handshake, self.config.server_unreliable_addr());
            self.last_handshake = Some(Instant::now());
            self.phase = HandshakePhase::AwaitHandshakeReply;
        }
        Ok(())
    }

    fn service_reliable<S: PlaceholderScene>(&mut self, scene: &mut S) -> Result<(), SessionError> {
        let mut events = Vec::new();
        match self.reliable.as_mut() {
            Some(reliable) => reliable.poll(&mut events),
            None => return Ok(()),
        }
        for event in events {
            match event {
                ReliableClientEvent::Connected { addr } => {
                    info!(server = %addr, port = self.unreliable_port, "registering");
                    if let Some(reliable) = self.reliable.as_mut() {
                        reliable.send(&Message::RegisterClient {
                            guid: self.guid,
                            unreliable_port: self.unreliable_port,
                        })?;
                    }
                    self.phase = HandshakePhase::AwaitRegistrationReply;
                }
                ReliableClientEvent::Message(message) => {
                    self.handle_control(message, scene)?;
                }
                ReliableClientEvent::Disconnected => {
                    warn!("reliable connection lost");
                    self.phase = HandshakePhase::Failed;
                    self.reliable = None;
                    return Err(SessionError::ConnectionLost);
                }
            }
        }
        Ok(())
    }

    fn handle_control<S: PlaceholderScene>(
        &mut self,
        message: Message,
        scene: &mut S,
    ) -> Result<(), SessionError> {
        match message {
            Message::RegistrationReply { guid, status } => {
                if guid != self.guid {
                    debug!(%guid, "registration reply for another guid dropped");
                    return Ok(());
                }
                match status {
                    RegistrationStatus::Success
                        if self.phase == HandshakePhase::AwaitRegistrationReply =>
                    {
                        info!(%guid, "registration confirmed, session active");
                        self.phase = HandshakePhase::Active;
                        Ok(())
                    }
                    RegistrationStatus::Success => Ok(()),
                    RegistrationStatus::Rejected => {
                        warn!(%guid, "server rejected registration");
                        self.phase = HandshakePhase::Failed;
                        self.reliable = None;
                        Err(SessionError::RegistrationRejected { guid })
                    }
                }
            }
            Message::CreateEntity { guid } => {
                self.manager.create_remote(guid, scene);
                Ok(())
            }
            Message::DestroyEntity { guid } => {
                self.manager.destroy_remote(guid, scene);
                Ok(())
            }
            other => {
                debug!(message = ?other, "unexpected control message dropped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    fn session() -> (ClientSession, MemoryScene) {
        let guid = PlayerGuid::generate();
        // Nothing listens at this address; only the state machine is under test.
        let config = ClientConfig::new("127.0.0.1:39999".parse().unwrap());
        let mut scene = MemoryScene::new();
        scene.insert(guid, sightline_net::Transform::IDENTITY);
        (ClientSession::new(guid, config).unwrap(), scene)
    }

    #[test]
    fn first_tick_sends_handshake_and_awaits_reply() {
        let (mut client, mut scene) = session();
        assert_eq!(client.phase(), HandshakePhase::Init);
        client.tick(&mut scene).unwrap();
        assert_eq!(client.phase(), HandshakePhase::AwaitHandshakeReply);
    }

    #[test]
    fn handshake_is_resent_after_the_retry_interval() {
        let (mut client, mut scene) = session();
        client.config.handshake_retry = Duration::from_millis(0);
        client.tick(&mut scene).unwrap();
        let first = client.last_handshake.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        client.tick(&mut scene).unwrap();
        assert!(client.last_handshake.unwrap() > first, "handshake re-sent");
        assert_eq!(client.phase(), HandshakePhase::AwaitHandshakeReply);
    }

    #[test]
    fn lifecycle_messages_drive_the_manager() {
        let (mut client, mut scene) = session();
        let remote = PlayerGuid::generate();

        client
            .handle_control(Message::CreateEntity { guid: remote }, &mut scene)
            .unwrap();
        assert!(client.manager().is_remote(remote));
        assert!(scene.contains(remote));

        client
            .handle_control(Message::DestroyEntity { guid: remote }, &mut scene)
            .unwrap();
        assert!(!client.manager().is_remote(remote));
        assert!(!scene.contains(remote));
    }

    #[test]
    fn rejected_registration_fails_the_session() {
        let (mut client, mut scene) = session();
        client.phase = HandshakePhase::AwaitRegistrationReply;
        let err = client
            .handle_control(
                Message::RegistrationReply {
                    guid: client.guid(),
                    status: RegistrationStatus::Rejected,
                },
                &mut scene,
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::RegistrationRejected { .. }));
        assert_eq!(client.phase(), HandshakePhase::Failed);
    }

    #[test]
    fn session_settings_come_from_the_config_file() {
        let mut cfg = sightline_config::Config::default();
        cfg.network.server_address = "10.1.2.3".to_string();
        cfg.network.server_port = 7100;
        cfg.network.handshake_retry_ms = 250;
        cfg.network.snapshot_rate_hz = 20;

        let config = ClientConfig::try_from(&cfg).unwrap();
        assert_eq!(config.server_addr, "10.1.2.3:7100".parse().unwrap());
        assert_eq!(config.handshake_retry, Duration::from_millis(250));
        assert_eq!(config.snapshot_interval, Duration::from_millis(50));

        cfg.network.server_address = "not-an-ip".to_string();
        let err = ClientConfig::try_from(&cfg).unwrap_err();
        assert!(matches!(err, SessionError::InvalidAddress { .. }));
    }

    #[test]
    fn snapshot_interval_throttles_outbound_batches() {
        let (mut client, mut scene) = session();
        client.config.snapshot_interval = Duration::from_secs(3600);
        client.phase = HandshakePhase::Active;

        client.tick(&mut scene).unwrap();
        let first = client.last_snapshot.expect("first batch sent");
        client.tick(&mut scene).unwrap();
        assert_eq!(client.last_snapshot, Some(first), "second batch withheld");
    }

    #[test]
    fn reply_for_a_different_guid_is_ignored() {
        let (mut client, mut scene) = session();
        client.phase = HandshakePhase::AwaitRegistrationReply;
        client
            .handle_control(
                Message::RegistrationReply {
                    guid: PlayerGuid::generate(),
                    status: RegistrationStatus::Success,
                },
                &mut scene,
            )
            .unwrap();
        assert_eq!(client.phase(), HandshakePhase::AwaitRegistrationReply);
    }
}
