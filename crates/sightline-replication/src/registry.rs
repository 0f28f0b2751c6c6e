//! Server-authoritative identity registry.
//!
//! Binds each registered guid to its reliable connection handle and its
//! learned unreliable address. The unreliable address is constructed from
//! the reliable connection's host plus the port the client *tells* us,
//! because the client's datagram port is offset from its reliable port and
//! NAT/firewall behavior is otherwise unpredictable.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use sightline_net::{ConnectionId, PlayerGuid};

/// Errors produced by registration.
///
/// A duplicate registration is rejected outright rather than replacing the
/// existing row; reconnection policy stays with the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The guid already has a registry entry.
    #[error("guid {guid} is already registered")]
    AlreadyRegistered {
        /// The contested identity.
        guid: PlayerGuid,
    },

    /// This reliable connection already registered a different guid.
    #[error("{connection} already registered guid {guid}")]
    ConnectionInUse {
        /// The connection attempting to register twice.
        connection: ConnectionId,
        /// The guid it registered first.
        guid: PlayerGuid,
    },
}

/// One registered client.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    /// Handle of the client's reliable connection.
    pub connection: ConnectionId,
    /// The client's identity (and placeholder name).
    pub guid: PlayerGuid,
    /// Where to send this client's snapshot batches.
    pub unreliable_addr: SocketAddr,
    /// Last time anything was heard from this client, on either channel.
    pub last_heard: Instant,
}

/// The registry: at most one entry per guid and per connection.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<PlayerGuid, ConnectedClient>,
    by_connection: HashMap<ConnectionId, PlayerGuid>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, enforcing guid and connection uniqueness.
    pub fn register(
        &mut self,
        connection: ConnectionId,
        guid: PlayerGuid,
        unreliable_addr: SocketAddr,
        now: Instant,
    ) -> Result<(), RegistryError> {
        if self.clients.contains_key(&guid) {
            return Err(RegistryError::AlreadyRegistered { guid });
        }
        if let Some(&existing) = self.by_connection.get(&connection) {
            return Err(RegistryError::ConnectionInUse {
                connection,
                guid: existing,
            });
        }
        self.clients.insert(
            guid,
            ConnectedClient {
                connection,
                guid,
                unreliable_addr,
                last_heard: now,
            },
        );
        self.by_connection.insert(connection, guid);
        Ok(())
    }

    /// Look up a client by guid.
    pub fn get(&self, guid: PlayerGuid) -> Option<&ConnectedClient> {
        self.clients.get(&guid)
    }

    /// The guid registered on `connection`, if any.
    pub fn guid_of(&self, connection: ConnectionId) -> Option<PlayerGuid> {
        self.by_connection.get(&connection).copied()
    }

    /// Remove the entry registered on `connection`.
    pub fn remove_by_connection(&mut self, connection: ConnectionId) -> Option<ConnectedClient> {
        let guid = self.by_connection.remove(&connection)?;
        self.clients.remove(&guid)
    }

    /// Remove the entry for `guid`.
    pub fn remove(&mut self, guid: PlayerGuid) -> Option<ConnectedClient> {
        let client = self.clients.remove(&guid)?;
        self.by_connection.remove(&client.connection);
        Some(client)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Iterate all registered clients (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &ConnectedClient> {
        self.clients.values()
    }

    /// Mark the client sending from `addr` as alive at `now`.
    pub fn refresh_by_addr(&mut self, addr: SocketAddr, now: Instant) {
        if let Some(client) = self
            .clients
            .values_mut()
            .find(|c| c.unreliable_addr == addr)
        {
            client.last_heard = now;
        }
    }

    /// Mark the client on `connection` as alive at `now`.
    pub fn refresh_by_connection(&mut self, connection: ConnectionId, now: Instant) {
        if let Some(guid) = self.by_connection.get(&connection)
            && let Some(client) = self.clients.get_mut(guid)
        {
            client.last_heard = now;
        }
    }

    /// Guids that have been silent for longer than `timeout` as of `now`.
    pub fn expired(&self, timeout: Duration, now: Instant) -> Vec<PlayerGuid> {
        self.clients
            .values()
            .filter(|c| now.duration_since(c.last_heard) > timeout)
            .map(|c| c.guid)
            .collect()
    }
}
