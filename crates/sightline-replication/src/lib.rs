//! Networked entity replication for the aiming-research platform's
//! multiplayer variants: identity registry, placeholder lifecycle, the
//! client bootstrap state machine, and the per-tick snapshot drivers.
//!
//! The protocol runs over two parallel channels: registration and entity
//! lifecycle travel on the reliable channel, transform snapshots on the
//! unreliable one. Everything is polled from the host's frame loop — no
//! background threads, no locks.

pub mod client;
pub mod error;
pub mod manager;
pub mod registry;
pub mod scene;
pub mod server;


pub use client::{ClientConfig, ClientSession, HandshakePhase};
pub use error::SessionError;
pub use manager::{BatchScope, ReplicationEvent, ReplicationManager};
pub use registry::{ClientRegistry, ConnectedClient, RegistryError};
pub use scene::{MemoryScene, PlaceholderScene};
pub use server::{ServerConfig, ServerSession};

pub use sightline_net::{PlayerGuid, Transform};
