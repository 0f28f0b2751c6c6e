//! Binary wire protocol and dual-channel transports for Sightline's
//! entity-replication layer: a reliable, ordered control channel for
//! lifecycle messages and an unreliable datagram channel for per-tick
//! transform snapshots.

pub mod codec;
pub mod error;
pub mod guid;
pub mod reliable;
pub mod socket;
pub mod unreliable;
pub mod wire;

pub use codec::{ByteReader, ByteWriter};
pub use error::{DecodeError, NetError};
pub use guid::PlayerGuid;
pub use reliable::{
    ConnectionId, ReliableClient, ReliableClientEvent, ReliableEvent, ReliableListener,
};
pub use socket::SocketConfig;
pub use unreliable::UnreliableSocket;
pub use wire::{
    EntityRecord, MAX_BATCH_RECORDS, Message, RegistrationStatus, Transform, UpdateKind,
};
