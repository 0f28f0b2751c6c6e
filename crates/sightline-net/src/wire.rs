//! Wire message catalogue and codec.
//!
//! Every packet begins with a one-byte type tag followed by a tag-specific
//! payload; there is no version field — message shape is implicit in the
//! tag. All integers are big-endian. Decoding an unknown tag or a truncated
//! payload yields a [`DecodeError`], never a panic.
//!
//! ```text
//! HANDSHAKE                 tag
//! HANDSHAKE_REPLY           tag
//! REGISTER_CLIENT           tag + guid(16) + unreliable_port(u16)
//! CLIENT_REGISTRATION_REPLY tag + guid(16) + status(u8)
//! CREATE_ENTITY             tag + guid(16)
//! DESTROY_ENTITY            tag + guid(16)
//! BATCH_ENTITY_UPDATE       tag + count(u8) + count x [guid(16) + kind(u8) + frame?]
//! ```

use glam::{Quat, Vec3};

use crate::codec::{ByteReader, ByteWriter};
use crate::error::DecodeError;
use crate::guid::PlayerGuid;

/// Maximum records in one `BATCH_ENTITY_UPDATE` (the count field is one byte).
pub const MAX_BATCH_RECORDS: usize = 255;

// Wire tags. Fixed for the life of the protocol.
const TAG_HANDSHAKE: u8 = 0;
const TAG_HANDSHAKE_REPLY: u8 = 1;
const TAG_REGISTER_CLIENT: u8 = 2;
const TAG_REGISTRATION_REPLY: u8 = 3;
const TAG_CREATE_ENTITY: u8 = 4;
const TAG_DESTROY_ENTITY: u8 = 5;
const TAG_BATCH_ENTITY_UPDATE: u8 = 6;

const KIND_NOOP: u8 = 0;
const KIND_REPLACE_FRAME: u8 = 1;

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// A rigid-body frame: world-space translation plus orientation.
///
/// On the wire: translation `3 x f32` then rotation quaternion `4 x f32`
/// (x, y, z, w), 28 bytes total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// World-space position.
    pub translation: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
}

impl Transform {
    /// The identity frame (origin, no rotation).
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    fn encode(&self, w: &mut ByteWriter) {
        w.write_f32(self.translation.x);
        w.write_f32(self.translation.y);
        w.write_f32(self.translation.z);
        w.write_f32(self.rotation.x);
        w.write_f32(self.rotation.y);
        w.write_f32(self.rotation.z);
        w.write_f32(self.rotation.w);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let translation = Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?);
        let rotation = Quat::from_xyzw(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        Ok(Self {
            translation,
            rotation,
        })
    }

    /// Component-wise comparison within `tolerance`, for tests and
    /// change detection across a lossy float round-trip.
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, tolerance)
            && self.rotation.abs_diff_eq(other.rotation, tolerance)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Update records
// ---------------------------------------------------------------------------

/// Per-entity update carried inside a batch.
///
/// A small tagged variant of its own, so the batch format can carry
/// heterogeneous per-entity update types without growing the outer schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateKind {
    /// Reserves a batch slot; no further bytes follow.
    Noop,
    /// Overwrite the entity's frame with the one that follows.
    ReplaceFrame(Transform),
}

/// One `(guid, update)` record inside a `BATCH_ENTITY_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    /// Which replicated entity the update targets.
    pub guid: PlayerGuid,
    /// What to do with it.
    pub update: UpdateKind,
}

/// Outcome of a registration attempt, as carried in the reply's status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// The server accepted the registration.
    Success,
    /// The server refused (duplicate guid or connection already registered).
    Rejected,
}

impl RegistrationStatus {
    fn to_wire(self) -> u8 {
        match self {
            RegistrationStatus::Success => 0,
            RegistrationStatus::Rejected => 1,
        }
    }

    fn from_wire(byte: u8) -> Self {
        // Success is always written as 0; any non-zero byte is a rejection.
        if byte == 0 {
            RegistrationStatus::Success
        } else {
            RegistrationStatus::Rejected
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Top-level wire message. One variant per tag; codec and dispatch are
/// exhaustive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client probes the server's datagram port.
    Handshake,
    /// Server acknowledges the probe.
    HandshakeReply,
    /// Client binds its guid to this reliable connection and tells the
    /// server which datagram port to send snapshots to.
    RegisterClient {
        /// The registering client's identity.
        guid: PlayerGuid,
        /// The client's locally-bound datagram port. Sent explicitly
        /// because the port is offset from the reliable port and NAT
        /// behavior is otherwise unpredictable.
        unreliable_port: u16,
    },
    /// Server's verdict on a registration.
    RegistrationReply {
        /// Echo of the registering guid.
        guid: PlayerGuid,
        /// Accept or reject.
        status: RegistrationStatus,
    },
    /// Order the receiver to create a placeholder for a remote player.
    CreateEntity {
        /// Identity of the newly visible player.
        guid: PlayerGuid,
    },
    /// Order the receiver to remove a placeholder.
    DestroyEntity {
        /// Identity of the departed player.
        guid: PlayerGuid,
    },
    /// One tick's worth of transform snapshots; lossy, latest-value-wins.
    BatchEntityUpdate(Vec<EntityRecord>),
}

impl Message {
    /// Encode into a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.encoded_size_hint());
        match self {
            Message::Handshake => w.write_u8(TAG_HANDSHAKE),
            Message::HandshakeReply => w.write_u8(TAG_HANDSHAKE_REPLY),
            Message::RegisterClient {
                guid,
                unreliable_port,
            } => {
                w.write_u8(TAG_REGISTER_CLIENT);
                guid.encode(&mut w);
                w.write_u16(*unreliable_port);
            }
            Message::RegistrationReply { guid, status } => {
                w.write_u8(TAG_REGISTRATION_REPLY);
                guid.encode(&mut w);
                w.write_u8(status.to_wire());
            }
            Message::CreateEntity { guid } => {
                w.write_u8(TAG_CREATE_ENTITY);
                guid.encode(&mut w);
            }
            Message::DestroyEntity { guid } => {
                w.write_u8(TAG_DESTROY_ENTITY);
                guid.encode(&mut w);
            }
            Message::BatchEntityUpdate(records) => {
                debug_assert!(records.len() <= MAX_BATCH_RECORDS);
                w.write_u8(TAG_BATCH_ENTITY_UPDATE);
                w.write_u8(records.len().min(MAX_BATCH_RECORDS) as u8);
                for record in records.iter().take(MAX_BATCH_RECORDS) {
                    record.guid.encode(&mut w);
                    match &record.update {
                        UpdateKind::Noop => w.write_u8(KIND_NOOP),
                        UpdateKind::ReplaceFrame(frame) => {
                            w.write_u8(KIND_REPLACE_FRAME);
                            frame.encode(&mut w);
                        }
                    }
                }
            }
        }
        w.into_bytes()
    }

    /// Decode a complete packet.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let tag = r.read_u8().map_err(|_| DecodeError::Empty)?;
        match tag {
            TAG_HANDSHAKE => Ok(Message::Handshake),
            TAG_HANDSHAKE_REPLY => Ok(Message::HandshakeReply),
            TAG_REGISTER_CLIENT => {
                let guid = PlayerGuid::decode(&mut r)?;
                let unreliable_port = r.read_u16()?;
                Ok(Message::RegisterClient {
                    guid,
                    unreliable_port,
                })
            }
            TAG_REGISTRATION_REPLY => {
                let guid = PlayerGuid::decode(&mut r)?;
                let status = RegistrationStatus::from_wire(r.read_u8()?);
                Ok(Message::RegistrationReply { guid, status })
            }
            TAG_CREATE_ENTITY => Ok(Message::CreateEntity {
                guid: PlayerGuid::decode(&mut r)?,
            }),
            TAG_DESTROY_ENTITY => Ok(Message::DestroyEntity {
                guid: PlayerGuid::decode(&mut r)?,
            }),
            TAG_BATCH_ENTITY_UPDATE => {
                let count = r.read_u8()?;
                let mut records = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let guid = PlayerGuid::decode(&mut r)?;
                    let update = match r.read_u8()? {
                        KIND_NOOP => UpdateKind::Noop,
                        KIND_REPLACE_FRAME => UpdateKind::ReplaceFrame(Transform::decode(&mut r)?),
                        other => return Err(DecodeError::UnknownUpdateKind(other)),
                    };
                    records.push(EntityRecord { guid, update });
                }
                Ok(Message::BatchEntityUpdate(records))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn encoded_size_hint(&self) -> usize {
        match self {
            Message::Handshake | Message::HandshakeReply => 1,
            Message::RegisterClient { .. } => 19,
            Message::RegistrationReply { .. } => 18,
            Message::CreateEntity { .. } | Message::DestroyEntity { .. } => 17,
            Message::BatchEntityUpdate(records) => 2 + records.len() * 45,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(x: f32, y: f32, z: f32) -> Transform {
        Transform {
            translation: Vec3::new(x, y, z),
            rotation: Quat::from_rotation_y(0.5),
        }
    }

    #[test]
    fn register_client_layout() {
        let guid = PlayerGuid::from_bytes([0xa1; 16]);
        let bytes = Message::RegisterClient {
            guid,
            unreliable_port: 9002,
        }
        .encode();
        // tag + 16-byte guid + big-endian port
        assert_eq!(bytes.len(), 19);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..17], &[0xa1; 16]);
        assert_eq!(u16::from_be_bytes([bytes[17], bytes[18]]), 9002);
    }

    #[test]
    fn lifecycle_messages_round_trip() {
        let guid = PlayerGuid::generate();
        for msg in [
            Message::Handshake,
            Message::HandshakeReply,
            Message::RegisterClient {
                guid,
                unreliable_port: 1234,
            },
            Message::RegistrationReply {
                guid,
                status: RegistrationStatus::Success,
            },
            Message::CreateEntity { guid },
            Message::DestroyEntity { guid },
        ] {
            assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn batch_round_trips_within_tolerance() {
        let records = vec![
            EntityRecord {
                guid: PlayerGuid::generate(),
                update: UpdateKind::ReplaceFrame(frame(1.5, -2.0, 300.25)),
            },
            EntityRecord {
                guid: PlayerGuid::generate(),
                update: UpdateKind::Noop,
            },
            EntityRecord {
                guid: PlayerGuid::generate(),
                update: UpdateKind::ReplaceFrame(frame(-45.8, -1.8, -0.1)),
            },
        ];
        let decoded = Message::decode(&Message::BatchEntityUpdate(records.clone()).encode()).unwrap();
        let Message::BatchEntityUpdate(out) = decoded else {
            panic!("wrong message kind");
        };
        assert_eq!(out.len(), records.len());
        for (a, b) in records.iter().zip(&out) {
            assert_eq!(a.guid, b.guid);
            match (&a.update, &b.update) {
                (UpdateKind::Noop, UpdateKind::Noop) => {}
                (UpdateKind::ReplaceFrame(x), UpdateKind::ReplaceFrame(y)) => {
                    assert!(x.approx_eq(y, 1e-5));
                }
                _ => panic!("update kind changed across round-trip"),
            }
        }
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        assert_eq!(Message::decode(&[0xff]), Err(DecodeError::UnknownTag(0xff)));
    }

    #[test]
    fn truncated_payloads_are_decode_errors() {
        // REGISTER_CLIENT cut off mid-guid.
        let mut bytes = Message::RegisterClient {
            guid: PlayerGuid::generate(),
            unreliable_port: 9001,
        }
        .encode();
        bytes.truncate(10);
        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));

        // Batch that promises more records than it carries.
        let mut batch = Message::BatchEntityUpdate(vec![EntityRecord {
            guid: PlayerGuid::generate(),
            update: UpdateKind::Noop,
        }])
        .encode();
        batch[1] = 3;
        assert!(matches!(
            Message::decode(&batch),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn empty_packet_is_rejected() {
        assert_eq!(Message::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn unknown_update_kind_is_rejected() {
        let mut bytes = Message::BatchEntityUpdate(vec![EntityRecord {
            guid: PlayerGuid::generate(),
            update: UpdateKind::Noop,
        }])
        .encode();
        let kind_offset = bytes.len() - 1;
        bytes[kind_offset] = 9;
        assert_eq!(
            Message::decode(&bytes),
            Err(DecodeError::UnknownUpdateKind(9))
        );
    }
}
