//! Per-process player identity.

use std::fmt;

use uuid::Uuid;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::DecodeError;

/// A 128-bit globally unique client identifier.
///
/// Generated once per client process at startup; it is simultaneously the
/// client's network identity and the name of its replicated placeholder
/// entity. On the wire it is 16 raw bytes, no text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerGuid(Uuid);

impl PlayerGuid {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a guid from its 16 raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 16 raw bytes sent on the wire.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.into_bytes()
    }

    /// Serialize into an outgoing packet.
    pub fn encode(self, w: &mut ByteWriter) {
        w.write_bytes(&self.to_bytes());
    }

    /// Deserialize from an incoming packet.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self::from_bytes(r.read_array::<16>()?))
    }
}

impl fmt::Display for PlayerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_is_sixteen_raw_bytes() {
        let guid = PlayerGuid::generate();
        let mut w = ByteWriter::new();
        guid.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 16);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(PlayerGuid::decode(&mut r).unwrap(), guid);
    }

    #[test]
    fn generated_guids_are_distinct() {
        let a = PlayerGuid::generate();
        let b = PlayerGuid::generate();
        assert_ne!(a, b);
    }
}
