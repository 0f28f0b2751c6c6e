//! Bounds-checked big-endian byte cursors.
//!
//! Every multi-byte integer on the wire is big-endian. [`ByteReader`] never
//! reads past the end of its buffer: a short read produces
//! [`DecodeError::Truncated`] instead of a panic, so a malformed packet is
//! rejected as a value and the tick loop keeps running.

use crate::error::DecodeError;

/// A read cursor over a received packet.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a received buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian `f32`.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read `N` raw bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let b = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n)
    }
}

/// A write cursor producing an encoded packet.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Write one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a big-endian `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Write a big-endian `f32`.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_integers_and_floats() {
        let mut w = ByteWriter::new();
        w.write_u8(0xab);
        w.write_u16(0xbeef);
        w.write_f32(-1.25);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 7);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16().unwrap(), 0xbeef);
        assert_eq!(r.read_f32().unwrap(), -1.25);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn integers_are_big_endian() {
        let mut w = ByteWriter::new();
        w.write_u16(0x1234);
        assert_eq!(w.into_bytes(), vec![0x12, 0x34]);
    }

    #[test]
    fn short_read_is_an_error_not_a_panic() {
        let mut r = ByteReader::new(&[0x01]);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        let err = r.read_u16().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 1,
                needed: 2
            }
        );
    }

    #[test]
    fn read_array_checks_bounds() {
        let mut r = ByteReader::new(&[0u8; 8]);
        assert!(r.read_array::<16>().is_err());
        assert!(r.read_array::<8>().is_ok());
    }
}
