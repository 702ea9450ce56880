//! Byte-level encoding helpers for the wire format.
//!
//! Integers are little-endian and fixed width. Variable-length byte strings
//! carry a Bitcoin-style compact-size prefix (1, 3, 5 or 9 bytes). Decoding
//! rejects non-canonical prefixes so every value has exactly one encoding.

use crate::error::CodecError;
use crate::types::Hash256;

/// Append a compact-size length prefix.
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= u64::from(u16::MAX) {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= u64::from(u32::MAX) {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Append a length-prefixed byte string.
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash256, CodecError> {
        Ok(Hash256(self.read_array()?))
    }

    /// Read a compact-size integer, rejecting non-minimal encodings.
    pub fn read_compact_size(&mut self) -> Result<u64, CodecError> {
        let n = match self.read_u8()? {
            0xfd => {
                let v = u64::from(self.read_u16_le()?);
                if v < 0xfd {
                    return Err(CodecError::NonCanonicalLength);
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32_le()?);
                if v <= u64::from(u16::MAX) {
                    return Err(CodecError::NonCanonicalLength);
                }
                v
            }
            0xff => {
                let v = self.read_u64_le()?;
                if v <= u64::from(u32::MAX) {
                    return Err(CodecError::NonCanonicalLength);
                }
                v
            }
            small => u64::from(small),
        };
        Ok(n)
    }

    /// Read a length-prefixed byte string of at most `max` bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, CodecError> {
        let len = self.read_compact_size()?;
        if len > max as u64 {
            return Err(CodecError::FieldTooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                max,
            });
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Succeed only if the whole input was consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}
