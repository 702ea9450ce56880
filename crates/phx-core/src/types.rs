//! Core protocol types.
//!
//! Hashes are stored in the byte order produced by SHA-256 (little-endian as
//! a 256-bit integer) and displayed most-significant byte first, matching the
//! way block explorers and RPC clients print them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block hashes, checkpoint payloads and message checksums.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. A checkpoint carrying it means "no checkpoint".
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array in storage order.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes in storage order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Double SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    /// Parse a 64-digit display-order hex literal at compile time.
    ///
    /// Intended for compiled-in tables; an invalid literal fails const
    /// evaluation.
    pub const fn from_hex_const(s: &str) -> Self {
        let digits = s.as_bytes();
        assert!(digits.len() == 64, "hash literal must be 64 hex digits");
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            let hi = hex_nibble(digits[2 * i]);
            let lo = hex_nibble(digits[2 * i + 1]);
            out[31 - i] = (hi << 4) | lo;
            i += 1;
        }
        Self(out)
    }

    /// Parse a display-order hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 64 {
            return Err(CodecError::InvalidHex(format!(
                "expected 64 hex digits, got {}",
                digits.len()
            )));
        }
        let mut bytes = hex::decode(digits).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        bytes.reverse();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in hash literal"),
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Hash256 {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
