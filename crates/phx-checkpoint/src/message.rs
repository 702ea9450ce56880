//! Signed checkpoint messages.
//!
//! The signed payload is the 36-byte serialization of
//! [`UnsignedCheckpoint`]: a little-endian `i32` version followed by the
//! 32-byte block hash in storage order. The signature covers the payload
//! bytes exactly as received; verification never re-serializes.
//!
//! On the wire a [`SignedCheckpoint`] is the payload followed by the DER
//! signature, each carried as a compact-size prefixed byte string.

use phx_core::codec::{Reader, write_var_bytes};
use phx_core::constants::{CHECKPOINT_VERSION, MAX_CHECKPOINT_FIELD_SIZE};
use phx_core::crypto::{MasterKey, PublicKey};
use phx_core::error::{CodecError, CryptoError};
use phx_core::types::Hash256;

use crate::error::VerifyError;

/// The statement an authority signs: "anchor the chain at this block".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsignedCheckpoint {
    pub version: i32,
    pub checkpoint_hash: Hash256,
}

impl UnsignedCheckpoint {
    /// Serialized size in bytes.
    pub const ENCODED_LEN: usize = 4 + 32;

    /// A current-version checkpoint for `checkpoint_hash`.
    pub fn new(checkpoint_hash: Hash256) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            checkpoint_hash,
        }
    }

    /// "No checkpoint".
    pub fn is_null(&self) -> bool {
        self.checkpoint_hash.is_zero()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.checkpoint_hash.as_bytes());
        buf
    }

    /// Decode a payload, rejecting short input and trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_i32_le()?;
        let checkpoint_hash = reader.read_hash()?;
        reader.finish()?;
        Ok(Self {
            version,
            checkpoint_hash,
        })
    }
}

/// Payload bytes plus a detached signature, as carried by the network.
///
/// Nothing about the contents is trusted until [`verify`](Self::verify)
/// succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    raw_message: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedCheckpoint {
    /// Serialize `message` and sign the serialized bytes.
    pub fn sign(message: &UnsignedCheckpoint, key: &MasterKey) -> Result<Self, CryptoError> {
        let raw_message = message.to_bytes();
        let signature = key.sign(&raw_message)?;
        Ok(Self {
            raw_message,
            signature,
        })
    }

    /// Wrap bytes received from elsewhere.
    pub fn from_parts(raw_message: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            raw_message,
            signature,
        }
    }

    /// Payload bytes exactly as signed.
    pub fn raw_message(&self) -> &[u8] {
        &self.raw_message
    }

    /// DER-encoded signature.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Check the signature against `key`, then decode the payload.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::SignatureInvalid`] if the signature does not verify
    ///   (including an undecodable signature).
    /// - [`VerifyError::MalformedPayload`] if a correctly signed payload
    ///   does not decode.
    /// - [`VerifyError::NullCheckpoint`] if the payload names the zero hash.
    pub fn verify(&self, key: &PublicKey) -> Result<VerifiedCheckpoint, VerifyError> {
        key.verify(&self.raw_message, &self.signature)
            .map_err(|_| VerifyError::SignatureInvalid)?;
        let message = UnsignedCheckpoint::from_bytes(&self.raw_message)?;
        if message.is_null() {
            return Err(VerifyError::NullCheckpoint);
        }
        Ok(VerifiedCheckpoint {
            message,
            signed: self.clone(),
        })
    }

    /// Wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.raw_message.len() + self.signature.len() + 2);
        write_var_bytes(&mut buf, &self.raw_message);
        write_var_bytes(&mut buf, &self.signature);
        buf
    }

    /// Decode the wire form. Fields larger than
    /// [`MAX_CHECKPOINT_FIELD_SIZE`] and trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let raw_message = reader.read_var_bytes(MAX_CHECKPOINT_FIELD_SIZE)?;
        let signature = reader.read_var_bytes(MAX_CHECKPOINT_FIELD_SIZE)?;
        reader.finish()?;
        Ok(Self {
            raw_message,
            signature,
        })
    }
}

/// A checkpoint whose signature has been checked against an authority key.
///
/// Only obtainable through [`SignedCheckpoint::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCheckpoint {
    message: UnsignedCheckpoint,
    signed: SignedCheckpoint,
}

impl VerifiedCheckpoint {
    /// The anchored block.
    pub fn hash(&self) -> Hash256 {
        self.message.checkpoint_hash
    }

    pub fn version(&self) -> i32 {
        self.message.version
    }

    pub fn message(&self) -> &UnsignedCheckpoint {
        &self.message
    }

    /// The original signed form, for relaying.
    pub fn signed(&self) -> &SignedCheckpoint {
        &self.signed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> UnsignedCheckpoint {
        UnsignedCheckpoint::new(Hash256([0x5A; 32]))
    }

    #[test]
    fn payload_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), UnsignedCheckpoint::ENCODED_LEN);
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..], &[0x5A; 32]);
        assert_eq!(UnsignedCheckpoint::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn payload_rejects_short_and_long_input() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            UnsignedCheckpoint::from_bytes(&bytes[..35]),
            Err(CodecError::UnexpectedEof { .. })
        ));
        let mut long = bytes.clone();
        long.push(0);
        assert_eq!(UnsignedCheckpoint::from_bytes(&long), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn sign_and_verify() {
        let key = MasterKey::generate();
        let signed = SignedCheckpoint::sign(&sample(), &key).unwrap();
        let verified = signed.verify(&key.public_key()).unwrap();
        assert_eq!(verified.hash(), Hash256([0x5A; 32]));
        assert_eq!(verified.version(), CHECKPOINT_VERSION);
        assert_eq!(verified.signed(), &signed);
    }

    #[test]
    fn wrong_key_is_signature_invalid() {
        let key = MasterKey::generate();
        let other = MasterKey::generate();
        let signed = SignedCheckpoint::sign(&sample(), &key).unwrap();
        assert_eq!(signed.verify(&other.public_key()), Err(VerifyError::SignatureInvalid));
    }

    #[test]
    fn tampered_payload_fails() {
        let key = MasterKey::generate();
        let signed = SignedCheckpoint::sign(&sample(), &key).unwrap();
        let mut raw = signed.raw_message().to_vec();
        raw[10] ^= 0x01;
        let tampered = SignedCheckpoint::from_parts(raw, signed.signature().to_vec());
        assert_eq!(tampered.verify(&key.public_key()), Err(VerifyError::SignatureInvalid));
    }

    #[test]
    fn signed_garbage_payload_is_malformed() {
        let key = MasterKey::generate();
        let raw = vec![1, 2, 3];
        let sig = key.sign(&raw).unwrap();
        let signed = SignedCheckpoint::from_parts(raw, sig);
        assert!(matches!(
            signed.verify(&key.public_key()),
            Err(VerifyError::MalformedPayload(_))
        ));
    }

    #[test]
    fn null_checkpoint_rejected() {
        let key = MasterKey::generate();
        let null = UnsignedCheckpoint::new(Hash256::ZERO);
        assert!(null.is_null());
        let signed = SignedCheckpoint::sign(&null, &key).unwrap();
        assert_eq!(signed.verify(&key.public_key()), Err(VerifyError::NullCheckpoint));
    }

    #[test]
    fn verification_uses_stored_bytes() {
        // A payload signed with a non-current version still verifies and
        // reports the version it carries.
        let key = MasterKey::generate();
        let message = UnsignedCheckpoint {
            version: 7,
            checkpoint_hash: Hash256([9; 32]),
        };
        let signed = SignedCheckpoint::sign(&message, &key).unwrap();
        let verified = signed.verify(&key.public_key()).unwrap();
        assert_eq!(verified.version(), 7);
    }

    #[test]
    fn wire_form_decodes() {
        let key = MasterKey::generate();
        let signed = SignedCheckpoint::sign(&sample(), &key).unwrap();
        let wire = signed.encode();
        assert_eq!(wire[0] as usize, UnsignedCheckpoint::ENCODED_LEN);
        assert_eq!(SignedCheckpoint::decode(&wire).unwrap(), signed);

        let mut extra = wire.clone();
        extra.push(0xFF);
        assert_eq!(SignedCheckpoint::decode(&extra), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn oversized_field_rejected() {
        let signed = SignedCheckpoint::from_parts(vec![0; MAX_CHECKPOINT_FIELD_SIZE + 1], vec![]);
        assert!(matches!(
            SignedCheckpoint::decode(&signed.encode()),
            Err(CodecError::FieldTooLarge { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn tampered_payload_fails_verification(byte in 0usize..UnsignedCheckpoint::ENCODED_LEN, bit in 0u8..8) {
            let key = MasterKey::generate();
            let signed = SignedCheckpoint::sign(&sample(), &key).unwrap();
            let mut raw = signed.raw_message().to_vec();
            raw[byte] ^= 1 << bit;
            let tampered = SignedCheckpoint::from_parts(raw, signed.signature().to_vec());
            prop_assert_eq!(tampered.verify(&key.public_key()), Err(VerifyError::SignatureInvalid));
        }

        #[test]
        fn decoded_wire_form_reencodes_exactly(data in prop::collection::vec(any::<u8>(), 0..160)) {
            if let Ok(signed) = SignedCheckpoint::decode(&data) {
                prop_assert_eq!(signed.encode(), data);
            }
        }
    }
}
