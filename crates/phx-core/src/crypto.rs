//! secp256k1 ECDSA operations for checkpoint signing.
//!
//! Messages are signed over their double SHA-256 digest and signatures are
//! carried DER-encoded. Public keys are SEC1 encoded; the authority keys are
//! compiled in uncompressed form.
//!
//! Verification normalizes high-S signatures first: older signers did not
//! enforce low-S, and a signature's S value does not change what was signed.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::types::Hash256;

/// Private key of the checkpoint authority.
///
/// The underlying scalar is zeroized on drop by k256.
#[derive(Clone)]
pub struct MasterKey {
    signing_key: SigningKey,
}

impl MasterKey {
    /// Generate a random key using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Create a key from 32 bytes of secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str.trim()).map_err(|_| CryptoError::InvalidPrivateKey)?,
        );
        Self::from_secret_bytes(&bytes)
    }

    /// Hex encoding of the secret scalar. Handle with care.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: VerifyingKey::from(&self.signing_key),
        }
    }

    /// Sign `message`, returning a DER-encoded signature over its double
    /// SHA-256 digest.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = Hash256::double_sha256(message);
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest.as_bytes())
            .map_err(|_| CryptoError::SigningFailed)?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Public key used to verify checkpoint signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Parse a SEC1-encoded key (compressed or uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let verifying_key =
            VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    /// Parse a hex-encoded SEC1 key.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_sec1_bytes(&bytes)
    }

    /// Uncompressed SEC1 encoding (65 bytes).
    pub fn to_uncompressed(&self) -> Vec<u8> {
        self.verifying_key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Verify a DER-encoded signature over the double SHA-256 of `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let sig = Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?;
        let sig = sig.normalize_s().unwrap_or(sig);
        let digest = Hash256::double_sha256(message);
        self.verifying_key
            .verify_prehash(digest.as_bytes(), &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_uncompressed()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_uncompressed()))
    }
}
