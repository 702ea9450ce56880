//! Checkpoint signing authority.
//!
//! Every node knows the network's compiled-in authority public key. The
//! operator of a checkpoint master additionally installs the matching
//! private key, which enables signing new checkpoints.

use phx_core::constants::NetworkType;
use phx_core::crypto::{MasterKey, PublicKey};
use phx_core::types::Hash256;

use crate::error::{AuthorityError, VerifyError};
use crate::message::{SignedCheckpoint, UnsignedCheckpoint, VerifiedCheckpoint};

#[derive(Debug, Clone)]
pub struct SignatureAuthority {
    network: NetworkType,
    public_key: PublicKey,
    master_key: Option<MasterKey>,
}

impl SignatureAuthority {
    /// Authority for `network` using its compiled-in public key.
    pub fn for_network(network: NetworkType) -> Result<Self, AuthorityError> {
        let public_key =
            PublicKey::from_hex(network.checkpoint_pubkey_hex()).map_err(AuthorityError::InvalidKey)?;
        Ok(Self::with_public_key(network, public_key))
    }

    /// Authority with an explicit public key. Used by tests and private
    /// networks.
    pub fn with_public_key(network: NetworkType, public_key: PublicKey) -> Self {
        Self {
            network,
            public_key,
            master_key: None,
        }
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    /// Parse and install a hex-encoded master private key.
    pub fn set_master_key(&mut self, secret_hex: &str) -> Result<(), AuthorityError> {
        let key = MasterKey::from_hex(secret_hex).map_err(AuthorityError::InvalidKey)?;
        self.install_master_key(key)
    }

    /// Install a master key after test-signing a checkpoint for the genesis
    /// block and checking it against the network public key.
    ///
    /// A key that cannot sign, or whose signatures this network would
    /// reject, is not installed.
    pub fn install_master_key(&mut self, key: MasterKey) -> Result<(), AuthorityError> {
        let sample = UnsignedCheckpoint::new(self.network.genesis_hash());
        let signed = SignedCheckpoint::sign(&sample, &key).map_err(AuthorityError::Signing)?;
        signed
            .verify(&self.public_key)
            .map_err(|_| AuthorityError::KeyMismatch)?;
        self.master_key = Some(key);
        Ok(())
    }

    /// Sign a current-version checkpoint for `hash`.
    pub fn sign(&self, hash: Hash256) -> Result<SignedCheckpoint, AuthorityError> {
        let key = self.master_key.as_ref().ok_or(AuthorityError::NoMasterKey)?;
        SignedCheckpoint::sign(&UnsignedCheckpoint::new(hash), key).map_err(AuthorityError::Signing)
    }

    /// Verify a message against this network's authority key.
    pub fn verify(&self, signed: &SignedCheckpoint) -> Result<VerifiedCheckpoint, VerifyError> {
        signed.verify(&self.public_key)
    }
}
