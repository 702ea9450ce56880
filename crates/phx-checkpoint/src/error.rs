//! Error types for the checkpoint subsystem.
use thiserror::Error;

use phx_core::error::{ChainError, CodecError, CryptoError, StorageError};
use phx_core::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("checkpoint heights not increasing: {height} after {previous}")] NotIncreasing { height: u32, previous: u32 },
    #[error("block {got} at height {height} does not match hardened checkpoint {expected}")] HardenedMismatch { height: u32, expected: Hash256, got: Hash256 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("checkpoint signature invalid")] SignatureInvalid,
    #[error("malformed checkpoint payload: {0}")] MalformedPayload(#[from] CodecError),
    #[error("checkpoint names the null hash")] NullCheckpoint,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("invalid master key: {0}")] InvalidKey(CryptoError),
    #[error("master key does not match the network checkpoint key")] KeyMismatch,
    #[error("no master key installed")] NoMasterKey,
    #[error("signing failed: {0}")] Signing(CryptoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("checkpoint {candidate} conflicts with accepted checkpoint {accepted}")] DivergesFromAccepted { candidate: Hash256, accepted: Hash256 },
    #[error("checkpoint {candidate} does not descend from accepted checkpoint {accepted}")] NotDescendantOfAccepted { candidate: Hash256, accepted: Hash256 },
    #[error("block index broken below {0}")] ChainIndexCorrupt(Hash256),
    #[error("block index entry missing for {0}")] MissingIndexEntry(Hash256),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("bad checkpoint signature: {0}")] BadSignature(VerifyError),
    #[error("checkpoint {0} pending: block not yet known")] Pending(Hash256),
    #[error("checkpoint {candidate} conflicts with accepted checkpoint {accepted}")] Conflict { candidate: Hash256, accepted: Hash256 },
    #[error("checkpoint {candidate} does not descend from accepted checkpoint {accepted}")] NotDescendantOfAccepted { candidate: Hash256, accepted: Hash256 },
    #[error("block index corrupt: {0}")] ChainIndexCorrupt(String),
    #[error("promotion of {hash} to the main chain failed: {source}")] PromotionFailed { hash: Hash256, source: ChainError },
    #[error("checkpoint persistence failed: {0}")] PersistFailed(StorageError),
    #[error("no checkpoint master key installed")] NoAuthorityKey,
    #[error("checkpoint signing failed: {0}")] Signing(CryptoError),
    #[error("block not found: {0}")] UnknownBlock(Hash256),
}

impl From<ValidationError> for ProcessError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::DivergesFromAccepted { candidate, accepted } => {
                Self::Conflict { candidate, accepted }
            }
            ValidationError::NotDescendantOfAccepted { candidate, accepted } => {
                Self::NotDescendantOfAccepted { candidate, accepted }
            }
            ValidationError::ChainIndexCorrupt(_) | ValidationError::MissingIndexEntry(_) => {
                Self::ChainIndexCorrupt(err.to_string())
            }
        }
    }
}

impl From<AuthorityError> for ProcessError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Signing(e) | AuthorityError::InvalidKey(e) => Self::Signing(e),
            AuthorityError::NoMasterKey | AuthorityError::KeyMismatch => Self::NoAuthorityKey,
        }
    }
}

impl ProcessError {
    /// Whether the error names a conflicting or non-descending checkpoint.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::NotDescendantOfAccepted { .. })
    }
}
