//! Mutable sync-checkpoint record.
//!
//! One instance lives inside the manager behind a single mutex. Nothing
//! here touches storage or the network.

use phx_core::types::Hash256;

use crate::message::VerifiedCheckpoint;

#[derive(Debug, Clone)]
pub struct SyncCheckpointState {
    /// Currently adopted checkpoint. Always an indexed block after startup.
    pub accepted: Hash256,
    /// Last candidate that failed ancestry validation. Diagnostic only.
    pub invalid: Option<Hash256>,
    /// Last adopted message, re-announced to new peers.
    pub last_message: Option<VerifiedCheckpoint>,
    /// Verified checkpoint whose block is not indexed yet.
    pub pending: Option<VerifiedCheckpoint>,
}

impl SyncCheckpointState {
    pub fn new(accepted: Hash256) -> Self {
        Self {
            accepted,
            invalid: None,
            last_message: None,
            pending: None,
        }
    }

    pub fn pending_hash(&self) -> Option<Hash256> {
        self.pending.as_ref().map(VerifiedCheckpoint::hash)
    }

    /// Record `message` as adopted. Any pending checkpoint is dropped.
    pub fn commit(&mut self, message: VerifiedCheckpoint) {
        self.accepted = message.hash();
        self.last_message = Some(message);
        self.pending = None;
    }

    /// Point at `hash` without a signed message behind it.
    pub fn reset_to(&mut self, hash: Hash256) {
        self.accepted = hash;
        self.last_message = None;
    }
}
