//! Peer-facing side of the checkpoint subsystem.
//!
//! Each peer remembers the last checkpoint hash it is known to have. A
//! checkpoint is sent to a peer at most once per hash for as long as the
//! connection lives.

use std::sync::Arc;

use phx_core::types::Hash256;

use crate::message::{SignedCheckpoint, VerifiedCheckpoint};

/// What the checkpoint subsystem needs from a connected peer.
///
/// Sends are fire-and-forget. Answers come back as ordinary block or
/// checkpoint messages.
pub trait CheckpointPeer: Send + Sync {
    /// Identifier for logs.
    fn id(&self) -> String;

    /// Set the peer's known-checkpoint marker, returning the previous value.
    ///
    /// Must be atomic: two relays racing on the same hash see the swap in
    /// some order and exactly one of them observes a different old value.
    fn replace_known_checkpoint(&self, hash: Hash256) -> Option<Hash256>;

    fn send_checkpoint(&self, checkpoint: &SignedCheckpoint);

    /// Ask for blocks from the locator's fork point up to `stop`.
    fn request_blocks(&self, locator: Vec<Hash256>, stop: Hash256);

    /// Ask for one block directly.
    fn ask_for_block(&self, hash: Hash256);
}

/// Source of the currently connected peers.
pub trait PeerDirectory: Send + Sync {
    fn peers(&self) -> Vec<Arc<dyn CheckpointPeer>>;
}

/// A directory with nobody in it, for nodes without networking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPeers;

impl PeerDirectory for NoPeers {
    fn peers(&self) -> Vec<Arc<dyn CheckpointPeer>> {
        Vec::new()
    }
}

/// Send `checkpoint` to `peer` unless it already has it.
///
/// Returns `true` if a message was sent.
pub fn relay_to(peer: &dyn CheckpointPeer, checkpoint: &VerifiedCheckpoint) -> bool {
    let hash = checkpoint.hash();
    if peer.replace_known_checkpoint(hash) == Some(hash) {
        return false;
    }
    peer.send_checkpoint(checkpoint.signed());
    true
}

/// Relay to every connected peer. Returns the number of sends.
pub fn relay_to_all(directory: &dyn PeerDirectory, checkpoint: &VerifiedCheckpoint) -> usize {
    directory
        .peers()
        .iter()
        .filter(|peer| relay_to(peer.as_ref(), checkpoint))
        .count()
}
