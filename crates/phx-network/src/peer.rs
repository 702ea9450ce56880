//! Connected peers and the peer table.
//!
//! A [`Peer`] is the node-side handle of one connection: an outbound
//! message queue drained by the connection's writer task, plus the
//! checkpoint marker used for relay dedup.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use phx_checkpoint::message::SignedCheckpoint;
use phx_checkpoint::relay::{CheckpointPeer, PeerDirectory};
use phx_core::constants::MAX_LOCATOR_SIZE;
use phx_core::error::NetworkError;
use phx_core::types::Hash256;

use crate::protocol::{Inventory, NetworkMessage};

#[derive(Debug)]
pub struct Peer {
    addr: String,
    known_checkpoint: Mutex<Option<Hash256>>,
    outbound: mpsc::UnboundedSender<NetworkMessage>,
}

impl Peer {
    pub fn new(addr: impl Into<String>, outbound: mpsc::UnboundedSender<NetworkMessage>) -> Self {
        Self {
            addr: addr.into(),
            known_checkpoint: Mutex::new(None),
            outbound,
        }
    }

    /// A peer together with the receiving end of its outbound queue.
    pub fn channel(addr: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<NetworkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(addr, tx)), rx)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Last checkpoint this peer is known to have.
    pub fn known_checkpoint(&self) -> Option<Hash256> {
        *self.known_checkpoint.lock()
    }

    /// Queue a message for the writer task.
    pub fn send(&self, msg: NetworkMessage) -> Result<(), NetworkError> {
        self.outbound
            .send(msg)
            .map_err(|_| NetworkError::PeerDisconnected(self.addr.clone()))
    }

    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    fn send_or_log(&self, msg: NetworkMessage) {
        let command = msg.command();
        if let Err(e) = self.send(msg) {
            debug!(peer = %self.addr, command, "dropping message: {e}");
        }
    }
}

impl CheckpointPeer for Peer {
    fn id(&self) -> String {
        self.addr.clone()
    }

    fn replace_known_checkpoint(&self, hash: Hash256) -> Option<Hash256> {
        self.known_checkpoint.lock().replace(hash)
    }

    fn send_checkpoint(&self, checkpoint: &SignedCheckpoint) {
        self.send_or_log(NetworkMessage::Checkpoint(checkpoint.clone()));
    }

    fn request_blocks(&self, mut locator: Vec<Hash256>, stop: Hash256) {
        locator.truncate(MAX_LOCATOR_SIZE);
        self.send_or_log(NetworkMessage::GetBlocks { locator, stop });
    }

    fn ask_for_block(&self, hash: Hash256) {
        self.send_or_log(NetworkMessage::GetData(vec![Inventory::block(hash)]));
    }
}

/// Table of connected peers keyed by address.
#[derive(Debug)]
pub struct PeerSet {
    peers: DashMap<String, Arc<Peer>>,
    max_peers: usize,
}

impl PeerSet {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: DashMap::new(),
            max_peers,
        }
    }

    /// Add a peer. Fails once `max_peers` are connected.
    pub fn insert(&self, peer: Arc<Peer>) -> Result<(), NetworkError> {
        if self.peers.len() >= self.max_peers {
            return Err(NetworkError::PeerLimit(self.max_peers));
        }
        self.peers.insert(peer.addr().to_string(), peer);
        Ok(())
    }

    pub fn remove(&self, addr: &str) -> Option<Arc<Peer>> {
        self.peers.remove(addr).map(|(_, peer)| peer)
    }

    pub fn get(&self, addr: &str) -> Option<Arc<Peer>> {
        self.peers.get(addr).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn addrs(&self) -> Vec<String> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl PeerDirectory for PeerSet {
    fn peers(&self) -> Vec<Arc<dyn CheckpointPeer>> {
        self.peers
            .iter()
            .map(|entry| entry.value().clone() as Arc<dyn CheckpointPeer>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phx_checkpoint::message::{UnsignedCheckpoint, VerifiedCheckpoint};
    use phx_checkpoint::relay::relay_to_all;
    use phx_core::crypto::MasterKey;

    fn verified(n: u8) -> VerifiedCheckpoint {
        let key = MasterKey::generate();
        SignedCheckpoint::sign(&UnsignedCheckpoint::new(Hash256([n; 32])), &key)
            .unwrap()
            .verify(&key.public_key())
            .unwrap()
    }

    #[test]
    fn checkpoint_queued_once() {
        let (peer, mut rx) = Peer::channel("10.0.0.1:9555");
        let set = PeerSet::new(8);
        set.insert(peer.clone()).unwrap();

        let msg = verified(1);
        assert_eq!(relay_to_all(&set, &msg), 1);
        assert_eq!(relay_to_all(&set, &msg), 0);
        assert_eq!(peer.known_checkpoint(), Some(msg.hash()));
        assert_eq!(rx.try_recv().unwrap(), NetworkMessage::Checkpoint(msg.signed().clone()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn block_requests_are_queued() {
        let (peer, mut rx) = Peer::channel("10.0.0.2:9555");
        peer.request_blocks(vec![Hash256([1; 32]); MAX_LOCATOR_SIZE + 5], Hash256([2; 32]));
        peer.ask_for_block(Hash256([3; 32]));

        match rx.try_recv().unwrap() {
            NetworkMessage::GetBlocks { locator, stop } => {
                assert_eq!(locator.len(), MAX_LOCATOR_SIZE);
                assert_eq!(stop, Hash256([2; 32]));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            NetworkMessage::GetData(vec![Inventory::block(Hash256([3; 32]))])
        );
    }

    #[test]
    fn send_to_closed_peer_fails() {
        let (peer, rx) = Peer::channel("10.0.0.3:9555");
        drop(rx);
        assert!(!peer.is_connected());
        assert_eq!(
            peer.send(NetworkMessage::GetData(Vec::new())),
            Err(NetworkError::PeerDisconnected("10.0.0.3:9555".into()))
        );
        // Relay helpers swallow the error.
        peer.ask_for_block(Hash256::ZERO);
    }

    #[test]
    fn peer_limit_enforced() {
        let set = PeerSet::new(1);
        set.insert(Peer::channel("a").0).unwrap();
        assert_eq!(set.insert(Peer::channel("b").0), Err(NetworkError::PeerLimit(1)));
        assert_eq!(set.len(), 1);
        assert!(set.remove("a").is_some());
        assert!(set.is_empty());
    }
}
