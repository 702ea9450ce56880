//! Shared fixtures for the scenario and adversarial tests.

use std::sync::Arc;

use tokio::sync::mpsc;

use phx_checkpoint::relay::PeerDirectory;
use phx_checkpoint::{
    CheckpointPolicy, CheckpointRegistry, CheckpointServices, SignatureAuthority, SignedCheckpoint,
    SyncCheckpointManager,
};
use phx_core::chain_index::{ChainIndex, ChainPromoter, MemoryChainIndex};
use phx_core::constants::NetworkType;
use phx_core::crypto::MasterKey;
use phx_core::store::{CheckpointStore, MemoryCheckpointStore};
use phx_core::types::Hash256;
use phx_network::{NetworkMessage, Peer, PeerSet};

/// Base timestamp of every test chain.
pub const BASE_TIME: u32 = 1_400_000_000;

/// Deterministic block hash for `height` on `branch`. Never zero.
pub fn block_hash(branch: u8, height: u32) -> Hash256 {
    let mut bytes = [0x5A; 32];
    bytes[..4].copy_from_slice(&height.to_le_bytes());
    bytes[4] = branch;
    Hash256(bytes)
}

/// An in-memory header chain built from [`block_hash`] values.
///
/// Branch 0 holds only genesis. The main chain is conventionally branch 1.
pub struct TestChain {
    pub index: Arc<MemoryChainIndex>,
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}

impl TestChain {
    pub fn new() -> Self {
        Self {
            index: Arc::new(MemoryChainIndex::new(block_hash(0, 0), BASE_TIME)),
        }
    }

    /// A chain of `len` blocks on branch 1 above genesis, set as best.
    pub fn main(len: u32) -> Self {
        let chain = Self::new();
        let tip = chain.extend(chain.genesis(), 1, len);
        if let Some(tip) = tip.last() {
            chain.set_best(tip);
        }
        chain
    }

    pub fn genesis(&self) -> Hash256 {
        self.index.genesis_hash()
    }

    /// Add `count` blocks on `branch` on top of `from`, without touching
    /// the best chain. Returns the new hashes, lowest first.
    pub fn extend(&self, from: Hash256, branch: u8, count: u32) -> Vec<Hash256> {
        let handle = self.index.lookup(&from).expect("extend from unknown block");
        let start = self.index.height(handle).expect("stale handle") + 1;
        let mut prev = from;
        let mut hashes = Vec::with_capacity(count as usize);
        for height in start..start + count {
            let hash = block_hash(branch, height);
            self.index
                .insert(hash, prev, BASE_TIME + height * 60)
                .expect("insert test block");
            hashes.push(hash);
            prev = hash;
        }
        hashes
    }

    pub fn set_best(&self, tip: &Hash256) {
        let handle = self.index.lookup(tip).expect("unknown tip");
        self.index.set_best_chain(handle).expect("set best chain");
    }

    /// Main-chain hash at `height`.
    pub fn at(&self, height: u32) -> Hash256 {
        let tip = self.index.best_tip();
        let handle = self.index.ancestor(tip, height).expect("height above tip");
        self.index.hash(handle).expect("stale handle")
    }

    pub fn is_on_main_chain(&self, hash: &Hash256) -> bool {
        self.index
            .lookup(hash)
            .is_some_and(|handle| self.index.is_on_main_chain(handle))
    }
}

/// A testnet authority holding a freshly generated master key.
pub fn local_authority() -> (SignatureAuthority, MasterKey) {
    let key = MasterKey::generate();
    let mut authority = SignatureAuthority::with_public_key(NetworkType::Testnet, key.public_key());
    authority
        .install_master_key(key.clone())
        .expect("generated key matches its own public key");
    (authority, key)
}

/// A checkpoint manager wired to in-memory collaborators and a real
/// [`PeerSet`].
pub struct Harness {
    pub chain: TestChain,
    pub store: Arc<MemoryCheckpointStore>,
    pub peers: Arc<PeerSet>,
    pub authority: SignatureAuthority,
    pub manager: SyncCheckpointManager,
}

impl Harness {
    pub fn new(chain: TestChain, registry: CheckpointRegistry, policy: CheckpointPolicy) -> Self {
        let (authority, _) = local_authority();
        Self::with_authority(chain, registry, policy, authority)
    }

    pub fn with_authority(
        chain: TestChain,
        registry: CheckpointRegistry,
        policy: CheckpointPolicy,
        authority: SignatureAuthority,
    ) -> Self {
        let store = Arc::new(MemoryCheckpointStore::new());
        let peers = Arc::new(PeerSet::new(8));
        let index: Arc<dyn ChainIndex> = chain.index.clone();
        let promoter: Arc<dyn ChainPromoter> = chain.index.clone();
        let store_dyn: Arc<dyn CheckpointStore> = store.clone();
        let peers_dyn: Arc<dyn PeerDirectory> = peers.clone();
        let manager = SyncCheckpointManager::open(
            authority.clone(),
            registry,
            policy,
            CheckpointServices {
                index,
                promoter,
                store: store_dyn,
                peers: peers_dyn,
            },
        )
        .expect("open checkpoint manager");
        Self {
            chain,
            store,
            peers,
            authority,
            manager,
        }
    }

    /// Sign a checkpoint for `hash` with the harness authority.
    pub fn sign(&self, hash: Hash256) -> SignedCheckpoint {
        self.authority.sign(hash).expect("harness authority signs")
    }

    /// Register a connected peer and return its outbound queue.
    pub fn connect_peer(&self, addr: &str) -> (Arc<Peer>, mpsc::UnboundedReceiver<NetworkMessage>) {
        let (peer, rx) = Peer::channel(addr);
        self.peers.insert(Arc::clone(&peer)).expect("peer limit");
        (peer, rx)
    }
}

/// Checkpoint hashes queued for a peer, draining the queue.
pub fn drain_checkpoints(rx: &mut mpsc::UnboundedReceiver<NetworkMessage>) -> Vec<SignedCheckpoint> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let NetworkMessage::Checkpoint(signed) = message {
            out.push(signed);
        }
    }
    out
}
